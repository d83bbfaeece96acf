//! Key paths that address a container relative to its traced root.
//!
//! A path is the ordered list of keys walked from a root down to a nested
//! container. Object children are addressed by field name, array children by
//! their current index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a [`Path`].
///
/// Serializes untagged, so a path travels as a plain JSON array of strings
/// and integers: `["users", 0, "name"]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Array position.
    Index(usize),
    /// Object field name.
    Field(String),
}

impl Key {
    /// Create a field key.
    #[inline]
    pub fn field(name: impl Into<String>) -> Self {
        Key::Field(name.into())
    }

    /// Create an index key.
    #[inline]
    pub fn index(i: usize) -> Self {
        Key::Index(i)
    }

    #[inline]
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Key::Field(name) => Some(name),
            Key::Index(_) => None,
        }
    }

    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Field(_) => None,
            Key::Index(i) => Some(*i),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, ".{}", name),
            Key::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Field(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Field(s.to_owned())
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Field(s.clone())
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// Ordered key sequence from a root to a container.
///
/// # Examples
///
/// ```
/// use tirea_fabric::{path, Key, Path};
///
/// let p = path!("users", 0, "name");
/// assert_eq!(p.len(), 3);
/// assert_eq!(p[1], Key::Index(0));
/// assert_eq!(p.to_string(), "$.users[0].name");
/// assert_eq!(Path::root().to_string(), "$");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<Key>);

impl Path {
    /// The empty path, addressing a root itself.
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn from_keys(keys: Vec<Key>) -> Self {
        Self(keys)
    }

    /// Append a key and return self (builder pattern).
    #[inline]
    pub fn with(mut self, key: impl Into<Key>) -> Self {
        self.0.push(key.into());
        self
    }

    #[inline]
    pub fn push(&mut self, key: Key) {
        self.0.push(key);
    }

    #[inline]
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    /// Split into the container path and the final key.
    ///
    /// Returns `None` for the root path.
    pub fn split_last(&self) -> Option<(&[Key], &Key)> {
        self.0.split_last().map(|(last, rest)| (rest, last))
    }

    /// Concatenate `self` and `other` into a new path.
    pub fn join(&self, other: &Path) -> Path {
        let mut keys = Vec::with_capacity(self.len() + other.len());
        keys.extend(self.0.iter().cloned());
        keys.extend(other.0.iter().cloned());
        Path(keys)
    }

    /// Whether every key of `self` matches the beginning of `other`.
    #[inline]
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.0.iter()
    }

    #[inline]
    pub(crate) fn into_keys(self) -> Vec<Key> {
        self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for key in &self.0 {
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Key;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// Build a [`Path`] from keys: string literals become fields, integers
/// become indices.
///
/// ```
/// use tirea_fabric::path;
///
/// let p = path!("items", 2, "label");
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($key:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Key::from($key));
        )+
        p
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_mixed_keys() {
        let p = Path::root().with("users").with(0usize).with("name");
        assert_eq!(p, path!("users", 0usize, "name"));
        assert_eq!(p[2], Key::field("name"));
    }

    #[test]
    fn split_last_separates_container_and_key() {
        let p = path!("a", 1usize);
        let (container, last) = p.split_last().unwrap();
        assert_eq!(container, &[Key::field("a")]);
        assert_eq!(last, &Key::Index(1));
        assert!(Path::root().split_last().is_none());
    }

    #[test]
    fn serializes_as_plain_array() {
        let p = path!("arr", 2usize);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"["arr",2]"#);
        let parsed: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn join_and_prefix() {
        let site = path!("children", 1usize);
        let inner = path!("name");
        let joined = site.join(&inner);
        assert_eq!(joined.to_string(), "$.children[1].name");
        assert!(site.is_prefix_of(&joined));
        assert!(!joined.is_prefix_of(&site));
    }
}
