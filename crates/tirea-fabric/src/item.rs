//! Values read from and written into traced nodes.
//!
//! [`Item`] is what a traced container stores: a leaf, an opaque untraced
//! value, or a nested [`TracedNode`]. [`Input`] is what a write accepts; on
//! top of plain JSON it can carry existing traced nodes, including nodes
//! nested inside object/array literals, so a seed can embed other roots.

use crate::error::FabricResult;
use crate::structure::{is_structure, Kind};
use crate::TracedNode;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// A value held by a traced container.
#[derive(Clone, Debug)]
pub enum Item {
    /// Scalar or `null`.
    Leaf(Value),
    /// Structure stored as-is, with tracing disabled for its contents.
    Untraced(Value),
    /// Traced object or array.
    Node(TracedNode),
}

impl Item {
    /// Plain snapshot of the item.
    pub fn to_value(&self) -> Value {
        match self {
            Item::Leaf(value) | Item::Untraced(value) => value.clone(),
            Item::Node(node) => node.to_value(),
        }
    }

    #[inline]
    pub fn as_node(&self) -> Option<&TracedNode> {
        match self {
            Item::Node(node) => Some(node),
            _ => None,
        }
    }

    #[inline]
    pub fn into_node(self) -> Option<TracedNode> {
        match self {
            Item::Node(node) => Some(node),
            _ => None,
        }
    }

    #[inline]
    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            Item::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// False only for untraced structures.
    #[inline]
    pub fn is_tracing_enabled(&self) -> bool {
        !matches!(self, Item::Untraced(_))
    }

    /// Input that rebuilds this item elsewhere: roots are kept by identity,
    /// nested nodes are unfolded into literals.
    pub(crate) fn to_input(&self) -> Input {
        match self {
            Item::Leaf(value) => Input::Value(value.clone()),
            Item::Untraced(value) => Input::Untraced(value.clone()),
            Item::Node(node) if node.is_root() => Input::Node(node.clone()),
            Item::Node(node) => node.to_input(),
        }
    }

    /// Visit every traced root reachable through nested (non-root) nodes.
    pub(crate) fn visit_roots(
        &self,
        visit: &mut dyn FnMut(&TracedNode) -> FabricResult<()>,
    ) -> FabricResult<()> {
        match self {
            Item::Node(node) if node.is_root() => visit(node),
            Item::Node(node) => {
                for (_, child) in node.entries() {
                    child.visit_roots(visit)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl PartialEq for Item {
    /// Leaves compare by value, nodes by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Item::Leaf(a), Item::Leaf(b)) | (Item::Untraced(a), Item::Untraced(b)) => a == b,
            (Item::Node(a), Item::Node(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq<Value> for Item {
    fn eq(&self, other: &Value) -> bool {
        &self.to_value() == other
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// A value to be written into a traced node.
#[derive(Clone, Debug)]
pub enum Input {
    /// Plain JSON; structures get traced on write.
    Value(Value),
    /// Structure to store with tracing disabled.
    Untraced(Value),
    /// Existing traced node. Roots are embedded by identity and subscribed;
    /// other nodes are copied.
    Node(TracedNode),
    /// Object literal whose fields may hold traced nodes.
    Object(Vec<(String, Input)>),
    /// Array literal whose elements may hold traced nodes.
    Array(Vec<Input>),
}

impl Input {
    /// Object literal from `(field, value)` pairs.
    ///
    /// ```
    /// use tirea_fabric::{Input, TraceRoot};
    /// use serde_json::json;
    ///
    /// let child = TraceRoot::new(json!([1])).unwrap();
    /// let parent = TraceRoot::new(Input::object([("c", child.value())])).unwrap();
    /// assert_eq!(parent.value().to_value(), json!({"c": [1]}));
    /// ```
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Input>,
    {
        Input::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Array literal.
    pub fn array<V: Into<Input>>(items: impl IntoIterator<Item = V>) -> Self {
        Input::Array(items.into_iter().map(Into::into).collect())
    }

    /// Independent plain copy, as carried in record payloads.
    pub fn snapshot(&self) -> Value {
        match self {
            Input::Value(value) | Input::Untraced(value) => value.clone(),
            Input::Node(node) => node.to_value(),
            Input::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.snapshot()))
                    .collect(),
            ),
            Input::Array(items) => Value::Array(items.iter().map(Input::snapshot).collect()),
        }
    }

    /// Container kind if the input is a traceable structure.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Input::Value(value) => Kind::of(value),
            Input::Untraced(_) => None,
            Input::Node(node) => Some(node.kind()),
            Input::Object(_) => Some(Kind::Object),
            Input::Array(_) => Some(Kind::Array),
        }
    }

    /// False only for inputs marked with [`disable_tracing`].
    #[inline]
    pub fn is_tracing_enabled(&self) -> bool {
        !matches!(self, Input::Untraced(_))
    }

    pub(crate) fn visit_roots(
        &self,
        visit: &mut dyn FnMut(&TracedNode) -> FabricResult<()>,
    ) -> FabricResult<()> {
        match self {
            Input::Node(node) => Item::Node(node.clone()).visit_roots(visit),
            Input::Object(entries) => {
                for (_, value) in entries {
                    value.visit_roots(visit)?;
                }
                Ok(())
            }
            Input::Array(items) => {
                for value in items {
                    value.visit_roots(visit)?;
                }
                Ok(())
            }
            Input::Value(_) | Input::Untraced(_) => Ok(()),
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

impl From<TracedNode> for Input {
    fn from(node: TracedNode) -> Self {
        Input::Node(node)
    }
}

impl From<&TracedNode> for Input {
    fn from(node: &TracedNode) -> Self {
        Input::Node(node.clone())
    }
}

impl From<Item> for Input {
    fn from(item: Item) -> Self {
        match item {
            Item::Leaf(value) => Input::Value(value),
            Item::Untraced(value) => Input::Untraced(value),
            Item::Node(node) => Input::Node(node),
        }
    }
}

macro_rules! input_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Input {
                fn from(value: $ty) -> Self {
                    Input::Value(Value::from(value))
                }
            }
        )*
    };
}

input_from_scalar!(bool, i32, i64, u32, u64, usize, f64, &str, String);

/// Mark a structure as opaque: it is stored as-is and its contents are never
/// traced. Leaves are never traced anyway and pass through unmarked.
///
/// ```
/// use tirea_fabric::{disable_tracing, Input, TraceRoot};
/// use serde_json::json;
///
/// let root = TraceRoot::new(Input::object([
///     ("traced", Input::from(json!([1, 2, 3]))),
///     ("fixed", disable_tracing(json!([4, 5, 6]))),
/// ]))
/// .unwrap();
///
/// assert!(root.value().get("traced").unwrap().is_tracing_enabled());
/// assert!(!root.value().get("fixed").unwrap().is_tracing_enabled());
/// ```
pub fn disable_tracing(value: impl Into<Input>) -> Input {
    match value.into().snapshot() {
        value if is_structure(&value) => Input::Untraced(value),
        leaf => Input::Value(leaf),
    }
}

/// Clear the opaque marker set by [`disable_tracing`].
pub fn enable_tracing(value: Input) -> Input {
    match value {
        Input::Untraced(value) => Input::Value(value),
        other => other,
    }
}

/// Whether `value` will be traced when written.
#[inline]
pub fn is_tracing_enabled(value: &Input) -> bool {
    value.is_tracing_enabled()
}

/// Whether `value` will be wrapped into a traced node when written.
///
/// Leaves and untraced values are stored as-is.
#[inline]
pub fn will_wrap(value: &Input) -> bool {
    match value {
        Input::Value(value) => is_structure(value),
        Input::Untraced(_) => false,
        Input::Node(_) | Input::Object(_) | Input::Array(_) => true,
    }
}
