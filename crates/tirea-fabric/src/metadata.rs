//! Parent links and path computation.
//!
//! Every nested traced node keeps a weak link to its parent container and
//! the key it is stored under. Roots never carry a link: a root may be
//! embedded in several trees at once, so its positions are kept on the
//! sender side as subscription sites instead.

use crate::node::{NodeRef, WeakNodeRef};
use crate::{Key, Path, TracedNode};
use std::rc::Rc;
use tracing::debug;

/// Weak parent link stored on a nested node.
#[derive(Clone, Debug)]
pub(crate) struct Link {
    pub(crate) parent: WeakNodeRef,
    pub(crate) key: Key,
}

impl Link {
    pub(crate) fn new(parent: &NodeRef, key: Key) -> Self {
        Self {
            parent: Rc::downgrade(parent),
            key,
        }
    }
}

/// Public view of a node's parent link.
#[derive(Clone, Debug)]
pub struct Metadata {
    /// Parent container, `None` once it has been dropped.
    pub parent: Option<TracedNode>,
    /// Key under which the node is stored in its parent.
    pub key: Key,
}

/// Record `node` as stored under `parent[key]`, replacing any prior link.
///
/// Ignored for roots, whose positions are tracked as subscription sites.
pub fn set_metadata(node: &TracedNode, parent: &TracedNode, key: Key) {
    let mut inner = node.0.borrow_mut();
    if inner.root.is_some() {
        debug!(key = %key, "ignoring parent link on a traced root");
        return;
    }
    inner.link = Some(Link::new(&parent.0, key));
}

/// The node's parent link, or `None` for roots and detached nodes.
pub fn get_metadata(node: &TracedNode) -> Option<Metadata> {
    let inner = node.0.borrow();
    inner.link.as_ref().map(|link| Metadata {
        parent: link.parent.upgrade().map(TracedNode),
        key: link.key.clone(),
    })
}

/// Keys from the top of the node's parent chain down to the node itself.
///
/// Empty for roots. The walk stops early at an ancestor that has been
/// dropped; the keys collected up to that point are returned.
///
/// ```
/// use tirea_fabric::{get_path, path, TraceRoot};
/// use serde_json::json;
///
/// let root = TraceRoot::new(json!({"users": [{"name": "ana"}]})).unwrap();
/// let user = root.value().node("users").unwrap().node(0).unwrap();
/// assert_eq!(get_path(&user), path!("users", 0));
/// ```
pub fn get_path(node: &TracedNode) -> Path {
    locate(&node.0).0
}

/// The top of the node's parent chain: its root when attached.
pub fn top_of(node: &TracedNode) -> TracedNode {
    TracedNode(locate(&node.0).1)
}

/// Walk the parent chain, returning the path and the topmost node reached.
pub(crate) fn locate(node: &NodeRef) -> (Path, NodeRef) {
    let mut keys = Vec::new();
    let mut current = node.clone();
    loop {
        let parent = {
            let inner = current.borrow();
            match &inner.link {
                Some(link) => match link.parent.upgrade() {
                    Some(parent) => {
                        keys.push(link.key.clone());
                        Some(parent)
                    }
                    None => None,
                },
                None => None,
            }
        };
        match parent {
            Some(parent) => current = parent,
            None => break,
        }
    }
    keys.reverse();
    (Path::from_keys(keys), current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, TraceRoot};
    use serde_json::json;

    #[test]
    fn root_has_empty_path_and_no_link() {
        let root = TraceRoot::new(json!({"a": 1})).unwrap();
        assert_eq!(get_path(root.value()), Path::root());
        assert!(get_metadata(root.value()).is_none());
    }

    #[test]
    fn nested_nodes_point_at_parent() {
        let root = TraceRoot::new(json!({"a": {"b": [[1]]}})).unwrap();
        let a = root.value().node("a").unwrap();
        let b = a.node("b").unwrap();
        let inner = b.node(0usize).unwrap();

        let meta = get_metadata(&inner).unwrap();
        assert!(meta.parent.unwrap().ptr_eq(&b));
        assert_eq!(meta.key, Key::Index(0));
        assert_eq!(get_path(&inner), path!("a", "b", 0usize));
        assert!(top_of(&inner).ptr_eq(root.value()));
    }

    #[test]
    fn dropped_parent_truncates_path() {
        let root = TraceRoot::new(json!({"a": {"b": {}}})).unwrap();
        let b = root.value().node("a").unwrap().node("b").unwrap();
        let removed = root.value().delete("a").unwrap();
        drop(removed);

        assert_eq!(get_path(&b), Path::root());
        let meta = get_metadata(&b).unwrap();
        assert!(meta.parent.is_none());
        assert_eq!(meta.key, Key::field("b"));
    }

    #[test]
    fn set_metadata_overwrites_link() {
        let root = TraceRoot::new(json!({"x": {}, "y": {}})).unwrap();
        let x = root.value().node("x").unwrap();
        let y = root.value().node("y").unwrap();
        set_metadata(&x, &y, Key::field("moved"));
        assert_eq!(get_path(&x), path!("y", "moved"));
    }

    #[test]
    fn set_metadata_ignored_for_roots() {
        let host = TraceRoot::new(json!({})).unwrap();
        let other = TraceRoot::new(json!([])).unwrap();
        set_metadata(other.value(), host.value(), Key::field("k"));
        assert!(get_metadata(other.value()).is_none());
    }
}
