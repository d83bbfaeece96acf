//! Traced containers and the write algorithm.
//!
//! A [`TracedNode`] is a shared handle to an object or array whose writes
//! are intercepted. Each write runs the same steps in order:
//!
//! 1. validate the key and reject embeddings that would form a cycle;
//! 2. if writes are enabled, release whatever is being overwritten or
//!    removed (subscription sites of embedded roots, parent links of nested
//!    nodes);
//! 3. if recording is enabled and the node is attached to a root, build the
//!    record and deliver it to that root (which fans it out to receivers);
//! 4. if writes are enabled, wrap the new value and store it.
//!
//! Structured values are wrapped on the way in: nested nodes get a weak
//! parent link, embedded roots are shared by identity and subscribed to the
//! host's root, and nested nodes from another tree are copied.

use crate::error::{FabricError, FabricResult};
use crate::item::{Input, Item};
use crate::metadata::{self, Link};
use crate::mutation::Mutation;
use crate::root::RootState;
use crate::structure::Kind;
use crate::subscribers;
use crate::suspend::{is_recording, is_writing};
use crate::{Key, Path};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

pub(crate) type NodeRef = Rc<RefCell<NodeInner>>;
pub(crate) type WeakNodeRef = Weak<RefCell<NodeInner>>;

pub(crate) enum Container {
    Object(BTreeMap<String, Item>),
    Array(Vec<Item>),
}

impl Container {
    fn empty(kind: Kind) -> Self {
        match kind {
            Kind::Object => Container::Object(BTreeMap::new()),
            Kind::Array => Container::Array(Vec::new()),
        }
    }

    fn kind(&self) -> Kind {
        match self {
            Container::Object(_) => Kind::Object,
            Container::Array(_) => Kind::Array,
        }
    }

    fn len(&self) -> usize {
        match self {
            Container::Object(map) => map.len(),
            Container::Array(items) => items.len(),
        }
    }

    fn get(&self, key: &Key) -> Option<&Item> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.get(name),
            (Container::Array(items), Key::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    fn entries(&self) -> Vec<(Key, Item)> {
        match self {
            Container::Object(map) => map
                .iter()
                .map(|(k, item)| (Key::Field(k.clone()), item.clone()))
                .collect(),
            Container::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Key::Index(i), item.clone()))
                .collect(),
        }
    }

    /// Store `item` under `key`; an array index equal to the length appends.
    /// Keys are validated by the caller.
    fn put(&mut self, key: Key, item: Item) {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => {
                map.insert(name, item);
            }
            (Container::Array(items), Key::Index(i)) if i < items.len() => items[i] = item,
            (Container::Array(items), Key::Index(_)) => items.push(item),
            _ => {}
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Item> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.remove(name),
            (Container::Array(items), Key::Index(i)) if *i < items.len() => Some(items.remove(*i)),
            _ => None,
        }
    }
}

pub(crate) struct NodeInner {
    pub(crate) container: Container,
    /// Parent link; always `None` for roots.
    pub(crate) link: Option<Link>,
    /// Trace log and subscribers; `Some` iff this node is a root.
    pub(crate) root: Option<Rc<RootState>>,
}

/// Handle to a traced object or array.
///
/// Cloning the handle is cheap and yields the same node; equality is
/// identity. Reads return [`Item`]s, writes accept anything convertible into
/// an [`Input`].
#[derive(Clone)]
pub struct TracedNode(pub(crate) NodeRef);

impl TracedNode {
    pub fn kind(&self) -> Kind {
        self.0.borrow().container.kind()
    }

    /// Whether this node is a traced root (owns a trace log).
    pub fn is_root(&self) -> bool {
        self.0.borrow().root.is_some()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Same node (identity, not contents).
    #[inline]
    pub fn ptr_eq(&self, other: &TracedNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<Item> {
        self.0.borrow().container.get(&key.into()).cloned()
    }

    /// The nested traced node under `key`, if any.
    pub fn node(&self, key: impl Into<Key>) -> Option<TracedNode> {
        self.get(key).and_then(Item::into_node)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.entries().into_iter().map(|(key, _)| key).collect()
    }

    /// Current `(key, item)` pairs in iteration order.
    pub fn entries(&self) -> Vec<(Key, Item)> {
        self.0.borrow().container.entries()
    }

    /// Keys from the top of the parent chain to this node.
    pub fn path(&self) -> Path {
        metadata::get_path(self)
    }

    /// Plain snapshot of the whole subtree, embedded roots included.
    pub fn to_value(&self) -> Value {
        let inner = self.0.borrow();
        match &inner.container {
            Container::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, item)| (k.clone(), item.to_value()))
                    .collect(),
            ),
            Container::Array(items) => Value::Array(items.iter().map(Item::to_value).collect()),
        }
    }

    pub(crate) fn to_input(&self) -> Input {
        let inner = self.0.borrow();
        match &inner.container {
            Container::Object(map) => Input::Object(
                map.iter()
                    .map(|(k, item)| (k.clone(), item.to_input()))
                    .collect(),
            ),
            Container::Array(items) => Input::Array(items.iter().map(Item::to_input).collect()),
        }
    }

    /// Assign `value` under `key`.
    ///
    /// Objects take field keys. Arrays take an index up to and including the
    /// current length; the length itself appends.
    ///
    /// ```
    /// use tirea_fabric::{path, Mutation, Kind, TraceRoot};
    /// use serde_json::json;
    ///
    /// let root = TraceRoot::new(json!({"season": "winter"})).unwrap();
    /// root.value().set("season", "summer").unwrap();
    ///
    /// assert_eq!(
    ///     root.trace(),
    ///     vec![Mutation::set(Kind::Object, path!("season"), json!("summer"))]
    /// );
    /// ```
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Input>) -> FabricResult<()> {
        let key = key.into();
        let input = value.into();
        let kind = self.check_slot(&key)?;
        ensure_embeddable(&input, &self.0)?;

        let writing = is_writing();
        if writing {
            if let Some(old) = self.get(key.clone()) {
                subscribers::remove_subscriber_subtree(&old, &self.0, &key);
            }
        }
        record(&self.0, |path| {
            Mutation::set(kind, path.with(key.clone()), input.snapshot())
        });
        if writing {
            let item = wrap(input, &self.0, key.clone());
            self.0.borrow_mut().container.put(key, item);
        }
        Ok(())
    }

    /// Remove the entry under `key` and return it.
    ///
    /// On arrays the tail shifts left. Deleting a missing key records
    /// nothing. Under [`without_writes`](crate::without_writes) the record
    /// is produced but nothing is removed, so `None` is returned.
    pub fn delete(&self, key: impl Into<Key>) -> FabricResult<Option<Item>> {
        let key = key.into();
        let kind = self.kind();
        if !matches!(
            (kind, &key),
            (Kind::Object, Key::Field(_)) | (Kind::Array, Key::Index(_))
        ) {
            return Err(FabricError::key_mismatch(kind, key));
        }
        let Some(old) = self.get(key.clone()) else {
            return Ok(None);
        };

        let writing = is_writing();
        if writing {
            subscribers::remove_subscriber_subtree(&old, &self.0, &key);
        }
        record(&self.0, |path| Mutation::delete(kind, path.with(key.clone())));
        if !writing {
            return Ok(None);
        }

        let removed = self.0.borrow_mut().container.remove(&key);
        if let Key::Index(index) = key {
            self.remap_sites(|i| match i.cmp(&index) {
                Ordering::Less => Some(i),
                Ordering::Equal => None,
                Ordering::Greater => Some(i - 1),
            });
            self.relink_children();
        }
        Ok(removed)
    }

    /// Append one value (recorded as `set` at the old length).
    pub fn push(&self, value: impl Into<Input>) -> FabricResult<()> {
        self.extend([value])
    }

    /// Append values in order.
    ///
    /// A single value is recorded as `set` at the old length, several as one
    /// bulk `push`. An empty batch records nothing.
    pub fn extend<I, V>(&self, values: I) -> FabricResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Input>,
    {
        self.require_array("push")?;
        let inputs: Vec<Input> = values.into_iter().map(Into::into).collect();
        if inputs.is_empty() {
            return Ok(());
        }
        for input in &inputs {
            ensure_embeddable(input, &self.0)?;
        }

        let writing = is_writing();
        let start = self.len();
        record(&self.0, |path| match inputs.as_slice() {
            [single] => Mutation::set(Kind::Array, path.with(start), single.snapshot()),
            many => Mutation::append(path, many.iter().map(Input::snapshot).collect()),
        });
        if writing {
            for (offset, input) in inputs.into_iter().enumerate() {
                let key = Key::Index(start + offset);
                let item = wrap(input, &self.0, key.clone());
                self.0.borrow_mut().container.put(key, item);
            }
        }
        Ok(())
    }

    /// Insert values at the front, preserving their order.
    ///
    /// Always recorded as one bulk `unshift`, even for a single value.
    pub fn unshift<I, V>(&self, values: I) -> FabricResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Input>,
    {
        self.require_array("unshift")?;
        let inputs: Vec<Input> = values.into_iter().map(Into::into).collect();
        if inputs.is_empty() {
            return Ok(());
        }
        for input in &inputs {
            ensure_embeddable(input, &self.0)?;
        }

        let writing = is_writing();
        record(&self.0, |path| {
            Mutation::prepend(path, inputs.iter().map(Input::snapshot).collect())
        });
        if writing {
            let count = inputs.len();
            self.remap_sites(|i| i.checked_add(count));
            let items: Vec<Item> = inputs
                .into_iter()
                .enumerate()
                .map(|(i, input)| wrap(input, &self.0, Key::Index(i)))
                .collect();
            if let Container::Array(existing) = &mut self.0.borrow_mut().container {
                existing.splice(0..0, items);
            }
            self.relink_children();
        }
        Ok(())
    }

    /// Remove and return the first element; `None` on an empty array.
    pub fn shift(&self) -> FabricResult<Option<Item>> {
        self.require_array("shift")?;
        let first_key = Key::Index(0);
        let Some(first) = self.get(first_key.clone()) else {
            return Ok(None);
        };

        let writing = is_writing();
        if writing {
            subscribers::remove_subscriber_subtree(&first, &self.0, &first_key);
        }
        record(&self.0, Mutation::remove_first);
        if !writing {
            return Ok(None);
        }

        let removed = self.0.borrow_mut().container.remove(&first_key);
        self.remap_sites(|i| i.checked_sub(1));
        self.relink_children();
        Ok(removed)
    }

    /// Remove and return the last element (recorded as `delete`).
    pub fn pop(&self) -> FabricResult<Option<Item>> {
        self.require_array("pop")?;
        match self.len() {
            0 => Ok(None),
            len => self.delete(len - 1),
        }
    }

    /// Remove and return the element at `index` (recorded as `delete`);
    /// `None` when out of range.
    pub fn remove(&self, index: usize) -> FabricResult<Option<Item>> {
        self.require_array("remove")?;
        self.delete(index)
    }

    /// Reverse the array in place.
    pub fn reverse(&self) -> FabricResult<()> {
        self.require_array("reverse")?;
        let writing = is_writing();
        record(&self.0, Mutation::reverse);
        if writing {
            let len = self.len();
            self.remap_sites(|i| i.checked_add(1).and_then(|n| len.checked_sub(n)));
            if let Container::Array(items) = &mut self.0.borrow_mut().container {
                items.reverse();
            }
            self.relink_children();
        }
        Ok(())
    }

    fn require_array(&self, op: &'static str) -> FabricResult<()> {
        match self.kind() {
            Kind::Array => Ok(()),
            kind => Err(FabricError::unsupported(kind, op)),
        }
    }

    fn check_slot(&self, key: &Key) -> FabricResult<Kind> {
        let (kind, len) = {
            let inner = self.0.borrow();
            (inner.container.kind(), inner.container.len())
        };
        match (kind, key) {
            (Kind::Object, Key::Field(_)) => Ok(kind),
            (Kind::Array, Key::Index(index)) if *index <= len => Ok(kind),
            (Kind::Array, Key::Index(index)) => Err(FabricError::index_out_of_bounds(
                self.path(),
                *index,
                len,
            )),
            _ => Err(FabricError::key_mismatch(kind, key.clone())),
        }
    }

    /// Move the subscription sites of roots embedded directly in this array.
    /// Sites mapped to `None` are dropped.
    fn remap_sites(&self, remap: impl Fn(usize) -> Option<usize>) {
        let mut senders: Vec<TracedNode> = Vec::new();
        for (_, item) in self.entries() {
            if let Item::Node(node) = item {
                if node.is_root() && !senders.iter().any(|s| s.ptr_eq(&node)) {
                    senders.push(node);
                }
            }
        }
        for sender in &senders {
            subscribers::remap_sites(sender, &self.0, &remap);
        }
    }

    /// Rewrite the parent-link keys of nested children to their positions.
    fn relink_children(&self) {
        let inner = self.0.borrow();
        let Container::Array(items) = &inner.container else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            if let Item::Node(child) = item {
                if let Some(link) = child.0.borrow_mut().link.as_mut() {
                    link.key = Key::Index(i);
                }
            }
        }
    }
}

impl PartialEq for TracedNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TracedNode {}

impl fmt::Debug for TracedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => f
                .debug_struct("TracedNode")
                .field("kind", &inner.container.kind())
                .field("root", &inner.root.is_some())
                .field("len", &inner.container.len())
                .finish(),
            Err(_) => f.write_str("TracedNode(<borrowed>)"),
        }
    }
}

impl Serialize for TracedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Whether `item` is a traced root.
#[inline]
pub fn is_traced_root(item: &Item) -> bool {
    matches!(item, Item::Node(node) if node.is_root())
}

/// Whether `item` is a traced node nested in some tree (not a root).
#[inline]
pub fn is_traced_node(item: &Item) -> bool {
    matches!(item, Item::Node(node) if !node.is_root())
}

/// Whether `item` is traced at all.
#[inline]
pub fn is_traced(item: &Item) -> bool {
    matches!(item, Item::Node(_))
}

/// Split a structured input into its kind and children.
///
/// Leaves and untraced values come back as the item they are stored as.
/// Nodes are unfolded into literals, so the result is always a fresh copy.
pub(crate) fn decompose(input: Input) -> Result<(Kind, Vec<(Key, Input)>), Item> {
    match input {
        Input::Value(Value::Object(map)) => Ok((
            Kind::Object,
            map.into_iter()
                .map(|(k, v)| (Key::Field(k), Input::Value(v)))
                .collect(),
        )),
        Input::Value(Value::Array(items)) => Ok((
            Kind::Array,
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), Input::Value(v)))
                .collect(),
        )),
        Input::Value(leaf) => Err(Item::Leaf(leaf)),
        Input::Untraced(value) => Err(Item::Untraced(value)),
        Input::Node(node) => decompose(node.to_input()),
        Input::Object(entries) => Ok((
            Kind::Object,
            entries
                .into_iter()
                .map(|(k, v)| (Key::Field(k), v))
                .collect(),
        )),
        Input::Array(items) => Ok((
            Kind::Array,
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v))
                .collect(),
        )),
    }
}

/// Allocate a node and wrap its children into it.
pub(crate) fn build_node(
    kind: Kind,
    link: Option<Link>,
    root: Option<Rc<RootState>>,
    children: Vec<(Key, Input)>,
) -> TracedNode {
    let node = Rc::new(RefCell::new(NodeInner {
        container: Container::empty(kind),
        link,
        root,
    }));
    for (key, input) in children {
        let replaced = node.borrow().container.get(&key).cloned();
        if let Some(old) = replaced {
            subscribers::remove_subscriber_subtree(&old, &node, &key);
        }
        let item = wrap(input, &node, key.clone());
        node.borrow_mut().container.put(key, item);
    }
    TracedNode(node)
}

/// Turn `input` into the item stored under `parent[key]`.
pub(crate) fn wrap(input: Input, parent: &NodeRef, key: Key) -> Item {
    match input {
        Input::Node(node) if node.is_root() => {
            subscribers::attach(&node, parent, key);
            Item::Node(node)
        }
        input => match decompose(input) {
            Ok((kind, children)) => {
                Item::Node(build_node(kind, Some(Link::new(parent, key)), None, children))
            }
            Err(item) => item,
        },
    }
}

/// Deliver a record for a write on `node` to its root.
///
/// Skipped while recording is suspended, and for nodes whose parent chain
/// does not end at a root.
fn record(node: &NodeRef, build: impl FnOnce(Path) -> Mutation) {
    if !is_recording() {
        return;
    }
    let (path, top) = metadata::locate(node);
    let state = top.borrow().root.clone();
    match state {
        Some(state) => state.deliver(build(path)),
        None => trace!(path = %path, "write on detached node not recorded"),
    }
}

/// Reject inputs that would embed the host's root inside its own tree.
fn ensure_embeddable(input: &Input, host: &NodeRef) -> FabricResult<()> {
    let top = TracedNode(metadata::locate(host).1);
    input.visit_roots(&mut |root| {
        if root.ptr_eq(&top) || subscribers::forwards_to(&top, root) {
            Err(FabricError::CyclicEmbedding)
        } else {
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, MutationOp, TraceRoot};
    use serde_json::json;

    #[test]
    fn structures_are_wrapped_on_write() {
        let root = TraceRoot::new(json!({})).unwrap();
        root.value().set("a", json!({"b": [1, 2]})).unwrap();

        let a = root.value().get("a").unwrap();
        assert!(is_traced_node(&a));
        assert!(is_traced(&a));
        assert!(!is_traced_root(&a));
        let b = a.as_node().unwrap().node("b").unwrap();
        assert_eq!(b.path(), path!("a", "b"));
    }

    #[test]
    fn leaves_are_stored_as_is() {
        let root = TraceRoot::new(json!([])).unwrap();
        root.value().push(json!(null)).unwrap();
        assert_eq!(root.value().get(0usize), Some(Item::Leaf(json!(null))));
        assert!(!is_traced(&root.value().get(0usize).unwrap()));
    }

    #[test]
    fn object_rejects_index_key() {
        let root = TraceRoot::new(json!({})).unwrap();
        let err = root.value().set(0usize, 1).unwrap_err();
        assert!(matches!(err, FabricError::KeyMismatch { kind: Kind::Object, .. }));
        assert!(root.trace().is_empty());
    }

    #[test]
    fn array_rejects_write_past_end() {
        let root = TraceRoot::new(json!([1])).unwrap();
        let err = root.value().set(3usize, 1).unwrap_err();
        assert!(matches!(
            err,
            FabricError::IndexOutOfBounds { index: 3, len: 1, .. }
        ));
        root.value().set(1usize, 2).unwrap();
        assert_eq!(root.value().to_value(), json!([1, 2]));
    }

    #[test]
    fn list_ops_rejected_on_objects() {
        let root = TraceRoot::new(json!({})).unwrap();
        assert!(matches!(
            root.value().push(1),
            Err(FabricError::UnsupportedOperation { op: "push", .. })
        ));
        assert!(root.value().reverse().is_err());
        assert!(root.value().shift().is_err());
    }

    #[test]
    fn pop_records_delete_of_last_index() {
        let root = TraceRoot::new(json!([1, 2, 3])).unwrap();
        let popped = root.value().pop().unwrap();
        assert_eq!(popped, Some(Item::Leaf(json!(3))));

        let trace = root.trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].op, MutationOp::Delete);
        assert_eq!(trace[0].path, path!(2usize));
    }

    #[test]
    fn removed_node_is_detached() {
        let root = TraceRoot::new(json!({"a": {"x": 1}})).unwrap();
        let a = root.value().node("a").unwrap();
        root.value().delete("a").unwrap();

        assert!(metadata::get_metadata(&a).is_none());
        a.set("x", 2).unwrap();
        assert_eq!(root.trace().len(), 1);
    }

    #[test]
    fn nested_node_from_other_tree_is_copied() {
        let left = TraceRoot::new(json!({"inner": {"v": 1}})).unwrap();
        let right = TraceRoot::new(json!({})).unwrap();
        let inner = left.value().node("inner").unwrap();

        right.value().set("copy", &inner).unwrap();
        let copy = right.value().node("copy").unwrap();
        assert!(!copy.ptr_eq(&inner));

        inner.set("v", 2).unwrap();
        assert_eq!(right.value().to_value(), json!({"copy": {"v": 1}}));
        assert_eq!(right.trace().len(), 1);
    }

    #[test]
    fn reverse_relinks_children() {
        let root = TraceRoot::new(json!([{"id": 0}, {"id": 1}, {"id": 2}])).unwrap();
        let first = root.value().node(0usize).unwrap();
        root.value().reverse().unwrap();
        assert_eq!(first.path(), path!(2usize));

        root.value().shift().unwrap();
        assert_eq!(first.path(), path!(1usize));
    }
}
