//! Recording behaviour of a single traced root.

use serde_json::{json, Value};
use tirea_fabric::{
    disable_tracing, get_metadata, is_traced, path, replay, without_recording, without_writes,
    FabricError, Input, Item, Key, Kind, Mutation, MutationOp, TraceRoot,
};

// ============================================================================
// Object writes
// ============================================================================

#[test]
fn test_object_set_records_path_and_payload() {
    let root = TraceRoot::new(json!({"user": {"name": "ana"}})).unwrap();
    let user = root.value().node("user").unwrap();
    user.set("name", "bo").unwrap();

    assert_eq!(
        root.trace(),
        vec![Mutation::set(Kind::Object, path!("user", "name"), json!("bo"))]
    );
    assert_eq!(root.value().to_value(), json!({"user": {"name": "bo"}}));
}

#[test]
fn test_object_delete_missing_key_records_nothing() {
    let root = TraceRoot::new(json!({"a": 1, "b": 2})).unwrap();

    let removed = root.value().delete("a").unwrap();
    assert_eq!(removed, Some(Item::Leaf(json!(1))));
    assert_eq!(root.value().delete("zzz").unwrap(), None);

    assert_eq!(
        root.trace(),
        vec![Mutation::delete(Kind::Object, path!("a"))]
    );
}

#[test]
fn test_payload_is_independent_snapshot() {
    let root = TraceRoot::new(json!({})).unwrap();
    root.value().set("cfg", json!({"depth": 1})).unwrap();
    root.value().node("cfg").unwrap().set("depth", 2).unwrap();

    let trace = root.trace();
    assert_eq!(trace.len(), 2);
    // Later writes do not leak into earlier payloads
    assert_eq!(trace[0].payload, Some(json!({"depth": 1})));
    assert_eq!(trace[1].path, path!("cfg", "depth"));
}

#[test]
fn test_writing_null_records_null_payload() {
    let root = TraceRoot::new(json!({"a": 1})).unwrap();
    root.value().set("a", Value::Null).unwrap();
    assert_eq!(root.trace()[0].payload, Some(Value::Null));
    assert_eq!(root.value().get("a"), Some(Item::Leaf(Value::Null)));
}

// ============================================================================
// Array writes
// ============================================================================

#[test]
fn test_push_single_records_set_at_length() {
    let root = TraceRoot::new(json!([1, 2])).unwrap();
    root.value().push(3).unwrap();
    assert_eq!(
        root.trace(),
        vec![Mutation::set(Kind::Array, path!(2usize), json!(3))]
    );
}

#[test]
fn test_extend_records_bulk_push() {
    let root = TraceRoot::new(json!([1])).unwrap();
    root.value().extend([json!(2), json!(3)]).unwrap();

    let trace = root.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].op, MutationOp::Append);
    assert_eq!(trace[0].path, path!());
    assert_eq!(trace[0].payload, Some(json!([2, 3])));
    assert_eq!(root.value().to_value(), json!([1, 2, 3]));
}

#[test]
fn test_empty_list_ops_are_noops() {
    let root = TraceRoot::new(json!([])).unwrap();
    root.value().extend(Vec::<Value>::new()).unwrap();
    root.value().unshift(Vec::<Value>::new()).unwrap();
    assert_eq!(root.value().shift().unwrap(), None);
    assert_eq!(root.value().pop().unwrap(), None);
    assert!(root.trace().is_empty());
}

#[test]
fn test_unshift_single_value_is_bulk() {
    let root = TraceRoot::new(json!([1, 2])).unwrap();
    root.value().unshift([json!(0)]).unwrap();

    let trace = root.trace();
    assert_eq!(trace[0].op, MutationOp::Prepend);
    assert_eq!(trace[0].payload, Some(json!([0])));
    assert_eq!(root.value().to_value(), json!([0, 1, 2]));
}

#[test]
fn test_unshift_keeps_argument_order() {
    let root = TraceRoot::new(json!([3])).unwrap();
    root.value().unshift([json!(1), json!(2)]).unwrap();
    assert_eq!(root.value().to_value(), json!([1, 2, 3]));
}

#[test]
fn test_array_delete_shifts_tail() {
    let root = TraceRoot::new(json!([1, 2, 3])).unwrap();
    assert_eq!(root.value().remove(1).unwrap(), Some(Item::Leaf(json!(2))));
    assert_eq!(root.value().to_value(), json!([1, 3]));
    assert_eq!(
        root.trace(),
        vec![Mutation::delete(Kind::Array, path!(1usize))]
    );
}

#[test]
fn test_shift_and_reverse_record_list_path() {
    let root = TraceRoot::new(json!({"q": [1, 2, 3]})).unwrap();
    let q = root.value().node("q").unwrap();
    assert_eq!(q.shift().unwrap(), Some(Item::Leaf(json!(1))));
    q.reverse().unwrap();

    assert_eq!(
        root.trace(),
        vec![
            Mutation::remove_first(path!("q")),
            Mutation::reverse(path!("q")),
        ]
    );
    assert_eq!(q.to_value(), json!([3, 2]));
}

// ============================================================================
// Paths after reordering
// ============================================================================

#[test]
fn test_paths_follow_reordering() {
    let base = json!({"list": [{"id": "a"}, {"id": "b"}, {"id": "c"}]});
    let root = TraceRoot::new(base.clone()).unwrap();
    let list = root.value().node("list").unwrap();
    let c = list.node(2usize).unwrap();

    list.shift().unwrap();
    c.set("id", "c2").unwrap();
    assert_eq!(root.trace().last().unwrap().path, path!("list", 1usize, "id"));

    list.unshift([json!({"id": "z"})]).unwrap();
    assert_eq!(c.path(), path!("list", 2usize));

    list.reverse().unwrap();
    c.set("id", "c3").unwrap();
    assert_eq!(root.trace().last().unwrap().path, path!("list", 0usize, "id"));

    let replica = replay(&base, &root.trace()).unwrap();
    assert_eq!(replica, root.value().to_value());
}

#[test]
fn test_delete_reindexes_following_children() {
    let root = TraceRoot::new(json!([[0], [1], [2]])).unwrap();
    let last = root.value().node(2usize).unwrap();
    root.value().delete(0usize).unwrap();

    assert_eq!(get_metadata(&last).unwrap().key, Key::Index(1));
    last.push(9).unwrap();
    assert_eq!(root.trace().last().unwrap().path, path!(1usize, 1usize));
}

// ============================================================================
// Suspension
// ============================================================================

#[test]
fn test_without_recording_applies_silently() {
    let root = TraceRoot::new(json!({"a": [1]})).unwrap();
    without_recording(|| root.value().node("a").unwrap().push(2)).unwrap();

    assert!(root.trace().is_empty());
    assert_eq!(root.value().to_value(), json!({"a": [1, 2]}));
}

#[test]
fn test_without_writes_records_only() {
    let root = TraceRoot::new(json!({"a": [1]})).unwrap();
    without_writes(|| root.value().node("a").unwrap().push(2)).unwrap();

    assert_eq!(root.value().to_value(), json!({"a": [1]}));
    assert_eq!(
        root.trace(),
        vec![Mutation::set(Kind::Array, path!("a", 1usize), json!(2))]
    );
}

#[test]
fn test_without_writes_delete_keeps_value() {
    let root = TraceRoot::new(json!({"keep": {"x": 1}})).unwrap();
    let keep = root.value().node("keep").unwrap();
    let removed = without_writes(|| root.value().delete("keep")).unwrap();

    assert_eq!(removed, None);
    assert!(root.value().node("keep").unwrap().ptr_eq(&keep));
    assert_eq!(root.trace_len(), 1);

    // Still attached, so further writes are recorded
    keep.set("x", 2).unwrap();
    assert_eq!(root.trace_len(), 2);
}

#[test]
fn test_both_suspensions_do_nothing() {
    let root = TraceRoot::new(json!({"n": 0})).unwrap();
    without_recording(|| without_writes(|| root.value().set("n", 1))).unwrap();
    assert!(root.trace().is_empty());
    assert_eq!(root.value().to_value(), json!({"n": 0}));
}

// ============================================================================
// Untraced and detached values
// ============================================================================

#[test]
fn test_untraced_value_is_stored_as_is() {
    let root = TraceRoot::new(Input::object([
        ("opaque", disable_tracing(json!({"x": 1}))),
        ("plain", Input::from(json!({"y": 2}))),
    ]))
    .unwrap();

    let opaque = root.value().get("opaque").unwrap();
    assert!(!is_traced(&opaque));
    assert!(!opaque.is_tracing_enabled());
    assert!(root.value().node("plain").is_some());

    root.value().set("more", disable_tracing(json!([1]))).unwrap();
    assert_eq!(root.trace()[0].payload, Some(json!([1])));
    assert_eq!(
        root.value().to_value(),
        json!({"opaque": {"x": 1}, "plain": {"y": 2}, "more": [1]})
    );
}

#[test]
fn test_writes_to_removed_subtree_not_recorded() {
    let root = TraceRoot::new(json!({"gone": {"deep": {"v": 1}}})).unwrap();
    let deep = root.value().node("gone").unwrap().node("deep").unwrap();
    let gone = root.value().delete("gone").unwrap();
    assert!(gone.is_some());

    deep.set("v", 2).unwrap();
    assert_eq!(root.trace_len(), 1);
    assert_eq!(deep.to_value(), json!({"v": 2}));
}

// ============================================================================
// Rejected writes
// ============================================================================

#[test]
fn test_cyclic_embedding_rejected() {
    let inner = TraceRoot::new(json!({})).unwrap();
    let outer = TraceRoot::new(Input::object([("inner", inner.value())])).unwrap();

    let err = inner.value().set("outer", outer.value()).unwrap_err();
    assert!(matches!(err, FabricError::CyclicEmbedding));

    let err = inner.value().set("me", inner.value()).unwrap_err();
    assert!(matches!(err, FabricError::CyclicEmbedding));

    assert!(inner.trace().is_empty());
    assert!(outer.trace().is_empty());
}

#[test]
fn test_cycle_through_nested_literal_rejected() {
    let inner = TraceRoot::new(json!([])).unwrap();
    let outer = TraceRoot::new(Input::object([("inner", inner.value())])).unwrap();

    let err = inner
        .value()
        .push(Input::object([("wrapped", Input::array([outer.value()]))]))
        .unwrap_err();
    assert!(matches!(err, FabricError::CyclicEmbedding));
    assert!(inner.value().is_empty());
}

#[test]
fn test_failed_write_leaves_state_untouched() {
    let root = TraceRoot::new(json!([1])).unwrap();
    assert!(root.value().set("field", 2).is_err());
    assert!(root.value().set(5usize, 2).is_err());
    assert_eq!(root.value().to_value(), json!([1]));
    assert!(root.trace().is_empty());
}
