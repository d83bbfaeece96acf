//! Mutation records: one captured change plus the path it applies to.
//!
//! Keyed ops (`set`, `delete`) carry the container path followed by the
//! written key. Whole-list ops (`push`, `unshift`, `shift`, `reverse`) carry
//! the path of the list itself.

use crate::error::{FabricError, FabricResult};
use crate::{Key, Kind, Path};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Operation captured by a [`Mutation`].
///
/// Wire names follow the list methods they were captured from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationOp {
    /// Assign a value at the final key.
    #[serde(rename = "set")]
    Set,
    /// Remove the final key (objects) or the element at the final index
    /// (arrays, tail shifts left).
    #[serde(rename = "delete")]
    Delete,
    /// Add several values at the end of a list.
    #[serde(rename = "push")]
    Append,
    /// Add values at the front of a list, preserving their order.
    #[serde(rename = "unshift")]
    Prepend,
    /// Remove index 0 of a list.
    #[serde(rename = "shift")]
    RemoveFirst,
    /// Reverse a list in place.
    #[serde(rename = "reverse")]
    Reverse,
}

impl MutationOp {
    /// Wire name of the op.
    pub fn name(self) -> &'static str {
        match self {
            MutationOp::Set => "set",
            MutationOp::Delete => "delete",
            MutationOp::Append => "push",
            MutationOp::Prepend => "unshift",
            MutationOp::RemoveFirst => "shift",
            MutationOp::Reverse => "reverse",
        }
    }

    /// Whether the op carries a payload.
    #[inline]
    pub fn requires_payload(self) -> bool {
        matches!(
            self,
            MutationOp::Set | MutationOp::Append | MutationOp::Prepend
        )
    }

    /// Whether the last path key names the written slot (as opposed to the
    /// path naming the list itself).
    #[inline]
    pub fn is_keyed(self) -> bool {
        matches!(self, MutationOp::Set | MutationOp::Delete)
    }

    /// Whether the op is valid on a container of `kind`.
    #[inline]
    pub fn supports(self, kind: Kind) -> bool {
        kind == Kind::Array || self.is_keyed()
    }
}

/// One captured change.
///
/// `payload` is a structurally independent snapshot: it never aliases a
/// traced node, so records can be serialized and replayed anywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Kind of the mutated container.
    pub kind: Kind,
    /// Keys from the record's root to the mutated slot or list.
    pub path: Path,
    /// What happened.
    pub op: MutationOp,
    /// Written value(s); `Some(Value::Null)` is a written `null`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub payload: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Mutation {
    /// Assign `value` at `path` (container path + key).
    pub fn set(kind: Kind, path: Path, value: Value) -> Self {
        Self {
            kind,
            path,
            op: MutationOp::Set,
            payload: Some(value),
        }
    }

    /// Remove the slot at `path` (container path + key).
    pub fn delete(kind: Kind, path: Path) -> Self {
        Self {
            kind,
            path,
            op: MutationOp::Delete,
            payload: None,
        }
    }

    /// Append `values` to the list at `path`.
    pub fn append(path: Path, values: Vec<Value>) -> Self {
        Self {
            kind: Kind::Array,
            path,
            op: MutationOp::Append,
            payload: Some(Value::Array(values)),
        }
    }

    /// Prepend `values` to the list at `path`.
    pub fn prepend(path: Path, values: Vec<Value>) -> Self {
        Self {
            kind: Kind::Array,
            path,
            op: MutationOp::Prepend,
            payload: Some(Value::Array(values)),
        }
    }

    /// Remove the first element of the list at `path`.
    pub fn remove_first(path: Path) -> Self {
        Self {
            kind: Kind::Array,
            path,
            op: MutationOp::RemoveFirst,
            payload: None,
        }
    }

    /// Reverse the list at `path`.
    pub fn reverse(path: Path) -> Self {
        Self {
            kind: Kind::Array,
            path,
            op: MutationOp::Reverse,
            payload: None,
        }
    }

    /// Copy of this record re-addressed under `prefix`.
    pub fn prefixed(&self, prefix: &Path) -> Self {
        Self {
            kind: self.kind,
            path: prefix.join(&self.path),
            op: self.op,
            payload: self.payload.clone(),
        }
    }

    /// Check the record's shape before it is replayed.
    ///
    /// Payload must be present iff the op requires one, bulk payloads must
    /// be arrays, object records may only `set`/`delete`, and keyed records
    /// must end with a key matching their container kind.
    pub fn validate(&self) -> FabricResult<()> {
        if !self.op.supports(self.kind) {
            return Err(FabricError::malformed(format!(
                "op {} is not valid on {}",
                self.op.name(),
                self.kind
            )));
        }
        match (&self.payload, self.op.requires_payload()) {
            (None, true) => {
                return Err(FabricError::malformed(format!(
                    "op {} at {} requires a payload",
                    self.op.name(),
                    self.path
                )))
            }
            (Some(_), false) => {
                return Err(FabricError::malformed(format!(
                    "op {} at {} must not carry a payload",
                    self.op.name(),
                    self.path
                )))
            }
            _ => {}
        }
        if matches!(self.op, MutationOp::Append | MutationOp::Prepend)
            && !matches!(self.payload, Some(Value::Array(_)))
        {
            return Err(FabricError::malformed(format!(
                "op {} at {} requires an array payload",
                self.op.name(),
                self.path
            )));
        }
        if self.op.is_keyed() {
            match (self.kind, self.path.last()) {
                (_, None) => {
                    return Err(FabricError::malformed(format!(
                        "op {} requires a non-empty path",
                        self.op.name()
                    )))
                }
                (Kind::Object, Some(Key::Index(_))) | (Kind::Array, Some(Key::Field(_))) => {
                    return Err(FabricError::malformed(format!(
                        "final key of {} does not address an {}",
                        self.path, self.kind
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A mutation with tracking metadata.
///
/// Intended as the record type of a root built with a transform, e.g.
/// `|m| TrackedMutation::new(m).with_timestamp(now_ms())`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackedMutation {
    /// The underlying record.
    #[serde(flatten)]
    pub mutation: Mutation,

    /// Unique identifier for this record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// When the record was captured (Unix epoch millis).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    /// Origin of the record (e.g. peer or session name).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TrackedMutation {
    #[inline]
    pub fn new(mutation: Mutation) -> Self {
        Self {
            mutation,
            id: None,
            timestamp: None,
            source: None,
        }
    }

    #[inline]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[inline]
    pub fn with_timestamp(mut self, ts: u64) -> Self {
        self.timestamp = Some(ts);
        self
    }

    #[inline]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[inline]
    pub fn into_mutation(self) -> Mutation {
        self.mutation
    }
}

impl From<Mutation> for TrackedMutation {
    fn from(mutation: Mutation) -> Self {
        TrackedMutation::new(mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn set_serializes_to_wire_shape() {
        let m = Mutation::set(Kind::Object, path!("season"), json!("summer"));
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            json!({"kind": "object", "path": ["season"], "op": "set", "payload": "summer"})
        );
    }

    #[test]
    fn payloadless_ops_omit_payload() {
        let m = Mutation::reverse(path!("arr"));
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            json!({"kind": "array", "path": ["arr"], "op": "reverse"})
        );
    }

    #[test]
    fn null_payload_survives_serde() {
        let m = Mutation::set(Kind::Object, path!("maybe"), Value::Null);
        let json = serde_json::to_string(&m).unwrap();
        let parsed: Mutation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.payload, Some(Value::Null));
        parsed.validate().unwrap();
    }

    #[test]
    fn append_uses_push_wire_name() {
        let m = Mutation::append(path!("arr"), vec![json!(4), json!(5)]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["op"], "push");
        assert_eq!(json["payload"], json!([4, 5]));
    }

    #[test]
    fn validate_rejects_missing_payload() {
        let m = Mutation {
            kind: Kind::Object,
            path: path!("a"),
            op: MutationOp::Set,
            payload: None,
        };
        assert!(matches!(
            m.validate(),
            Err(FabricError::MalformedMutation { .. })
        ));
    }

    #[test]
    fn validate_rejects_list_op_on_object() {
        let m = Mutation {
            kind: Kind::Object,
            path: path!("a"),
            op: MutationOp::Reverse,
            payload: None,
        };
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_rejects_index_key_on_object() {
        let m = Mutation::delete(Kind::Object, path!("a", 0usize));
        assert!(m.validate().is_err());
        let m = Mutation::delete(Kind::Array, path!("a", 0usize));
        assert!(m.validate().is_ok());
    }

    #[test]
    fn validate_rejects_scalar_bulk_payload() {
        let m = Mutation {
            kind: Kind::Array,
            path: path!("a"),
            op: MutationOp::Append,
            payload: Some(json!(1)),
        };
        assert!(m.validate().is_err());
    }

    #[test]
    fn prefixed_keeps_op_and_payload() {
        let m = Mutation::set(Kind::Array, path!(1usize), json!(2));
        let forwarded = m.prefixed(&path!("c"));
        assert_eq!(forwarded.path, path!("c", 1usize));
        assert_eq!(forwarded.payload, Some(json!(2)));
        assert_eq!(forwarded.op, MutationOp::Set);
    }

    #[test]
    fn tracked_mutation_flattens() {
        let tracked = TrackedMutation::new(Mutation::remove_first(path!("q")))
            .with_source("peer-a")
            .with_timestamp(42);
        let json = serde_json::to_value(&tracked).unwrap();
        assert_eq!(json["op"], "shift");
        assert_eq!(json["source"], "peer-a");
        assert_eq!(json["timestamp"], 42);
        assert!(json.get("id").is_none());
    }
}
