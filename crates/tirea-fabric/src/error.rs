//! Error types for tracing and replay.

use crate::{Key, Kind, Path};
use thiserror::Error;

/// Result type alias for tirea-fabric operations.
pub type FabricResult<T> = Result<T, FabricError>;

/// Errors raised while tracing writes or replaying a trace.
#[derive(Debug, Error)]
pub enum FabricError {
    /// A record's path does not resolve against the replay target.
    ///
    /// The target has diverged from the state the trace was recorded
    /// against; the caller has to resynchronize from a full snapshot.
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The path that failed to resolve.
        path: Path,
        /// What was missing or mismatched.
        reason: String,
    },

    /// A root was requested for a value marked as untraced.
    #[error("cannot trace a value with tracing disabled")]
    DisabledTracing,

    /// A root was requested for a leaf value.
    #[error("cannot trace a non-structure value ({found})")]
    NotAStructure {
        /// JSON type name of the rejected value.
        found: &'static str,
    },

    /// Object addressed by index, or array addressed by field name.
    #[error("{kind} cannot be addressed by key {key}")]
    KeyMismatch {
        /// Kind of the addressed container.
        kind: Kind,
        /// The offending key.
        key: Key,
    },

    /// Array write past the end of the array.
    #[error("index {index} out of bounds (len: {len}) at {path}")]
    IndexOutOfBounds {
        /// Path of the array.
        path: Path,
        /// Requested index.
        index: usize,
        /// Current array length.
        len: usize,
    },

    /// List operation invoked on an object.
    #[error("operation {op} is not supported on {kind}")]
    UnsupportedOperation {
        /// Kind of the addressed container.
        kind: Kind,
        /// Operation name.
        op: &'static str,
    },

    /// A record violates the op/payload/kind invariants.
    #[error("malformed mutation: {message}")]
    MalformedMutation {
        /// Description of the violation.
        message: String,
    },

    /// A traced root would end up inside its own tree.
    #[error("traced root cannot be embedded inside its own tree")]
    CyclicEmbedding,

    /// Subscription edges connect roots; a nested node was given.
    #[error("expected a traced root")]
    NotARoot,

    /// Envelope update addressed to a state with no base value.
    #[error("unknown state: {name}")]
    UnknownState {
        /// The missing state name.
        name: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FabricError {
    #[inline]
    pub fn invalid_path(path: Path, reason: impl Into<String>) -> Self {
        FabricError::InvalidPath {
            path,
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn key_mismatch(kind: Kind, key: Key) -> Self {
        FabricError::KeyMismatch { kind, key }
    }

    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        FabricError::IndexOutOfBounds { path, index, len }
    }

    #[inline]
    pub fn unsupported(kind: Kind, op: &'static str) -> Self {
        FabricError::UnsupportedOperation { kind, op }
    }

    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        FabricError::MalformedMutation {
            message: message.into(),
        }
    }

    /// Whether the error means the replay target diverged from the
    /// recorded base state.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            FabricError::InvalidPath { .. } | FabricError::IndexOutOfBounds { .. }
        )
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn invalid_path_display_names_path() {
        let err = FabricError::invalid_path(path!("users", 3usize), "missing key");
        assert_eq!(err.to_string(), "invalid path $.users[3]: missing key");
        assert!(err.is_divergence());
    }

    #[test]
    fn key_mismatch_display() {
        let err = FabricError::key_mismatch(Kind::Object, Key::Index(2));
        assert_eq!(err.to_string(), "object cannot be addressed by key [2]");
        assert!(!err.is_divergence());
    }

    #[test]
    fn type_names() {
        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!(true)), "boolean");
        assert_eq!(value_type_name(&json!(1.5)), "number");
        assert_eq!(value_type_name(&json!("s")), "string");
        assert_eq!(value_type_name(&json!([])), "array");
        assert_eq!(value_type_name(&json!({})), "object");
    }
}
