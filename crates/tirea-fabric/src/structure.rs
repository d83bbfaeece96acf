//! Structure predicate: which values are traceable containers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The two traceable container shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Keyed map (JSON object).
    Object,
    /// Ordered list (JSON array).
    Array,
}

impl Kind {
    /// Classify a JSON value; `None` for leaves.
    #[inline]
    pub fn of(value: &Value) -> Option<Kind> {
        match value {
            Value::Object(_) => Some(Kind::Object),
            Value::Array(_) => Some(Kind::Array),
            _ => None,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Array => "array",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// True iff `value` is an object or an array.
///
/// Every place that decides whether to recurse into a value goes through
/// this check; `null` and scalars are always leaves.
#[inline]
pub fn is_structure(value: &Value) -> bool {
    Kind::of(value).is_some()
}
