//! Query parameter and result models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A materialized result row: field name to decoded value, in driver column
/// order (`serde_json::Map` preserves insertion order).
pub type Row = serde_json::Map<String, JsonValue>;

/// Typed statement parameter.
///
/// This is the open union at the executor boundary; values bind to `$1`,
/// `$2`, ... placeholders and are converted to concrete Rust types before any
/// application logic sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(JsonValue),
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
