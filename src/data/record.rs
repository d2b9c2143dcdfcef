use serde::{Deserialize, Serialize};

use super::value::Value;

/// One record produced by a query.
///
/// The payload shape is defined by the backend. The core only needs field
/// lookup (for expressions) and a serialized form (for patterns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryResult {
    info: serde_json::Value,
}

impl QueryResult {
    pub fn new(info: serde_json::Value) -> Self {
        Self { info }
    }

    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            info: serde_json::Value::Object(map),
        }
    }

    pub fn info(&self) -> &serde_json::Value {
        &self.info
    }

    pub fn into_info(self) -> serde_json::Value {
        self.info
    }

    pub fn as_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.info.as_object()
    }

    /// Resolve a (possibly dotted) field path.
    ///
    /// Each segment is looked up exactly first and case-insensitively second,
    /// since SQL-ish column names rarely match the backend's casing.
    /// Numeric segments index into arrays.
    pub fn field(&self, path: &[&str]) -> Option<&serde_json::Value> {
        let mut current = &self.info;
        for segment in path {
            current = match current {
                serde_json::Value::Object(map) => match map.get(*segment) {
                    Some(v) => v,
                    None => map
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(segment))
                        .map(|(_, v)| v)?,
                },
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Field value as a scalar, NULL when absent
    pub fn value(&self, path: &[&str]) -> Value {
        self.field(path).map(Value::from_json).unwrap_or(Value::Null)
    }

    /// Text used for pattern matching: the string itself for string payloads,
    /// compact JSON otherwise.
    pub fn to_text(&self) -> String {
        match &self.info {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Value> for QueryResult {
    fn from(info: serde_json::Value) -> Self {
        Self::new(info)
    }
}
