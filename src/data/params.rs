//! Typed open parameter map for exporters and executors

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EyeError;

/// Parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Null => "null",
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::String(_) => "string",
            ParamValue::List(_) => "list",
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Null => write!(f, ""),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::String(s) => write!(f, "{}", s),
            ParamValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i as i64)
    }
}

impl From<u64> for ParamValue {
    fn from(i: u64) -> Self {
        ParamValue::Int(i as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Parameters passed to `export`/`execute`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    /// Required non-empty string
    pub fn require_str(&self, key: &str) -> Result<&str, EyeError> {
        match self.values.get(key) {
            Some(ParamValue::String(s)) if !s.is_empty() => Ok(s),
            Some(ParamValue::String(_)) | None => {
                Err(EyeError::InvalidParams(format!("missing '{}'", key)))
            }
            Some(other) => Err(EyeError::InvalidParams(format!(
                "'{}' must be a string, got {}",
                key,
                other.kind()
            ))),
        }
    }

    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, EyeError> {
        match self.values.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(EyeError::InvalidParams(format!(
                "'{}' must be a string, got {}",
                key,
                other.kind()
            ))),
        }
    }

    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>, EyeError> {
        match self.values.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::Int(i)) if *i >= 0 => Ok(Some(*i as u64)),
            Some(ParamValue::String(s)) => s.parse::<u64>().map(Some).map_err(|_| {
                EyeError::InvalidParams(format!("'{}' must be a non-negative integer", key))
            }),
            Some(_) => Err(EyeError::InvalidParams(format!(
                "'{}' must be a non-negative integer",
                key
            ))),
        }
    }

    /// List of strings, also accepting a single comma separated string
    pub fn opt_str_list(&self, key: &str) -> Result<Option<Vec<String>>, EyeError> {
        match self.values.get(key) {
            None | Some(ParamValue::Null) => Ok(None),
            Some(ParamValue::String(s)) => Ok(Some(
                s.split(',')
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            Some(ParamValue::List(items)) => items
                .iter()
                .map(|item| match item {
                    ParamValue::String(s) => Ok(s.clone()),
                    other => Err(EyeError::InvalidParams(format!(
                        "'{}' must contain strings, got {}",
                        key,
                        other.kind()
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(EyeError::InvalidParams(format!(
                "'{}' must be a list, got {}",
                key,
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_str() {
        let params = Params::new().with("file", "out.txt").with("count", 3);

        assert_eq!(params.require_str("file").unwrap(), "out.txt");
        assert!(matches!(
            params.require_str("missing"),
            Err(EyeError::InvalidParams(_))
        ));
        assert!(matches!(
            params.require_str("count"),
            Err(EyeError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_str_list_forms() {
        let params: Params = serde_json::from_value(serde_json::json!({
            "a": "x, y,z",
            "b": ["x", "y"],
            "c": [1, 2]
        }))
        .unwrap();

        assert_eq!(params.opt_str_list("a").unwrap().unwrap(), vec!["x", "y", "z"]);
        assert_eq!(params.opt_str_list("b").unwrap().unwrap(), vec!["x", "y"]);
        assert!(params.opt_str_list("c").is_err());
        assert_eq!(params.opt_str_list("d").unwrap(), None);
    }

    #[test]
    fn test_opt_u64() {
        let params = Params::new().with("t", 250).with("s", "100").with("n", -1);
        assert_eq!(params.opt_u64("t").unwrap(), Some(250));
        assert_eq!(params.opt_u64("s").unwrap(), Some(100));
        assert!(params.opt_u64("n").is_err());
    }
}
