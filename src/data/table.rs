//! Tabular presentation helpers for query results.
//!
//! Records carrying a nested list of objects are exploded into one row per
//! element, and consecutive rows repeating the same state for a key can be
//! collapsed. This is presentation only; checks never depend on it.

use std::collections::HashMap;

use super::record::QueryResult;

pub type Row = serde_json::Map<String, serde_json::Value>;

/// Explode records into rows.
///
/// A record whose field holds a list of objects yields one row per element,
/// each row carrying the record's other scalar fields plus the element's
/// fields. Records without such a list become a single row. Non-object
/// records are wrapped as `{"value": ...}`.
pub fn explode(records: &[QueryResult]) -> Vec<Row> {
    let mut rows = Vec::new();

    for record in records {
        let Some(map) = record.as_object() else {
            let mut row = Row::new();
            row.insert("value".to_string(), record.info().clone());
            rows.push(row);
            continue;
        };

        let common: Row = map
            .iter()
            .filter(|(_, v)| !v.is_array())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut expanded = false;
        for value in map.values() {
            if let serde_json::Value::Array(children) = value {
                expanded = true;
                for child in children {
                    let mut row = common.clone();
                    match child {
                        serde_json::Value::Object(fields) => {
                            for (k, v) in fields {
                                row.insert(k.clone(), v.clone());
                            }
                        }
                        other => {
                            row.insert("value".to_string(), other.clone());
                        }
                    }
                    rows.push(row);
                }
            }
        }

        if !expanded {
            rows.push(map.clone());
        }
    }

    rows
}

/// Keep a row only when its `value_column` differs from the last kept row
/// with the same `key_column` value.
pub fn collapse_unchanged(rows: Vec<Row>, key_column: &str, value_column: &str) -> Vec<Row> {
    let mut last_states: HashMap<String, serde_json::Value> = HashMap::new();
    let mut result = Vec::with_capacity(rows.len());

    for row in rows {
        let key = row
            .get(key_column)
            .map(|k| k.to_string())
            .unwrap_or_default();
        let value = row.get(value_column).cloned().unwrap_or(serde_json::Value::Null);

        if last_states.get(&key) != Some(&value) {
            last_states.insert(key, value);
            result.push(row);
        }
    }

    result
}

/// Ordered union of column names over all rows
pub fn columns(rows: &[Row]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !result.iter().any(|c| c == key) {
                result.push(key.clone());
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explode_nested_list() {
        let records = vec![
            QueryResult::new(json!({
                "host": "a",
                "procs": [ { "pid": 1 }, { "pid": 2 } ]
            })),
            QueryResult::new(json!({ "host": "b" })),
        ];

        let rows = explode(&records);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["host"], json!("a"));
        assert_eq!(rows[0]["pid"], json!(1));
        assert_eq!(rows[1]["pid"], json!(2));
        assert_eq!(rows[2]["host"], json!("b"));
    }

    #[test]
    fn test_collapse_unchanged() {
        let rows: Vec<Row> = vec![
            json!({"svc": "db", "state": "up"}),
            json!({"svc": "db", "state": "up"}),
            json!({"svc": "web", "state": "up"}),
            json!({"svc": "db", "state": "down"}),
            json!({"svc": "db", "state": "down"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();

        let collapsed = collapse_unchanged(rows, "svc", "state");
        assert_eq!(collapsed.len(), 3);
        assert_eq!(collapsed[2]["state"], json!("down"));
    }

    #[test]
    fn test_columns_union() {
        let rows = explode(&[
            QueryResult::new(json!({"a": 1})),
            QueryResult::new(json!({"b": 2, "a": 3})),
        ]);
        let cols = columns(&rows);
        assert_eq!(cols.len(), 2);
        assert!(cols.contains(&"a".to_string()));
        assert!(cols.contains(&"b".to_string()));
    }
}
