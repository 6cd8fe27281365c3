//! Dotted-path access over dynamic documents.
//!
//! Documents are `serde_json::Value` trees. Indexing and projections address
//! fields through the *flattened* form of a document: nested objects are
//! walked and their keys joined with `.`, so `{ "a": { "b": 1 } }` exposes
//! the path `a.b`. Arrays are leaves; they are never flattened into paths.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flatten a document into its dotted-path leaves.
///
/// A key that itself contains a `.` is indistinguishable from a nested
/// object in the flattened form; the last writer wins, matching the order
/// object entries are visited.
#[must_use]
pub fn flatten(doc: &Value) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Value::Object(map) = doc {
        flatten_into(&mut out, None, map);
    }
    out
}

fn flatten_into(out: &mut BTreeMap<String, Value>, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) => flatten_into(out, Some(&path), nested),
            other => {
                out.insert(path, other.clone());
            }
        }
    }
}

/// Extract a single dotted path from a document.
#[must_use]
pub fn extract(doc: &Value, path: &str) -> Option<Value> {
    flatten(doc).remove(path)
}

/// Build a projection payload from a document.
///
/// Picks every projected path from the flattened document, omitting paths
/// whose value is null or absent. Returns `None` when every projected value
/// is absent, so the caller can store a null payload instead of an empty
/// object.
#[must_use]
pub fn project(doc: &Value, paths: &[String]) -> Option<Map<String, Value>> {
    let flat = flatten(doc);
    let mut out = Map::new();
    for path in paths {
        match flat.get(path.as_str()) {
            None | Some(Value::Null) => {}
            Some(value) => {
                out.insert(path.clone(), value.clone());
            }
        }
    }
    if out.is_empty() { None } else { Some(out) }
}

/// Trim a value to the requested dotted paths.
///
/// Used both on projection payloads (already keyed by path) and on full
/// documents fetched in a second pass, so the caller-visible shape does not
/// depend on which path produced the value.
#[must_use]
pub fn pick(value: &Value, paths: &[String]) -> Value {
    let flat = flatten(value);
    let mut out = Map::new();
    for path in paths {
        if let Some(v) = flat.get(path.as_str()) {
            out.insert(path.clone(), v.clone());
        }
    }
    Value::Object(out)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_joins_nested_keys_with_dots() {
        let doc = json!({ "a": { "b": 1, "c": { "d": "x" } }, "e": true });
        let flat = flatten(&doc);

        assert_eq!(flat.get("a.b"), Some(&json!(1)));
        assert_eq!(flat.get("a.c.d"), Some(&json!("x")));
        assert_eq!(flat.get("e"), Some(&json!(true)));
        assert_eq!(flat.get("a"), None);
    }

    #[test]
    fn flatten_keeps_arrays_as_leaves() {
        let doc = json!({ "tags": ["a", "b"], "n": { "list": [1] } });
        let flat = flatten(&doc);

        assert_eq!(flat.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(flat.get("n.list"), Some(&json!([1])));
    }

    #[test]
    fn flatten_of_non_object_is_empty() {
        assert!(flatten(&json!("scalar")).is_empty());
        assert!(flatten(&json!(null)).is_empty());
    }

    #[test]
    fn extract_reads_dotted_paths() {
        let doc = json!({ "address": { "city": "Reno" } });
        assert_eq!(extract(&doc, "address.city"), Some(json!("Reno")));
        assert_eq!(extract(&doc, "address.street"), None);
    }

    #[test]
    fn project_omits_null_and_absent_values() {
        let doc = json!({ "firstName": "Ada", "middleName": null });
        let paths = vec![
            "firstName".to_owned(),
            "middleName".to_owned(),
            "lastName".to_owned(),
        ];

        let payload = project(&doc, &paths).expect("payload");
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.get("firstName"), Some(&json!("Ada")));
    }

    #[test]
    fn project_is_absent_when_every_value_is_absent() {
        let doc = json!({ "other": 1 });
        let paths = vec!["firstName".to_owned()];
        assert!(project(&doc, &paths).is_none());
    }

    #[test]
    fn pick_trims_to_requested_paths() {
        let doc = json!({ "firstName": "Ada", "lastName": "Lovelace", "age": 36 });
        let paths = vec!["firstName".to_owned(), "age".to_owned()];

        assert_eq!(
            pick(&doc, &paths),
            json!({ "firstName": "Ada", "age": 36 })
        );
    }
}
