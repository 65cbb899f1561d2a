//! Record cleaning.
//!
//! Raw dump records carry placeholder strings wherever the recorder gave up
//! on a value, and field names straight from Java reflection. Cleaning drops
//! the placeholders, collapses whatever becomes empty, and turns every object
//! key into a plain identifier.

use std::collections::HashSet;

use serde_json::{Map, Value};

use statedump_java::runtime::{CYCLE_SENTINEL, MAX_DEPTH_SENTINEL, SERIALIZATION_ERROR_PREFIX};

/// True for the recorder's placeholder strings.
pub fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            s == CYCLE_SENTINEL || s == MAX_DEPTH_SENTINEL || s.starts_with(SERIALIZATION_ERROR_PREFIX)
        }
        _ => false,
    }
}

/// Clean one value.
///
/// Returns `None` when the value is a placeholder or a container left empty
/// after cleaning; the caller drops it.
pub fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let cleaned = clean_object(map);
            (!cleaned.is_empty()).then_some(Value::Object(cleaned))
        }
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.into_iter().filter_map(clean_value).collect();
            (!cleaned.is_empty()).then_some(Value::Array(cleaned))
        }
        other if is_placeholder(&other) => None,
        other => Some(other),
    }
}

/// Clean a top-level record. Records that clean to nothing are dropped.
pub fn clean_record(record: Value) -> Option<Value> {
    clean_value(record)
}

fn clean_object(map: Map<String, Value>) -> Map<String, Value> {
    let mut used: HashSet<String> = HashSet::new();
    let mut out = Map::new();
    for (key, value) in map {
        let Some(value) = clean_value(value) else {
            continue;
        };
        let key = unique_key(sanitize_key(&key), &used);
        used.insert(key.clone());
        out.insert(key, value);
    }
    out
}

/// Turn a field name into an identifier over `[A-Za-z0-9_]`.
///
/// A name with nothing valid left becomes `field_<key>`.
pub fn sanitize_key(key: &str) -> String {
    let kept: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if kept.is_empty() {
        return format!("field_{}", key);
    }
    if kept.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", kept)
    } else {
        kept
    }
}

/// `base`, or `base_1`, `base_2`, ... whichever is not yet used.
fn unique_key(base: String, used: &HashSet<String>) -> String {
    if !used.contains(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod clean_tests {
        use super::*;

        #[test]
        fn sentinels_removed_and_empties_cascade() {
            let record = json!({
                "phase": "entry",
                "self": {
                    "parent": "[CYCLE_DETECTED]",
                    "deep": {"inner": "[MAX_DEPTH_REACHED]"},
                    "list": ["[CYCLE_DETECTED]"],
                    "value": 3
                },
                "broken": "[SERIALIZATION_ERROR: boom]"
            });
            let cleaned = clean_record(record).unwrap();
            assert_eq!(cleaned, json!({"phase": "entry", "self": {"value": 3}}));
        }

        #[test]
        fn record_of_only_placeholders_dropped() {
            assert!(clean_record(json!({"a": {"b": ["[MAX_DEPTH_REACHED]"]}})).is_none());
            assert!(clean_record(json!("[CYCLE_DETECTED]")).is_none());
            assert!(clean_record(json!({})).is_none());
        }

        #[test]
        fn array_items_filtered_in_order() {
            let cleaned = clean_value(json!([1, "[CYCLE_DETECTED]", 2, [], {}, 3])).unwrap();
            assert_eq!(cleaned, json!([1, 2, 3]));
        }

        #[test]
        fn ordinary_scalars_survive() {
            let cleaned = clean_record(json!({"n": null, "s": "", "b": false, "x": "NaN"})).unwrap();
            assert_eq!(cleaned, json!({"n": null, "s": "", "b": false, "x": "NaN"}));
        }

        #[test]
        fn no_placeholder_anywhere_after_cleaning() {
            let record = json!({
                "a": [{"b": "[CYCLE_DETECTED]", "c": ["[SERIALIZATION_ERROR x]", 1]}],
                "d": {"e": {"f": "[MAX_DEPTH_REACHED]"}}
            });
            let cleaned = clean_record(record).unwrap();
            let text = cleaned.to_string();
            assert!(!text.contains("[CYCLE_DETECTED]"));
            assert!(!text.contains("[MAX_DEPTH_REACHED]"));
            assert!(!text.contains("[SERIALIZATION_ERROR"));
            assert!(!text.contains("{}"));
            assert!(!text.contains("[]"));
        }
    }

    mod key_tests {
        use super::*;

        #[test]
        fn invalid_characters_removed() {
            assert_eq!(sanitize_key("this$0"), "this0");
            assert_eq!(sanitize_key("my-field"), "myfield");
            assert_eq!(sanitize_key("plain_name"), "plain_name");
        }

        #[test]
        fn leading_digit_prefixed() {
            assert_eq!(sanitize_key("0abc"), "_0abc");
            assert_eq!(sanitize_key("9"), "_9");
        }

        #[test]
        fn nothing_valid_falls_back() {
            assert_eq!(sanitize_key("$$"), "field_$$");
            assert_eq!(sanitize_key(""), "field_");
        }

        #[test]
        fn sanitized_keys_are_identifiers() {
            for key in ["a.b", "x y", "1st", "ok", "é", "__"] {
                let out = sanitize_key(key);
                let valid = !out.is_empty()
                    && out.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && !out.starts_with(|c: char| c.is_ascii_digit());
                assert!(valid || out == format!("field_{}", key), "{} -> {}", key, out);
            }
        }

        #[test]
        fn collisions_get_suffixes() {
            let cleaned = clean_record(json!({"a-b": 1, "ab": 2, "a.b": 3})).unwrap();
            let map = cleaned.as_object().unwrap();
            assert_eq!(map.len(), 3);
            assert!(map.contains_key("ab"));
            assert!(map.contains_key("ab_1"));
            assert!(map.contains_key("ab_2"));
        }

        #[test]
        fn nested_keys_sanitized() {
            let cleaned = clean_record(json!({"self": {"val$1": {"x-y": 1}}})).unwrap();
            assert_eq!(cleaned, json!({"self": {"val1": {"xy": 1}}}));
        }
    }
}
