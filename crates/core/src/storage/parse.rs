//! Stored value parsing utilities
//!
//! Lenient readers for loosely-typed JSON records. Nothing here fails: a
//! field that cannot be read comes back as `None`.

use chrono::{DateTime, Utc};
use rusqlite::Error as SqlError;
use serde_json::Value;

/// JavaScript-style truthiness of a stored flag
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0 && !x.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A field as a number, accepting numeric strings
pub fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite())
}

/// A strictly positive numeric field
pub fn positive_field(value: &Value, key: &str) -> Option<f64> {
    number_field(value, key).filter(|x| *x > 0.0)
}

/// A value as text; numbers are rendered, everything else is absent
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn text_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(as_text)
}

/// A text field after trimming, absent when blank
pub fn trimmed_field(value: &Value, key: &str) -> Option<String> {
    text_field(value, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A timestamp field, absent when missing or malformed
pub fn datetime_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value.get(key)?.as_str().and_then(parse_datetime)
}

/// Keys of an object whose values are truthy, or the items of an array
///
/// Ledgers were stored both as `{"3": true}` maps and as plain lists.
pub fn flag_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, flag)| is_truthy(flag))
            .map(|(key, _)| key.clone())
            .collect(),
        Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
        _ => Vec::new(),
    }
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn test_numeric_strings_are_coerced() {
        let record = json!({ "a": "365", "b": 0.5, "c": "abc", "d": -2 });
        assert_eq!(number_field(&record, "a"), Some(365.0));
        assert_eq!(number_field(&record, "b"), Some(0.5));
        assert_eq!(number_field(&record, "c"), None);
        assert_eq!(positive_field(&record, "d"), None);
        assert_eq!(number_field(&record, "missing"), None);
    }

    #[test]
    fn test_text_fields() {
        let record = json!({ "id": 42, "name": "  Trip  ", "blank": "  ", "obj": {} });
        assert_eq!(text_field(&record, "id").as_deref(), Some("42"));
        assert_eq!(trimmed_field(&record, "name").as_deref(), Some("Trip"));
        assert_eq!(trimmed_field(&record, "blank"), None);
        assert_eq!(text_field(&record, "obj"), None);
    }

    #[test]
    fn test_flag_keys_accepts_maps_and_lists() {
        let mut keys = flag_keys(Some(&json!({ "1": true, "2": false, "5": 1 })));
        keys.sort();
        assert_eq!(keys, vec!["1".to_string(), "5".to_string()]);
        assert_eq!(flag_keys(Some(&json!([3, "4"]))), vec!["3".to_string(), "4".to_string()]);
        assert!(flag_keys(Some(&json!("nope"))).is_empty());
        assert!(flag_keys(None).is_empty());
    }
}
