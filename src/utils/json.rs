use chrono::NaiveDateTime;
use serde_json::Value;

use super::time::parse_datetime;
use crate::validation::validate_url_array;

pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

/// A string field that may be omitted but not nulled.
pub fn optional_string(body: &Value, field: &str) -> Result<Option<String>, String> {
    match classify_nullable(body.get(field))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Err(format!("{field} cannot be null")),
        NullableValue::String(value) => Ok(Some(value)),
    }
}

/// `Some(None)` clears the timestamp, `None` leaves it untouched.
pub fn nullable_datetime(
    body: &Value,
    field: &str,
) -> Result<Option<Option<NaiveDateTime>>, String> {
    match classify_nullable(body.get(field))? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(value) => parse_datetime(&value)
            .map(Some)
            .map_err(|err| format!("{field}: {err}")),
    }
}

pub fn optional_bool(body: &Value, field: &str) -> Result<Option<bool>, String> {
    match body.get(field) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(format!("{field}: expected boolean, got {other}")),
    }
}

/// A URL array field; `null` clears it.
pub fn optional_url_array(body: &Value, field: &str) -> Result<Option<Vec<String>>, String> {
    body.get(field)
        .map(|value| validate_url_array(value).map_err(|err| err.to_string()))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn distinguishes_omitted_null_and_value() {
        let body = json!({ "filed": null, "notes": "hi" });
        assert_eq!(nullable_datetime(&body, "filed"), Ok(Some(None)));
        assert_eq!(nullable_datetime(&body, "closed"), Ok(None));
        assert_eq!(optional_string(&body, "notes"), Ok(Some("hi".to_string())));
        assert!(optional_string(&body, "filed").is_err());
    }

    #[test]
    fn url_arrays_report_shape_errors() {
        let body = json!({ "a": "https://x.example", "b": [1], "c": ["nope"], "d": null });
        assert_eq!(
            optional_url_array(&body, "a"),
            Err("Value must be a list".to_string())
        );
        assert_eq!(
            optional_url_array(&body, "b"),
            Err("Value must be a list of URLs as strings".to_string())
        );
        assert_eq!(
            optional_url_array(&body, "c"),
            Err("Value must be a list of valid URLs".to_string())
        );
        assert_eq!(optional_url_array(&body, "d"), Ok(Some(Vec::new())));
        assert_eq!(optional_url_array(&body, "e"), Ok(None));
    }
}
