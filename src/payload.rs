//! Typed record payloads and the field helpers strategies are built from.

use crate::error::RecordError;
use serde_json::{Map, Value};

/// One decoded input record: a JSON object owned by the worker processing it.
pub type Payload = Map<String, Value>;

/// Decodes one input line into a [`Payload`]. Anything but a JSON object is rejected.
pub fn decode(raw: &[u8]) -> Result<Payload, RecordError> {
    match serde_json::from_slice::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(RecordError::NotAnObject),
    }
}

pub fn encode(payload: &Payload) -> Result<Vec<u8>, RecordError> {
    Ok(serde_json::to_vec(payload)?)
}

/// Returns a required, non-empty string field.
pub fn string_field<'a>(payload: &'a Payload, field: &str) -> Result<&'a str, RecordError> {
    let value = payload
        .get(field)
        .ok_or_else(|| RecordError::MissingField(field.to_string()))?;
    let s = value
        .as_str()
        .ok_or_else(|| RecordError::wrong_type(field, "string"))?;
    if s.is_empty() {
        return Err(RecordError::EmptyField(field.to_string()));
    }
    Ok(s)
}

/// Returns the field when it is a non-empty string, `None` otherwise.
pub fn optional_string<'a>(payload: &'a Payload, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Deletes every field not in `allowed` and returns the removed names.
pub fn retain_fields(payload: &mut Payload, allowed: &[&str]) -> Vec<String> {
    let removed: Vec<String> = payload
        .keys()
        .filter(|k| !allowed.contains(&k.as_str()))
        .cloned()
        .collect();
    for key in &removed {
        payload.remove(key);
    }
    removed
}

/// Deletes the listed fields that are present and returns their names.
pub fn remove_fields(payload: &mut Payload, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| payload.remove(**f).is_some())
        .map(|f| f.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn decode_object() {
        let payload = decode(br#"{"name":"Bolt","hp":60}"#).unwrap();
        assert_eq!(payload["name"], json!("Bolt"));
        assert_eq!(payload["hp"], json!(60));
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(decode(b"[1,2]"), Err(RecordError::NotAnObject)));
        assert!(matches!(decode(b"\"x\""), Err(RecordError::NotAnObject)));
        assert!(matches!(decode(b"{not json"), Err(RecordError::Json(_))));
    }

    #[test]
    fn string_field_variants() {
        let payload = obj(json!({"id": "A1", "num": 5, "empty": ""}));
        assert_eq!(string_field(&payload, "id").unwrap(), "A1");
        assert!(matches!(
            string_field(&payload, "missing"),
            Err(RecordError::MissingField(f)) if f == "missing"
        ));
        assert!(matches!(
            string_field(&payload, "num"),
            Err(RecordError::WrongType { field, .. }) if field == "num"
        ));
        assert!(matches!(
            string_field(&payload, "empty"),
            Err(RecordError::EmptyField(f)) if f == "empty"
        ));
    }

    #[test]
    fn optional_string_skips_empty_and_non_strings() {
        let payload = obj(json!({"a": "x", "b": "", "c": 3}));
        assert_eq!(optional_string(&payload, "a"), Some("x"));
        assert_eq!(optional_string(&payload, "b"), None);
        assert_eq!(optional_string(&payload, "c"), None);
        assert_eq!(optional_string(&payload, "d"), None);
    }

    #[test]
    fn retain_fields_reports_removed() {
        let mut payload = obj(json!({"name": "Bolt", "extra": "x", "other": 1}));
        let mut removed = retain_fields(&mut payload, &["name"]);
        removed.sort();
        assert_eq!(removed, vec!["extra", "other"]);
        assert_eq!(Value::Object(payload), json!({"name": "Bolt"}));
    }

    #[test]
    fn remove_fields_only_reports_present() {
        let mut payload = obj(json!({"id": "s1", "total": 10}));
        let removed = remove_fields(&mut payload, &["total", "updatedAt"]);
        assert_eq!(removed, vec!["total"]);
        assert_eq!(Value::Object(payload), json!({"id": "s1"}));
    }
}
