//! Firestore typed value encoding
//!
//! The REST API wraps every field in a typed envelope
//! (`{"stringValue": "..."}`, `{"mapValue": {"fields": {...}}}`, ...).
//! Timestamps are kept as ISO strings so range queries compare them
//! lexicographically.

use serde_json::{json, Map, Value};

/// Encode a plain JSON value as a Firestore value
pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() } })
        }
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), encode(value)))
        .collect()
}

/// Decode a Firestore value; `None` for envelopes this client does not use
pub fn decode(value: &Value) -> Option<Value> {
    let envelope = value.as_object()?;
    let (kind, inner) = envelope.iter().next()?;
    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool()?),
        "integerValue" => match inner {
            Value::String(s) => Value::from(s.parse::<i64>().ok()?),
            Value::Number(n) => Value::Number(n.clone()),
            _ => return None,
        },
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" => Value::String(inner.as_str()?.to_string()),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(decode).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => return None,
    };
    Some(decoded)
}

pub fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter_map(|(name, value)| decode(value).map(|v| (name.clone(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(encode(&json!(null)), json!({ "nullValue": null }));
        assert_eq!(encode(&json!(true)), json!({ "booleanValue": true }));
        assert_eq!(encode(&json!(4)), json!({ "integerValue": "4" }));
        assert_eq!(encode(&json!(0.5)), json!({ "doubleValue": 0.5 }));
        assert_eq!(encode(&json!("şiir")), json!({ "stringValue": "şiir" }));
    }

    #[test]
    fn test_decode_nested_document() {
        let wire = json!({
            "title": { "stringValue": "Deneme" },
            "rating": { "integerValue": "3" },
            "memberIds": { "arrayValue": { "values": [{ "stringValue": "a" }] } },
            "styleFlags": { "mapValue": { "fields": { "bold": { "booleanValue": true } } } },
            "deletedAt": { "nullValue": null },
            "emptyList": { "arrayValue": {} },
            "location": { "geoPointValue": { "latitude": 1.0, "longitude": 2.0 } }
        });

        let fields = decode_fields(wire.as_object().unwrap());
        assert_eq!(fields["title"], "Deneme");
        assert_eq!(fields["rating"], 3);
        assert_eq!(fields["memberIds"], json!(["a"]));
        assert_eq!(fields["styleFlags"], json!({ "bold": true }));
        assert!(fields["deletedAt"].is_null());
        assert_eq!(fields["emptyList"], json!([]));
        assert!(!fields.contains_key("location"));
    }

    #[test]
    fn test_encoded_fields_decode_back() {
        let plain = json!({
            "title": "x",
            "styleFlags": { "centered": false, "italic": true, "bold": false },
            "memberIds": ["a", "b"],
            "rating": null
        });
        let fields = plain.as_object().unwrap();
        assert_eq!(&decode_fields(&encode_fields(fields)), fields);
    }
}
