//! The rich-type envelope.
//!
//! JSON has no temporal, mapping, set, or error kind, so rich scalars
//! cross the wire as `{"__type": …, "value": …}` envelopes. The two
//! conversions here are the only boundary between [`Value`] trees and
//! [`serde_json::Value`]; every packet slot and every learned body
//! passes through them.

use serde_json::json;

use crate::value::{ErrorValue, Value};

const TYPE_KEY: &str = "__type";
const VALUE_KEY: &str = "value";

const MARKER_DATE: &str = "Date";
const MARKER_MAP: &str = "Map";
const MARKER_SET: &str = "Set";
const MARKER_ERROR: &str = "Error";

/// Serialize a value into its wire JSON, wrapping rich scalars in
/// envelopes. Containers recurse, preserving order; plain scalars pass
/// through unchanged.
pub fn to_wire(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(n.clone()),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_wire).collect()),
        Value::Object(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(key, child)| (key.clone(), to_wire(child)))
                .collect(),
        ),
        Value::Date(instant) => json!({ TYPE_KEY: MARKER_DATE, VALUE_KEY: instant }),
        Value::Map(entries) => {
            let pairs: Vec<serde_json::Value> = entries
                .iter()
                .map(|(k, v)| serde_json::Value::Array(vec![to_wire(k), to_wire(v)]))
                .collect();

            json!({ TYPE_KEY: MARKER_MAP, VALUE_KEY: pairs })
        }
        Value::Set(items) => {
            let items: Vec<serde_json::Value> = items.iter().map(to_wire).collect();

            json!({ TYPE_KEY: MARKER_SET, VALUE_KEY: items })
        }
        Value::Error(err) => {
            let mut body = serde_json::Map::new();
            body.insert("message".into(), json!(err.message));
            body.insert("name".into(), json!(err.name));
            if let Some(stack) = &err.stack {
                body.insert("stack".into(), json!(stack));
            }

            json!({ TYPE_KEY: MARKER_ERROR, VALUE_KEY: body })
        }
    }
}

/// Deserialize wire JSON into a value, unwrapping recognized
/// envelopes.
///
/// An envelope with an unrecognized `__type` yields the contents of
/// its `value` field rather than an error, so peers that learn new
/// markers stay interoperable with ones that have not. A recognized
/// marker with a malformed payload degrades to a plain object the same
/// way; this function is total.
pub fn from_wire(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_wire).collect())
        }
        serde_json::Value::Object(fields) => unwrap_object(fields),
    }
}

fn unwrap_object(fields: serde_json::Map<String, serde_json::Value>) -> Value {
    let marker = fields.get(TYPE_KEY).and_then(|m| m.as_str());

    if let (Some(marker), true) = (marker, fields.contains_key(VALUE_KEY)) {
        let marker = marker.to_string();
        let mut fields = fields;
        let payload = fields.remove(VALUE_KEY).unwrap_or(serde_json::Value::Null);

        if let Some(rich) = unwrap_rich(&marker, payload.clone()) {
            return rich;
        }

        // unknown marker: forward compatibility, surface the payload
        if !matches!(
            marker.as_str(),
            MARKER_DATE | MARKER_MAP | MARKER_SET | MARKER_ERROR
        ) {
            return from_wire(payload);
        }

        // recognized marker, malformed payload: reassemble the object
        fields.insert(VALUE_KEY.into(), payload);
        return plain_object(fields);
    }

    plain_object(fields)
}

fn plain_object(fields: serde_json::Map<String, serde_json::Value>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, child)| (key, from_wire(child)))
            .collect(),
    )
}

/// Decode one recognized envelope payload, or `None` when it does not
/// have the documented form.
fn unwrap_rich(marker: &str, payload: serde_json::Value) -> Option<Value> {
    match marker {
        MARKER_DATE => match payload {
            serde_json::Value::String(instant) => Some(Value::Date(instant)),
            _ => None,
        },
        MARKER_MAP => match payload {
            serde_json::Value::Array(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());

                for pair in pairs {
                    match pair {
                        serde_json::Value::Array(kv) if kv.len() == 2 => {
                            let mut kv = kv.into_iter();
                            let key = from_wire(kv.next().unwrap());
                            let value = from_wire(kv.next().unwrap());
                            entries.push((key, value));
                        }
                        _ => return None,
                    }
                }

                Some(Value::Map(entries))
            }
            _ => None,
        },
        MARKER_SET => match payload {
            serde_json::Value::Array(items) => {
                Some(Value::Set(items.into_iter().map(from_wire).collect()))
            }
            _ => None,
        },
        MARKER_ERROR => match payload {
            serde_json::Value::Object(body) => {
                let message = body.get("message").and_then(|m| m.as_str())?.to_string();
                let name = body.get("name").and_then(|n| n.as_str())?.to_string();
                let stack = body
                    .get("stack")
                    .and_then(|s| s.as_str())
                    .map(str::to_string);

                Some(Value::Error(ErrorValue {
                    message,
                    name,
                    stack,
                }))
            }
            _ => None,
        },
        _ => None,
    }
}
