//! The value domain the protocol engine operates on.
//!
//! Everything that crosses the wire is modeled as a single owned
//! [`Value`] tree: JSON scalars and containers plus the rich scalar
//! kinds (temporal instant, keyed mapping, unordered set, error-like
//! record) that JSON itself cannot express. Rich scalars are opaque to
//! shape extraction and fingerprinting but are preserved verbatim by
//! the envelope.
//!
//! Because values are owned trees, reference cycles cannot be
//! constructed; recursion over a value is bounded by the depth cap
//! instead of an identity-visited set.

use serde_json::Number;

/// A JSON-shaped value, extended with the rich scalar kinds.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// Finite number. [`serde_json::Number`] keeps integer and float
    /// identity intact across a round trip.
    Number(Number),
    String(String),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// Keyed record. Entry order is preserved in memory but is *not*
    /// semantic: equality and every canonical traversal ignore it.
    Object(Vec<(String, Value)>),
    /// Temporal instant, carried as its ISO-8601 rendering.
    Date(String),
    /// Keyed mapping with arbitrary-value keys, entry order preserved.
    Map(Vec<(Value, Value)>),
    /// Unordered set. Element order is preserved on the wire.
    Set(Vec<Value>),
    /// Error-like record.
    Error(ErrorValue),
}

/// The payload of [`Value::Error`].
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub message: String,
    pub name: String,
    pub stack: Option<String>,
}

impl Value {
    /// True for the two container kinds; everything else (rich scalars
    /// included) occupies a single slot in a linearized sequence.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// True for the rich scalar kinds.
    pub fn is_rich(&self) -> bool {
        matches!(
            self,
            Value::Date(_) | Value::Map(_) | Value::Set(_) | Value::Error(_)
        )
    }

    /// Kind label, used in log lines and error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Date(_) => "date",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Error(_) => "error",
        }
    }
}

// Object entries compare as unordered key/value sets; insertion order
// is not semantic. All other kinds compare structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                if a.len() != b.len() {
                    return false;
                }

                let mut lhs: Vec<_> = a.iter().collect();
                let mut rhs: Vec<_> = b.iter().collect();
                lhs.sort_by(|x, y| x.0.cmp(&y.0));
                rhs.sort_by(|x, y| x.0.cmp(&y.0));

                lhs == rhs
            }
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

/// Literal conversion from parsed JSON. No envelope interpretation
/// happens here; `{"__type": …}` objects stay plain objects. Use
/// [`crate::envelope::from_wire`] for the rich-aware conversion.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(fields) => {
                Value::Object(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
