//! The uniform tagged value shared by every backend.

use crate::error::{DbError, DbResult};
use crate::models::Row;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A backend-neutral value, as bound into statements and read out of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// Identifier generated by the backend (a document ObjectId, as hex)
    Id(String),
    Array(Vec<Value>),
    Document(Row),
}

/// Bind-type tag computed from a value before it reaches the native client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Float,
    Text,
    Binary,
    Json,
}

impl ValueKind {
    /// Infer the bind type of a value: integer, boolean and null map to
    /// themselves, floats/bytes/nested values bind natively, anything else
    /// binds as text.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Int(_) => Self::Integer,
            Value::Float(_) => Self::Float,
            Value::Bytes(_) => Self::Binary,
            Value::Array(_) | Value::Document(_) => Self::Json,
            Value::Text(_) | Value::Id(_) => Self::Text,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        ValueKind::of(self)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Id(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Row> {
        match self {
            Self::Document(row) => Some(row),
            _ => None,
        }
    }

    /// Convert this value to an explicitly requested bind type.
    pub fn coerce(self, kind: ValueKind) -> DbResult<Value> {
        let mismatch = |value: &Value| {
            DbError::statement(
                format!("Binding parameter failed: cannot bind {} value as {}", value.kind(), kind),
                None,
            )
        };
        let coerced = match (kind, self) {
            (ValueKind::Null, _) => Value::Null,
            (_, Value::Null) => Value::Null,
            (ValueKind::Integer, Value::Int(v)) => Value::Int(v),
            (ValueKind::Integer, Value::Bool(v)) => Value::Int(i64::from(v)),
            (ValueKind::Integer, Value::Text(s)) => match s.trim().parse() {
                Ok(v) => Value::Int(v),
                Err(_) => return Err(mismatch(&Value::Text(s))),
            },
            (ValueKind::Boolean, Value::Bool(v)) => Value::Bool(v),
            (ValueKind::Boolean, Value::Int(v)) => Value::Bool(v != 0),
            (ValueKind::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" | "on" => Value::Bool(true),
                "0" | "false" | "f" | "no" | "off" | "" => Value::Bool(false),
                _ => return Err(mismatch(&Value::Text(s))),
            },
            (ValueKind::Float, Value::Float(v)) => Value::Float(v),
            (ValueKind::Float, Value::Int(v)) => Value::Float(v as f64),
            (ValueKind::Float, Value::Text(s)) => match s.trim().parse() {
                Ok(v) => Value::Float(v),
                Err(_) => return Err(mismatch(&Value::Text(s))),
            },
            (ValueKind::Text, value) => Value::Text(value.to_text()),
            (ValueKind::Binary, Value::Bytes(b)) => Value::Bytes(b),
            (ValueKind::Binary, Value::Text(s)) => Value::Bytes(s.into_bytes()),
            // Encoded as JSON at bind time
            (ValueKind::Json, value) => value,
            (_, value) => return Err(mismatch(&value)),
        };
        Ok(coerced)
    }

    /// Text rendition used when a value is bound as text.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) | Self::Id(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Array(_) | Self::Document(_) => JsonValue::from(self.clone()).to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Row> for Value {
    fn from(v: Row) -> Self {
        Self::Document(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(v)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(v) => Self::Bool(v),
            JsonValue::Number(n) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::Text(s),
            JsonValue::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Self::Document(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => JsonValue::Bool(v),
            Value::Int(v) => JsonValue::Number(v.into()),
            Value::Float(v) => serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Value::Text(s) | Value::Id(s) => JsonValue::String(s),
            Value::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
            Value::Array(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            Value::Document(row) => JsonValue::Object(
                row.into_iter()
                    .map(|(k, v)| (k, JsonValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_inference() {
        assert_eq!(ValueKind::of(&Value::Int(1)), ValueKind::Integer);
        assert_eq!(ValueKind::of(&Value::Bool(true)), ValueKind::Boolean);
        assert_eq!(ValueKind::of(&Value::Null), ValueKind::Null);
        assert_eq!(ValueKind::of(&Value::from("x")), ValueKind::Text);
        assert_eq!(ValueKind::of(&Value::Id("abc".into())), ValueKind::Text);
        assert_eq!(ValueKind::of(&Value::Float(1.5)), ValueKind::Float);
        assert_eq!(ValueKind::of(&Value::Bytes(vec![1])), ValueKind::Binary);
    }

    #[test]
    fn test_coerce_int_to_text() {
        assert_eq!(
            Value::Int(42).coerce(ValueKind::Text).unwrap(),
            Value::Text("42".into())
        );
    }

    #[test]
    fn test_coerce_text_to_integer() {
        assert_eq!(
            Value::from(" 7 ").coerce(ValueKind::Integer).unwrap(),
            Value::Int(7)
        );
        assert!(Value::from("seven").coerce(ValueKind::Integer).is_err());
    }

    #[test]
    fn test_coerce_to_boolean() {
        assert_eq!(Value::Int(0).coerce(ValueKind::Boolean).unwrap(), Value::Bool(false));
        assert_eq!(Value::from("true").coerce(ValueKind::Boolean).unwrap(), Value::Bool(true));
        assert!(Value::from("maybe").coerce(ValueKind::Boolean).is_err());
    }

    #[test]
    fn test_coerce_null_stays_null() {
        assert_eq!(Value::Null.coerce(ValueKind::Integer).unwrap(), Value::Null);
        assert_eq!(Value::Int(3).coerce(ValueKind::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_coerce_to_json_keeps_scalars() {
        assert_eq!(Value::Int(5).coerce(ValueKind::Json).unwrap(), Value::Int(5));
        assert_eq!(Value::from("x").coerce(ValueKind::Json).unwrap(), Value::from("x"));
        let list = Value::Array(vec![Value::Int(1)]);
        assert_eq!(list.clone().coerce(ValueKind::Json).unwrap(), list);
    }

    #[test]
    fn test_coerce_bool_to_float_fails() {
        let err = Value::Bool(true).coerce(ValueKind::Float).unwrap_err();
        assert!(err.to_string().contains("cannot bind boolean value as float"));
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
    }

    #[test]
    fn test_from_json_object_keeps_order() {
        let value = Value::from(json!({"z": 1, "a": [true, null], "m": {"x": 1.5}}));
        let row = value.as_document().unwrap();
        let keys: Vec<&str> = row.columns().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(
            row.get("a"),
            Some(&Value::Array(vec![Value::Bool(true), Value::Null]))
        );
    }

    #[test]
    fn test_serialize_bytes_as_base64() {
        let json = serde_json::to_value(Value::Bytes(b"hello world".to_vec())).unwrap();
        assert_eq!(json, json!("aGVsbG8gd29ybGQ="));
    }

    #[test]
    fn test_to_json_value() {
        let row: Row = [("n", Value::Int(1)), ("s", Value::from("x"))]
            .into_iter()
            .collect();
        assert_eq!(JsonValue::from(Value::Document(row)), json!({"n": 1, "s": "x"}));
    }
}
