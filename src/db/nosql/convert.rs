//! Conversion between [`Value`]/[`Row`] and BSON.

use crate::models::{Document, Row, Value};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{self, Binary, Bson};

pub fn to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(v) => Bson::Boolean(v),
        Value::Int(v) => Bson::Int64(v),
        Value::Float(v) => Bson::Double(v),
        Value::Text(s) => Bson::String(s),
        Value::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes,
        }),
        // Ids handed out by insert() go back in as ObjectIds
        Value::Id(id) => match ObjectId::parse_str(&id) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(id),
        },
        Value::Array(items) => Bson::Array(items.into_iter().map(to_bson).collect()),
        Value::Document(row) => Bson::Document(to_document(row)),
    }
}

pub fn to_document(row: Document) -> bson::Document {
    row.into_iter()
        .map(|(key, value)| (key, to_bson(value)))
        .collect()
}

pub fn from_bson(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(v) => Value::Bool(v),
        Bson::Int32(v) => Value::Int(i64::from(v)),
        Bson::Int64(v) => Value::Int(v),
        Bson::Double(v) => Value::Float(v),
        Bson::String(s) | Bson::Symbol(s) => Value::Text(s),
        Bson::ObjectId(oid) => Value::Id(oid.to_hex()),
        Bson::Binary(binary) => Value::Bytes(binary.bytes),
        Bson::Array(items) => Value::Array(items.into_iter().map(from_bson).collect()),
        Bson::Document(doc) => Value::Document(from_document(doc)),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Int(dt.timestamp_millis()),
        },
        // Decimal128, regex, timestamps and the rest: relaxed extended JSON
        other => Value::from(other.into_relaxed_extjson()),
    }
}

pub fn from_document(doc: bson::Document) -> Row {
    doc.into_iter()
        .map(|(key, value)| (key, from_bson(value)))
        .collect()
}

/// Wrap a plain field document in `$set`; documents that already use
/// update operators pass through.
pub fn update_document(update: Document) -> bson::Document {
    let has_operators = update.columns().any(|key| key.starts_with('$'));
    let update = to_document(update);
    if has_operators {
        update
    } else {
        bson::doc! { "$set": update }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversion() {
        assert_eq!(to_bson(Value::Int(5)), Bson::Int64(5));
        assert_eq!(to_bson(Value::Null), Bson::Null);
        assert_eq!(from_bson(Bson::Int32(7)), Value::Int(7));
        assert_eq!(from_bson(Bson::String("x".into())), Value::from("x"));
    }

    #[test]
    fn test_object_id_hex_round_trips_through_id() {
        let oid = ObjectId::new();
        let value = from_bson(Bson::ObjectId(oid));
        assert_eq!(value, Value::Id(oid.to_hex()));
        assert_eq!(to_bson(value), Bson::ObjectId(oid));
    }

    #[test]
    fn test_id_that_is_not_hex_stays_a_string() {
        assert_eq!(
            to_bson(Value::Id("user-1".into())),
            Bson::String("user-1".into())
        );
    }

    #[test]
    fn test_nested_document_order_preserved() {
        let row = Row::new()
            .with("z", 1)
            .with("a", Row::new().with("inner", true))
            .with("m", Value::Array(vec![Value::from("x")]));
        let doc = to_document(row.clone());
        let keys: Vec<_> = doc.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
        assert_eq!(from_document(doc), row);
    }

    #[test]
    fn test_plain_update_wrapped_in_set() {
        let update = update_document(Row::new().with("age", 2));
        assert_eq!(update, bson::doc! { "$set": { "age": 2_i64 } });
    }

    #[test]
    fn test_operator_update_passes_through() {
        let update = update_document(Row::new().with("$inc", Row::new().with("age", 1)));
        assert_eq!(update, bson::doc! { "$inc": { "age": 1_i64 } });
    }

    #[test]
    fn test_datetime_rendered_as_rfc3339() {
        let dt = bson::DateTime::from_millis(0);
        assert_eq!(
            from_bson(Bson::DateTime(dt)),
            Value::from("1970-01-01T00:00:00Z")
        );
    }
}
