//! Column type mappings.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Engine-specific decoders extract the value into a [`Value`]

use crate::db::sql::dialect::Dialect;
use crate::models::{Row as ResultRow, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Date,
    Time,
    DateTime,
    DateTimeTz,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, dialect: Dialect) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if dialect == Dialect::Sqlite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    match lower.as_str() {
        "timestamptz" => return TypeCategory::DateTimeTz,
        "timestamp" | "datetime" => return TypeCategory::DateTime,
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        _ => {}
    }

    if lower.contains("char") || lower.contains("text") || lower == "name" || lower == "string" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC (base-10000 digit groups) as exact text.
pub fn pg_numeric_to_string(buf: &[u8]) -> Result<String, sqlx::error::BoxDynError> {
    const NEGATIVE: u16 = 0x4000;
    const NAN: u16 = 0xC000;

    let read_u16 = |at: usize| -> Result<u16, sqlx::error::BoxDynError> {
        buf.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated NUMERIC value".into())
    };

    let ndigits = read_u16(0)? as usize;
    let weight = read_u16(2)? as i16 as i32;
    let sign = read_u16(4)?;
    let dscale = read_u16(6)? as usize;

    if sign == NAN {
        return Ok("NaN".to_string());
    }

    let digits = (0..ndigits)
        .map(|i| read_u16(8 + i * 2))
        .collect::<Result<Vec<u16>, _>>()?;

    let mut int_part = String::new();
    for group in 0..=weight.max(-1) {
        let digit = digits.get(group as usize).copied().unwrap_or(0);
        if int_part.is_empty() {
            if digit != 0 {
                int_part.push_str(&digit.to_string());
            }
        } else {
            int_part.push_str(&format!("{digit:04}"));
        }
    }
    if int_part.is_empty() {
        int_part.push('0');
    }

    let mut frac_part = String::new();
    if dscale > 0 {
        let mut group = weight + 1;
        while frac_part.len() < dscale {
            let digit = if group < 0 {
                0
            } else {
                digits.get(group as usize).copied().unwrap_or(0)
            };
            frac_part.push_str(&format!("{digit:04}"));
            group += 1;
        }
        frac_part.truncate(dscale);
    }

    let mut out = String::new();
    if sign == NEGATIVE {
        out.push('-');
    }
    out.push_str(&int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(&frac_part);
    }
    Ok(out)
}

// =============================================================================
// Row Conversion Trait
// =============================================================================

/// Trait for converting engine rows into result rows.
pub trait RowToValues {
    fn to_row(&self) -> ResultRow;
}

impl RowToValues for MySqlRow {
    fn to_row(&self) -> ResultRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), Dialect::MySql);
                (col.name().to_string(), mysql::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToValues for PgRow {
    fn to_row(&self) -> ResultRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), Dialect::Postgres);
                (col.name().to_string(), postgres::decode_column(self, idx, category))
            })
            .collect()
    }
}

impl RowToValues for SqliteRow {
    fn to_row(&self) -> ResultRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), Dialect::Sqlite);
                (col.name().to_string(), sqlite::decode_column(self, idx, category))
            })
            .collect()
    }
}

// =============================================================================
// Engine-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> Value {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return Value::Null;
        }
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::DateTime | TypeCategory::DateTimeTz => decode_datetime(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Time => decode_time(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get::<RawDecimal, _>(idx) {
            Ok(v) => Value::Text(v.0),
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            // BIGINT UNSIGNED beyond i64 keeps its exact digits
            return i64::try_from(v)
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(v.to_string()));
        }
        decode_text(row, idx)
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<bool, _>(idx)
            .map(Value::Bool)
            .unwrap_or_else(|_| decode_integer(row, idx))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Value::Float(v as f64);
        }
        Value::Null
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<serde_json::Value, _>(idx)
            .map(Value::from)
            .unwrap_or_else(|_| decode_text(row, idx))
    }

    fn decode_datetime(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
            return Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string());
        }
        if let Ok(v) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
            return Value::Text(v.to_rfc3339());
        }
        decode_text(row, idx)
    }

    fn decode_date(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<chrono::NaiveDate, _>(idx)
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or_else(|_| decode_text(row, idx))
    }

    fn decode_time(row: &MySqlRow, idx: usize) -> Value {
        row.try_get::<chrono::NaiveTime, _>(idx)
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or_else(|_| decode_text(row, idx))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Value::Text(v);
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
            return match String::from_utf8(v) {
                Ok(s) => Value::Text(s),
                Err(e) => Value::Bytes(e.into_bytes()),
            };
        }
        Value::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> Value {
        if row.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true) {
            return Value::Null;
        }
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::DateTime => decode_timestamp(row, idx),
            TypeCategory::DateTimeTz => decode_timestamptz(row, idx),
            TypeCategory::Date => decode_date(row, idx),
            TypeCategory::Time => decode_time(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Value {
        match row.try_get::<RawDecimal, _>(idx) {
            Ok(v) => Value::Text(v.0),
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                Value::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Value::Int(v);
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Value::Int(v.into());
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Value::Int(v.into());
        }
        decode_text(row, idx)
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Value {
        row.try_get::<bool, _>(idx)
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    }

    fn decode_float(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Value::Float(v);
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Value::Float(v as f64);
        }
        Value::Null
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Value {
        row.try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &PgRow, idx: usize) -> Value {
        row.try_get::<serde_json::Value, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null)
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> Value {
        row.try_get::<uuid::Uuid, _>(idx)
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null)
    }

    fn decode_timestamp(row: &PgRow, idx: usize) -> Value {
        row.try_get::<chrono::NaiveDateTime, _>(idx)
            .map(|v| Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null)
    }

    fn decode_timestamptz(row: &PgRow, idx: usize) -> Value {
        row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
            .map(|v| Value::Text(v.to_rfc3339()))
            .unwrap_or(Value::Null)
    }

    fn decode_date(row: &PgRow, idx: usize) -> Value {
        row.try_get::<chrono::NaiveDate, _>(idx)
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null)
    }

    fn decode_time(row: &PgRow, idx: usize) -> Value {
        row.try_get::<chrono::NaiveTime, _>(idx)
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null)
    }

    fn decode_text(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Value::Text(v);
        }
        // Types without a Rust mapping: take the text form when the server sent one
        if let Ok(raw) = row.try_get_raw(idx) {
            if raw.format() == PgValueFormat::Text {
                if let Ok(s) = raw.as_str() {
                    return Value::Text(s.to_string());
                }
            }
        }
        Value::Null
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> Value {
        let Ok(raw) = row.try_get_raw(idx) else {
            return Value::Null;
        };
        if raw.is_null() {
            return Value::Null;
        }
        // Storage class of this value; SQLite columns are dynamically typed
        let storage = categorize_type(raw.type_info().name(), Dialect::Sqlite);
        match (category, storage) {
            (TypeCategory::Boolean, TypeCategory::Integer) => decode_boolean(row, idx),
            (TypeCategory::Json, TypeCategory::Text) => decode_json(row, idx),
            (_, TypeCategory::Integer) => decode_integer(row, idx),
            (_, TypeCategory::Float) => decode_float(row, idx),
            (_, TypeCategory::Binary) => decode_binary(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<i64, _>(idx)
            .map(Value::Int)
            .unwrap_or(Value::Null)
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<bool, _>(idx)
            .map(Value::Bool)
            .unwrap_or_else(|_| decode_integer(row, idx))
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<f64, _>(idx)
            .map(Value::Float)
            .unwrap_or(Value::Null)
    }

    fn decode_binary(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<Vec<u8>, _>(idx)
            .map(Value::Bytes)
            .unwrap_or(Value::Null)
    }

    fn decode_json(row: &SqliteRow, idx: usize) -> Value {
        match row.try_get::<String, _>(idx) {
            Ok(s) => serde_json::from_str::<serde_json::Value>(&s)
                .map(Value::from)
                .unwrap_or(Value::Text(s)),
            Err(_) => Value::Null,
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Value {
        row.try_get::<String, _>(idx)
            .map(Value::Text)
            .unwrap_or(Value::Null)
    }
}
