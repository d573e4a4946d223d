//! Parameter binding for each engine.
//!
//! Values arrive already coerced to their bind kind, so each function maps
//! a `Value` variant straight to the native encoder. Arguments bound as
//! `ValueKind::Json` are encoded as one JSON document whatever their variant.

use crate::db::sql::statement::Argument;
use crate::models::{Value, ValueKind};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Encode, MySql, Postgres, Sqlite, Type};

/// NULL whose type the server infers from context.
///
/// A `None::<String>` would be sent as `text`, which PostgreSQL refuses to
/// assign to non-text columns.
pub(crate) struct PgNull;

impl Type<Postgres> for PgNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("unknown")
    }
}

impl Encode<'_, Postgres> for PgNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn to_json(value: Value) -> serde_json::Value {
    serde_json::Value::from(value)
}

/// Bind a value to a MySQL query.
pub(crate) fn bind_mysql_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    Argument { value, kind }: Argument,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        v if kind == ValueKind::Json => query.bind(Json(to_json(v))),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Text(v) | Value::Id(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        v @ (Value::Array(_) | Value::Document(_)) => query.bind(Json(to_json(v))),
    }
}

/// Bind a value to a PostgreSQL query.
pub(crate) fn bind_postgres_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    Argument { value, kind }: Argument,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(PgNull),
        v if kind == ValueKind::Json => query.bind(Json(to_json(v))),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Text(v) | Value::Id(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        v @ (Value::Array(_) | Value::Document(_)) => query.bind(Json(to_json(v))),
    }
}

/// Bind a value to a SQLite query.
pub(crate) fn bind_sqlite_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    Argument { value, kind }: Argument,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        // SQLite doesn't have native JSON type, store as string
        v if kind == ValueKind::Json => query.bind(to_json(v).to_string()),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Text(v) | Value::Id(v) => query.bind(v),
        Value::Bytes(v) => query.bind(v),
        v @ (Value::Array(_) | Value::Document(_)) => query.bind(to_json(v).to_string()),
    }
}
