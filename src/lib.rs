//! polydb
//!
//! One data-access API over relational engines (MySQL, PostgreSQL, SQLite),
//! a document store (MongoDB) and a key/value store (Redis). A
//! [`Database`] is built from a [`Config`] and drives exactly one handler.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{BackendFamily, Config, Driver};
pub use db::{
    Database, Handler, KeyValueHandler, Message, MongoHandler, NoSqlHandler, RedisHandler,
    SqlHandler, SqlxHandler,
};
pub use error::{DbError, DbResult, ErrorRecord};
pub use models::{Document, FindOptions, IsolationLevel, Placeholder, Row, Value, ValueKind};
