//! Data-access layer.
//!
//! This module provides:
//! - The relational contract and its sqlx handler (MySQL, PostgreSQL, SQLite)
//! - The document contract and its MongoDB handler
//! - The key/value contract and its Redis handler
//! - The [`Database`] facade that picks one of them from a config
//! - Engine dispatch macros for reducing code duplication

mod database;
#[macro_use]
mod macros;
pub mod kv;
pub mod nosql;
pub mod sql;

pub use database::{Database, Handler};
pub use kv::{KeyValueHandler, Message, RedisHandler};
pub use nosql::{MongoHandler, NoSqlHandler};
pub use sql::{SqlHandler, SqlxHandler};
