//! Relational handler contract and its sqlx implementation.
//!
//! The contract is statement-centric: `query` prepares the handler's single
//! current statement, `bind_param` fills its placeholders, and `execute` or
//! one of the fetch methods runs it. Every failure is returned as a
//! [`DbError`] and also recorded for [`SqlHandler::error_info`].
//!
//! # Example
//!
//! ```no_run
//! # async fn demo(handler: &mut dyn polydb::SqlHandler) -> polydb::DbResult<()> {
//! let row = handler
//!     .query("SELECT name FROM users WHERE id = :id")
//!     .await?
//!     .bind("id", 42)?
//!     .single()
//!     .await?;
//! # let _ = row;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub(crate) mod connection;
pub mod dialect;
mod handler;
mod params;
pub mod statement;
pub mod types;

pub use dialect::{Dialect, validate_identifier, validate_savepoint_name};
pub use handler::SqlxHandler;

use crate::config::Driver;
use crate::error::{DbResult, ErrorRecord, SUCCESS_CODE};
use crate::models::{IsolationLevel, Placeholder, Row, Value, ValueKind};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt;

/// Capability set of a relational backend.
#[async_trait]
pub trait SqlHandler: Send {
    fn driver(&self) -> Driver;

    /// Prepare `sql` as the current statement, replacing any previous one.
    async fn query(&mut self, sql: &str) -> DbResult<&mut dyn SqlHandler>;

    /// Bind one placeholder of the current statement. Without `kind` the
    /// value binds as its own kind.
    fn bind_param(
        &mut self,
        placeholder: Placeholder,
        value: Value,
        kind: Option<ValueKind>,
    ) -> DbResult<&mut dyn SqlHandler>;

    /// Run the current statement and buffer its rows.
    async fn execute(&mut self) -> DbResult<bool>;

    /// Every row of the current statement, running it first if needed.
    async fn result_set(&mut self) -> DbResult<Vec<Row>>;

    /// The first row of the current statement.
    async fn single(&mut self) -> DbResult<Option<Row>>;

    /// The next buffered row, advancing the cursor.
    async fn fetch_row(&mut self) -> DbResult<Option<Row>>;

    /// Rows returned by the last query, or rows changed by the last write.
    fn row_count(&self) -> u64;

    /// First column of the first row of a one-shot query. The current
    /// statement and its results are left untouched.
    async fn fetch_column(&mut self, sql: &str) -> DbResult<Option<Value>>;

    /// Prepare `sql`, bind `params` to its positional placeholders in
    /// order, and run it. The results stay readable through the returned
    /// handler.
    async fn query_with(&mut self, sql: &str, params: Vec<Value>) -> DbResult<&mut dyn SqlHandler>;

    // Table helpers. Names are validated identifiers; values always bind.
    // Each replaces the current statement.

    /// Insert one row; `true` when a row was written.
    async fn insert_into(&mut self, table: &str, data: Row) -> DbResult<bool>;

    /// Set `data` on rows matching every condition; `true` when any row
    /// changed. Empty conditions are rejected.
    async fn update_where(&mut self, table: &str, data: Row, conditions: Row) -> DbResult<bool>;

    /// Delete rows matching every condition; `true` when any row went.
    /// Empty conditions are rejected.
    async fn delete_where(&mut self, table: &str, conditions: Row) -> DbResult<bool>;

    /// Rows matching every condition. No columns selects `*`.
    async fn select_from(
        &mut self,
        table: &str,
        columns: &[&str],
        conditions: Row,
    ) -> DbResult<Vec<Row>>;

    async fn begin_transaction(&mut self, level: IsolationLevel) -> DbResult<()>;
    async fn commit_transaction(&mut self) -> DbResult<()>;
    async fn rollback_transaction(&mut self) -> DbResult<()>;

    async fn begin_savepoint(&mut self, name: &str) -> DbResult<()>;
    async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()>;
    async fn release_savepoint(&mut self, name: &str) -> DbResult<()>;

    fn in_transaction(&self) -> bool;

    /// Live savepoints of the open transaction, oldest first.
    fn savepoints(&self) -> &[String];

    /// The failure of the most recent operation, if it failed.
    fn error_info(&self) -> Option<&ErrorRecord>;

    fn last_error_code(&self) -> String {
        self.error_info()
            .map(|e| e.code.clone())
            .unwrap_or_else(|| SUCCESS_CODE.to_string())
    }

    fn last_error_message(&self) -> String {
        self.error_info()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "No error message".to_string())
    }

    /// Identifier generated by the most recent insert, as text.
    async fn last_insert_id(&mut self) -> DbResult<String>;

    /// Server version string.
    async fn get_version(&mut self) -> DbResult<String>;

    /// Roll back any open transaction and close the connection.
    fn close(self: Box<Self>) -> BoxFuture<'static, DbResult<()>>;
}

impl fmt::Debug for dyn SqlHandler + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlHandler")
            .field("driver", &self.driver())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl<'a> dyn SqlHandler + 'a {
    /// Bind a value, inferring its kind.
    ///
    /// ```no_run
    /// # async fn demo(handler: &mut dyn polydb::SqlHandler) -> polydb::DbResult<()> {
    /// handler
    ///     .query("INSERT INTO t (a, b) VALUES (?, ?)")
    ///     .await?
    ///     .bind(1, "text")?
    ///     .bind(2, true)?
    ///     .execute()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn bind<P, V>(&mut self, placeholder: P, value: V) -> DbResult<&mut dyn SqlHandler>
    where
        P: Into<Placeholder>,
        V: Into<Value>,
    {
        self.bind_param(placeholder.into(), value.into(), None)
    }

    /// Bind a value as an explicit kind, e.g. an integer as text.
    pub fn bind_typed<P, V>(
        &mut self,
        placeholder: P,
        value: V,
        kind: ValueKind,
    ) -> DbResult<&mut dyn SqlHandler>
    where
        P: Into<Placeholder>,
        V: Into<Value>,
    {
        self.bind_param(placeholder.into(), value.into(), Some(kind))
    }
}
