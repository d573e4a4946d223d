//! The relational handler shared by every sqlx engine.

use super::SqlHandler;
use super::builder::{self, TableStatement};
use super::connection::SqlConnection;
use super::dialect::{Dialect, validate_savepoint_name};
use super::statement::{self, Statement};
use crate::config::{Driver, SqlSettings};
use crate::error::{DbError, DbResult, ErrorRecord};
use crate::models::{IsolationLevel, Placeholder, Row, Value, ValueKind};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Rows buffered from the last execution.
#[derive(Debug, Default)]
struct ResultBuffer {
    rows: Vec<Row>,
    cursor: usize,
    row_count: u64,
}

#[derive(Debug)]
struct Transaction {
    /// Trace id for log correlation.
    id: String,
    savepoints: Vec<String>,
}

/// Relational handler over one MySQL, PostgreSQL or SQLite connection.
#[derive(Debug)]
pub struct SqlxHandler {
    conn: SqlConnection,
    dialect: Dialect,
    statement: Option<Statement>,
    /// The current statement has not run with its current bindings.
    pending: bool,
    results: ResultBuffer,
    transaction: Option<Transaction>,
    last_insert_id: Option<i64>,
    error: Option<ErrorRecord>,
}

const LASTVAL_SAVEPOINT: &str = "polydb_lastval";

/// PostgreSQL refuses `LASTVAL()` with SQLSTATE 55000 until the session has
/// drawn from a sequence.
fn no_id_generated_yet(error: &DbError) -> bool {
    matches!(
        error,
        DbError::Statement { code: Some(code), .. } if code == "55000"
    )
}

fn no_statement(step: &str) -> DbError {
    DbError::statement(
        format!("{step}: no statement prepared, call query() first"),
        None,
    )
}

impl SqlxHandler {
    /// Connect to the engine named by `settings.driver`.
    pub async fn connect(settings: &SqlSettings) -> DbResult<Self> {
        let conn = SqlConnection::connect(settings).await?;
        let dialect = conn.dialect();
        info!(driver = %settings.driver, database = %settings.database, "Connected");
        Ok(Self {
            conn,
            dialect,
            statement: None,
            pending: false,
            results: ResultBuffer::default(),
            transaction: None,
            last_insert_id: None,
            error: None,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Record the failure of an operation on the handler.
    fn track<T>(&mut self, operation: &str, result: DbResult<T>) -> DbResult<T> {
        if let Err(e) = &result {
            debug!(operation, error = %e, "Operation failed");
            self.error = Some(e.record());
        }
        result
    }

    fn bind_value(
        &mut self,
        placeholder: Placeholder,
        value: Value,
        kind: Option<ValueKind>,
    ) -> DbResult<()> {
        let statement = self
            .statement
            .as_mut()
            .ok_or_else(|| no_statement("Binding parameter failed"))?;
        let kind = kind.unwrap_or_else(|| value.kind());
        let value = value.coerce(kind)?;
        debug!(placeholder = %placeholder, kind = %kind, "Binding parameter");
        statement.bind(placeholder, value, kind)?;
        self.pending = true;
        Ok(())
    }

    async fn run_current(&mut self) -> DbResult<()> {
        let statement = self
            .statement
            .as_ref()
            .ok_or_else(|| no_statement("Execution failed"))?;
        let args = statement.arguments()?;
        let outcome = self
            .conn
            .run(statement.native_sql(), args)
            .await
            .map_err(|e| e.context("Execution failed"));

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.results = ResultBuffer::default();
                return Err(e);
            }
        };

        if outcome.last_insert_id.is_some() {
            self.last_insert_id = outcome.last_insert_id;
        }
        let row_count = outcome.row_count();
        debug!(rows = outcome.rows.len(), row_count, "Statement executed");
        self.results = ResultBuffer {
            rows: outcome.rows,
            cursor: 0,
            row_count,
        };
        self.pending = false;
        Ok(())
    }

    /// Run the current statement unless its results are already buffered.
    async fn ensure_executed(&mut self) -> DbResult<()> {
        if self.statement.is_none() {
            return Err(no_statement("Execution failed"));
        }
        if self.pending {
            self.run_current().await?;
        }
        Ok(())
    }

    /// Replace the current statement with `sql`, bind `params` by position
    /// and run it.
    async fn run_with(&mut self, sql: &str, params: Vec<Value>) -> DbResult<()> {
        self.statement = None;
        self.pending = false;
        self.results = ResultBuffer::default();
        debug!(sql = %sql, params = params.len(), "Preparing statement");

        let mut statement = Statement::new(sql, statement::parse(sql, self.dialect)?);
        for (index, value) in params.into_iter().enumerate() {
            let kind = value.kind();
            statement.bind(Placeholder::Position(index + 1), value, kind)?;
        }
        self.statement = Some(statement);
        self.pending = true;
        self.run_current().await
    }

    /// Run a built table statement; `true` when it touched any row.
    async fn run_table(&mut self, built: DbResult<TableStatement>) -> DbResult<bool> {
        let TableStatement { sql, params } = built?;
        self.run_with(&sql, params).await?;
        Ok(self.results.row_count > 0)
    }

    /// First column of the first row of a statement without placeholders.
    async fn scalar(&mut self, sql: &str) -> DbResult<Option<Value>> {
        let parsed = statement::parse(sql, self.dialect)?;
        if !parsed.slots.is_empty() {
            return Err(DbError::statement(
                "Query preparation failed: a one-shot query cannot take placeholders",
                None,
            ));
        }
        let outcome = self
            .conn
            .run(&parsed.sql, Vec::new())
            .await
            .map_err(|e| e.context("Execution failed"))?;
        Ok(outcome
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next().map(|(_, value)| value)))
    }

    fn open_transaction(&mut self) -> DbResult<&mut Transaction> {
        self.transaction
            .as_mut()
            .ok_or_else(|| DbError::transaction_state("No active transaction"))
    }

    async fn control(&mut self, sql: &str, step: &str) -> DbResult<()> {
        self.conn
            .execute_raw(sql)
            .await
            .map(|_| ())
            .map_err(|e| e.context(step))
    }

    async fn start(&mut self, level: IsolationLevel) -> DbResult<()> {
        if let Some(tx) = &self.transaction {
            return Err(DbError::transaction_state(format!(
                "Transaction {} is already active, commit or roll it back first",
                tx.id
            )));
        }
        for sql in self.dialect.begin_transaction(level) {
            self.control(&sql, "Beginning transaction failed").await?;
        }
        let id = format!("tx_{}", Uuid::new_v4().simple());
        info!(
            transaction_id = %id,
            isolation = %level,
            driver = %self.dialect.driver(),
            "Transaction started"
        );
        self.transaction = Some(Transaction {
            id,
            savepoints: Vec::new(),
        });
        Ok(())
    }

    async fn finish(&mut self, commit: bool) -> DbResult<()> {
        let id = self.open_transaction()?.id.clone();
        let (sql, step) = if commit {
            (self.dialect.commit(), "Committing transaction failed")
        } else {
            (self.dialect.rollback(), "Rolling back transaction failed")
        };
        self.control(sql, step).await?;
        self.transaction = None;
        info!(
            transaction_id = %id,
            outcome = if commit { "committed" } else { "rolled back" },
            "Transaction finished"
        );
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.open_transaction()?;
        let sql = self.dialect.savepoint(name);
        self.control(&sql, "Creating savepoint failed").await?;
        let tx = self.open_transaction()?;
        tx.savepoints.push(name.to_string());
        debug!(transaction_id = %tx.id, savepoint = name, "Savepoint created");
        Ok(())
    }

    async fn rollback_to(&mut self, name: &str) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.open_transaction()?;
        let sql = self.dialect.rollback_to_savepoint(name);
        self.control(&sql, "Rolling back to savepoint failed").await?;
        // The savepoint itself survives; later ones are gone
        let tx = self.open_transaction()?;
        if let Some(pos) = tx.savepoints.iter().rposition(|s| s == name) {
            tx.savepoints.truncate(pos + 1);
        }
        debug!(transaction_id = %tx.id, savepoint = name, "Rolled back to savepoint");
        Ok(())
    }

    async fn release(&mut self, name: &str) -> DbResult<()> {
        validate_savepoint_name(name)?;
        self.open_transaction()?;
        let sql = self.dialect.release_savepoint(name);
        self.control(&sql, "Releasing savepoint failed").await?;
        let tx = self.open_transaction()?;
        if let Some(pos) = tx.savepoints.iter().rposition(|s| s == name) {
            tx.savepoints.truncate(pos);
        }
        debug!(transaction_id = %tx.id, savepoint = name, "Savepoint released");
        Ok(())
    }

    async fn generated_id(&mut self) -> DbResult<String> {
        let Some(sql) = self.dialect.last_insert_id_query() else {
            return Ok(self.last_insert_id.unwrap_or(0).to_string());
        };
        // A failed statement would abort the open transaction
        let guard = self.transaction.is_some().then_some(LASTVAL_SAVEPOINT);
        if let Some(name) = guard {
            let sql = self.dialect.savepoint(name);
            self.control(&sql, "Reading last insert id failed").await?;
        }
        let result = self.scalar(sql).await;
        if let Some(name) = guard {
            if result.is_err() {
                let sql = self.dialect.rollback_to_savepoint(name);
                self.control(&sql, "Reading last insert id failed").await?;
            }
            let sql = self.dialect.release_savepoint(name);
            self.control(&sql, "Reading last insert id failed").await?;
        }
        match result {
            Ok(value) => Ok(value.map(|v| v.to_text()).unwrap_or_else(|| "0".to_string())),
            Err(e) if no_id_generated_yet(&e) => Ok("0".to_string()),
            Err(e) => Err(e),
        }
    }

    async fn version(&mut self) -> DbResult<String> {
        self.scalar(self.dialect.version_query())
            .await?
            .map(|v| v.to_text())
            .ok_or_else(|| DbError::statement("Server did not report a version", None))
    }
}

#[async_trait]
impl SqlHandler for SqlxHandler {
    fn driver(&self) -> Driver {
        self.dialect.driver()
    }

    async fn query(&mut self, sql: &str) -> DbResult<&mut dyn SqlHandler> {
        self.error = None;
        self.results = ResultBuffer::default();
        debug!(sql = %sql, "Preparing statement");
        match statement::parse(sql, self.dialect) {
            Ok(parsed) => {
                self.statement = Some(Statement::new(sql, parsed));
                self.pending = true;
                Ok(self)
            }
            Err(e) => {
                self.statement = None;
                self.pending = false;
                self.track("query", Err(e))
            }
        }
    }

    fn bind_param(
        &mut self,
        placeholder: Placeholder,
        value: Value,
        kind: Option<ValueKind>,
    ) -> DbResult<&mut dyn SqlHandler> {
        self.error = None;
        let result = self.bind_value(placeholder, value, kind);
        self.track("bind", result)?;
        Ok(self)
    }

    async fn execute(&mut self) -> DbResult<bool> {
        self.error = None;
        let result = self.run_current().await;
        self.track("execute", result).map(|_| true)
    }

    async fn result_set(&mut self) -> DbResult<Vec<Row>> {
        self.error = None;
        let result = self.ensure_executed().await;
        self.track("result_set", result)?;
        Ok(self.results.rows.clone())
    }

    async fn single(&mut self) -> DbResult<Option<Row>> {
        self.error = None;
        let result = self.ensure_executed().await;
        self.track("single", result)?;
        Ok(self.results.rows.first().cloned())
    }

    async fn fetch_row(&mut self) -> DbResult<Option<Row>> {
        self.error = None;
        let result = self.ensure_executed().await;
        self.track("fetch_row", result)?;
        let row = self.results.rows.get(self.results.cursor).cloned();
        if row.is_some() {
            self.results.cursor += 1;
        }
        Ok(row)
    }

    fn row_count(&self) -> u64 {
        self.results.row_count
    }

    async fn fetch_column(&mut self, sql: &str) -> DbResult<Option<Value>> {
        self.error = None;
        let result = self.scalar(sql).await;
        self.track("fetch_column", result)
    }

    async fn query_with(&mut self, sql: &str, params: Vec<Value>) -> DbResult<&mut dyn SqlHandler> {
        self.error = None;
        let result = self.run_with(sql, params).await;
        self.track("query_with", result)?;
        Ok(self)
    }

    async fn insert_into(&mut self, table: &str, data: Row) -> DbResult<bool> {
        self.error = None;
        let result = self.run_table(builder::insert(table, data)).await;
        self.track("insert_into", result)
    }

    async fn update_where(&mut self, table: &str, data: Row, conditions: Row) -> DbResult<bool> {
        self.error = None;
        let result = self.run_table(builder::update(table, data, conditions)).await;
        self.track("update_where", result)
    }

    async fn delete_where(&mut self, table: &str, conditions: Row) -> DbResult<bool> {
        self.error = None;
        let result = self.run_table(builder::delete(table, conditions)).await;
        self.track("delete_where", result)
    }

    async fn select_from(
        &mut self,
        table: &str,
        columns: &[&str],
        conditions: Row,
    ) -> DbResult<Vec<Row>> {
        self.error = None;
        let result = match builder::select(table, columns, conditions) {
            Ok(TableStatement { sql, params }) => self.run_with(&sql, params).await,
            Err(e) => Err(e),
        };
        self.track("select_from", result)?;
        Ok(self.results.rows.clone())
    }

    async fn begin_transaction(&mut self, level: IsolationLevel) -> DbResult<()> {
        self.error = None;
        let result = self.start(level).await;
        self.track("begin_transaction", result)
    }

    async fn commit_transaction(&mut self) -> DbResult<()> {
        self.error = None;
        let result = self.finish(true).await;
        self.track("commit_transaction", result)
    }

    async fn rollback_transaction(&mut self) -> DbResult<()> {
        self.error = None;
        let result = self.finish(false).await;
        self.track("rollback_transaction", result)
    }

    async fn begin_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.error = None;
        let result = self.savepoint(name).await;
        self.track("begin_savepoint", result)
    }

    async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.error = None;
        let result = self.rollback_to(name).await;
        self.track("rollback_savepoint", result)
    }

    async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.error = None;
        let result = self.release(name).await;
        self.track("release_savepoint", result)
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    fn savepoints(&self) -> &[String] {
        self.transaction
            .as_ref()
            .map(|tx| tx.savepoints.as_slice())
            .unwrap_or(&[])
    }

    fn error_info(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    async fn last_insert_id(&mut self) -> DbResult<String> {
        self.error = None;
        let result = self.generated_id().await;
        self.track("last_insert_id", result)
    }

    async fn get_version(&mut self) -> DbResult<String> {
        self.error = None;
        let result = self.version().await;
        self.track("get_version", result)
    }

    fn close(mut self: Box<Self>) -> BoxFuture<'static, DbResult<()>> {
        Box::pin(async move {
            if let Some(tx) = self.transaction.take() {
                let rollback = self.dialect.rollback();
                if let Err(e) = self.conn.execute_raw(rollback).await {
                    warn!(transaction_id = %tx.id, error = %e, "Rollback on close failed");
                }
            }
            let driver = self.dialect.driver();
            self.conn.close().await?;
            info!(driver = %driver, "Connection closed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Settings};
    use crate::error::SUCCESS_CODE;

    async fn memory_handler() -> SqlxHandler {
        let settings = match Config::new("sqlite").with_database(":memory:").resolve() {
            Ok(Settings::Sql(settings)) => settings,
            other => panic!("unexpected settings: {other:?}"),
        };
        SqlxHandler::connect(&settings).await.unwrap()
    }

    async fn handler_with_table() -> SqlxHandler {
        let mut handler = memory_handler().await;
        handler
            .query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, qty INTEGER)")
            .await
            .unwrap()
            .execute()
            .await
            .unwrap();
        handler
    }

    #[tokio::test]
    async fn test_execute_without_query_is_statement_error() {
        let mut handler = memory_handler().await;
        let err = handler.execute().await.unwrap_err();
        assert!(matches!(err, DbError::Statement { .. }));
        assert!(handler.error_info().is_some());
    }

    #[tokio::test]
    async fn test_error_record_cleared_by_next_success() {
        let mut handler = memory_handler().await;
        let err = handler
            .query("SELEC nonsense")
            .await
            .unwrap()
            .execute()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Execution failed"));
        assert_ne!(handler.last_error_code(), SUCCESS_CODE);

        handler.fetch_column("SELECT 1").await.unwrap();
        assert!(handler.error_info().is_none());
        assert_eq!(handler.last_error_code(), SUCCESS_CODE);
        assert_eq!(handler.last_error_message(), "No error message");
    }

    #[tokio::test]
    async fn test_result_set_runs_pending_statement_once() {
        let mut handler = handler_with_table().await;
        handler
            .query("INSERT INTO items (name, qty) VALUES (?, ?)")
            .await
            .unwrap()
            .bind(1, "bolt")
            .unwrap()
            .bind(2, 3)
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(handler.row_count(), 1);

        handler.query("SELECT name FROM items").await.unwrap().execute().await.unwrap();
        // buffered by execute()
        let rows = handler.result_set().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::from("bolt"));
    }

    #[tokio::test]
    async fn test_fetch_row_walks_buffer() {
        let mut handler = handler_with_table().await;
        handler
            .query("INSERT INTO items (name, qty) VALUES ('a', 1), ('b', 2)")
            .await
            .unwrap()
            .execute()
            .await
            .unwrap();

        handler.query("SELECT name FROM items ORDER BY id").await.unwrap();
        let first = handler.fetch_row().await.unwrap().unwrap();
        let second = handler.fetch_row().await.unwrap().unwrap();
        assert_eq!(first["name"], Value::from("a"));
        assert_eq!(second["name"], Value::from("b"));
        assert!(handler.fetch_row().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_column_keeps_current_statement() {
        let mut handler = handler_with_table().await;
        handler.query("SELECT COUNT(*) AS n FROM items").await.unwrap();
        let version = handler.fetch_column("SELECT sqlite_version()").await.unwrap();
        assert!(matches!(version, Some(Value::Text(_))));

        let row = handler.single().await.unwrap().unwrap();
        assert_eq!(row["n"], Value::Int(0));
    }

    #[tokio::test]
    async fn test_fetch_column_rejects_placeholders() {
        let mut handler = memory_handler().await;
        assert!(handler.fetch_column("SELECT ?").await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_order_violations() {
        let mut handler = memory_handler().await;
        let err = handler.commit_transaction().await.unwrap_err();
        assert!(matches!(err, DbError::TransactionState { .. }));
        assert!(handler.rollback_transaction().await.is_err());
        assert!(handler.begin_savepoint("sp").await.is_err());

        handler
            .begin_transaction(IsolationLevel::Serializable)
            .await
            .unwrap();
        let err = handler
            .begin_transaction(IsolationLevel::Serializable)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::TransactionState { .. }));
        handler.rollback_transaction().await.unwrap();
        assert!(!handler.in_transaction());
    }

    #[tokio::test]
    async fn test_savepoint_tracking() {
        let mut handler = memory_handler().await;
        handler
            .begin_transaction(IsolationLevel::default())
            .await
            .unwrap();
        for name in ["a", "b", "c"] {
            handler.begin_savepoint(name).await.unwrap();
        }
        handler.rollback_savepoint("b").await.unwrap();
        assert_eq!(handler.savepoints(), ["a", "b"]);
        handler.release_savepoint("a").await.unwrap();
        assert!(handler.savepoints().is_empty());

        let err = handler.begin_savepoint("bad name").await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        handler.commit_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn test_last_insert_id_and_version() {
        let mut handler = handler_with_table().await;
        assert_eq!(handler.last_insert_id().await.unwrap(), "0");
        handler
            .query("INSERT INTO items (name) VALUES (:name)")
            .await
            .unwrap()
            .bind(":name", "x")
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(handler.last_insert_id().await.unwrap(), "1");
        assert!(!handler.get_version().await.unwrap().is_empty());
    }

    #[test]
    fn test_lastval_before_any_insert_reads_as_no_id() {
        let undefined = DbError::statement(
            "lastval is not yet defined in this session",
            Some("55000".to_string()),
        );
        assert!(no_id_generated_yet(&undefined));
        assert!(!no_id_generated_yet(&DbError::statement("syntax", Some("42601".into()))));
        assert!(!no_id_generated_yet(&DbError::statement("no code", None)));
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let mut handler = memory_handler().await;
        handler
            .begin_transaction(IsolationLevel::default())
            .await
            .unwrap();
        let boxed: Box<dyn SqlHandler> = Box::new(handler);
        boxed.close().await.unwrap();
    }
}
