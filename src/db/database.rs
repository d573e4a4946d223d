//! The backend-neutral facade.
//!
//! [`Database`] selects one handler at construction time from a [`Config`]
//! and forwards every contract operation to it. An operation the selected
//! handler does not implement fails with
//! [`DbError::UnsupportedOperation`] naming the operation.

use crate::config::{BackendFamily, Config, Driver, Settings};
use crate::db::kv::{KeyValueHandler, Message, RedisHandler};
use crate::db::nosql::{MongoHandler, NoSqlHandler};
use crate::db::sql::{SqlHandler, SqlxHandler};
use crate::error::{DbError, DbResult, ErrorRecord, SUCCESS_CODE};
use crate::models::{Document, FindOptions, IsolationLevel, Placeholder, Row, Value, ValueKind};
use indexmap::IndexMap;
use std::fmt;
use tracing::{debug, info};

const SQL_OPERATIONS: &[&str] = &[
    "query",
    "bind_param",
    "execute",
    "result_set",
    "single",
    "fetch_row",
    "row_count",
    "fetch_column",
    "query_with",
    "insert_into",
    "update_where",
    "delete_where",
    "select_from",
    "begin_transaction",
    "commit_transaction",
    "rollback_transaction",
    "begin_savepoint",
    "rollback_savepoint",
    "release_savepoint",
    "in_transaction",
    "savepoints",
    "error_info",
    "last_error_code",
    "last_error_message",
    "last_insert_id",
    "get_version",
    "close",
];

// last_insert_id is deliberately absent: ids come back from insert()
const DOCUMENT_OPERATIONS: &[&str] = &[
    "insert",
    "find_one",
    "find_many",
    "update_one",
    "update_many",
    "delete_one",
    "delete_many",
    "count",
    "raw_query",
    "command",
    "begin_transaction",
    "commit_transaction",
    "rollback_transaction",
    "in_transaction",
    "error_info",
    "last_error_code",
    "last_error_message",
    "close",
];

const KEY_VALUE_OPERATIONS: &[&str] = &[
    "insert",
    "select",
    "update",
    "delete",
    "increment",
    "decrement",
    "select_all",
    "flush",
    "hash_insert",
    "hash_select",
    "hash_delete",
    "hash_select_all",
    "push",
    "pop",
    "list_range",
    "set_add",
    "set_remove",
    "set_members",
    "set_intersect",
    "zadd",
    "zrem",
    "zrange",
    "zrange_with_scores",
    "zrevrange",
    "zrevrange_with_scores",
    "zscore",
    "zrank",
    "publish",
    "subscribe",
    "set_expiration",
    "get_ttl",
    "error_info",
    "last_error_code",
    "last_error_message",
    "close",
];

/// The one handler a [`Database`] drives.
pub enum Handler {
    Sql(Box<dyn SqlHandler>),
    Document(Box<dyn NoSqlHandler>),
    KeyValue(Box<dyn KeyValueHandler>),
}

impl Handler {
    pub fn driver(&self) -> Driver {
        match self {
            Handler::Sql(h) => h.driver(),
            Handler::Document(h) => h.driver(),
            Handler::KeyValue(h) => h.driver(),
        }
    }

    pub fn family(&self) -> BackendFamily {
        match self {
            Handler::Sql(_) => BackendFamily::Sql,
            Handler::Document(_) => BackendFamily::Document,
            Handler::KeyValue(_) => BackendFamily::KeyValue,
        }
    }

    fn error_info(&self) -> Option<&ErrorRecord> {
        match self {
            Handler::Sql(h) => h.error_info(),
            Handler::Document(h) => h.error_info(),
            Handler::KeyValue(h) => h.error_info(),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Handler::Sql(_) => "Sql",
            Handler::Document(_) => "Document",
            Handler::KeyValue(_) => "KeyValue",
        };
        f.debug_tuple(name).field(&self.driver()).finish()
    }
}

fn unsupported(driver: Driver, operation: &str) -> DbError {
    DbError::unsupported_operation(operation, driver.display_name())
}

/// Single entry point over every supported backend.
///
/// ```no_run
/// use polydb::{Config, Database};
///
/// # async fn demo() -> polydb::DbResult<()> {
/// let mut db = Database::connect(&Config::from_url("sqlite::memory:")?).await?;
/// db.query("CREATE TABLE t (id INTEGER PRIMARY KEY, flag BOOLEAN)")
///     .await?
///     .execute()
///     .await?;
/// db.query("INSERT INTO t (flag) VALUES (?)")
///     .await?
///     .bind(1, true)?
///     .execute()
///     .await?;
/// db.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Database {
    driver: Driver,
    handler: Handler,
}

impl Database {
    /// Resolve `config`, then connect the matching handler.
    ///
    /// An unknown driver or invalid settings fail before any connection is
    /// attempted; an unreachable backend fails here rather than on first use.
    pub async fn connect(config: &Config) -> DbResult<Self> {
        let driver = config.backend()?;
        let settings = config.resolve()?;

        info!(
            driver = %driver,
            uri = %config.masked_uri(),
            "Connecting to database"
        );

        let handler = match &settings {
            Settings::Sql(s) => Handler::Sql(Box::new(SqlxHandler::connect(s).await?)),
            Settings::Document(s) => Handler::Document(Box::new(MongoHandler::connect(s).await?)),
            Settings::KeyValue(s) => Handler::KeyValue(Box::new(RedisHandler::connect(s).await?)),
        };

        info!(driver = %driver, family = ?handler.family(), "Database ready");
        Ok(Self { driver, handler })
    }

    /// Wrap an already connected handler.
    pub fn from_handler(handler: Handler) -> Self {
        Self {
            driver: handler.driver(),
            handler,
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn family(&self) -> BackendFamily {
        self.handler.family()
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn into_handler(self) -> Handler {
        self.handler
    }

    /// Operations the selected handler implements.
    pub fn operations(&self) -> &'static [&'static str] {
        match self.handler {
            Handler::Sql(_) => SQL_OPERATIONS,
            Handler::Document(_) => DOCUMENT_OPERATIONS,
            Handler::KeyValue(_) => KEY_VALUE_OPERATIONS,
        }
    }

    /// Whether `operation` is part of the selected handler's contract.
    pub fn supports(&self, operation: &str) -> bool {
        self.operations().contains(&operation)
    }

    // Family access

    pub fn sql(&mut self) -> DbResult<&mut dyn SqlHandler> {
        self.sql_for("sql")
    }

    pub fn document(&mut self) -> DbResult<&mut dyn NoSqlHandler> {
        self.document_for("document")
    }

    /// The key/value handler. The scalar `insert`/`select`/`update`/`delete`
    /// are only reachable here since they overlap the document contract;
    /// every other key/value operation is also forwarded by the facade.
    pub fn key_value(&mut self) -> DbResult<&mut dyn KeyValueHandler> {
        self.key_value_for("key_value")
    }

    fn key_value_for(&mut self, operation: &str) -> DbResult<&mut dyn KeyValueHandler> {
        let driver = self.driver;
        match &mut self.handler {
            Handler::KeyValue(h) => Ok(h.as_mut()),
            _ => {
                debug!(driver = %driver, operation, "Rejected key/value operation");
                Err(unsupported(driver, operation))
            }
        }
    }

    fn sql_for(&mut self, operation: &str) -> DbResult<&mut dyn SqlHandler> {
        let driver = self.driver;
        match &mut self.handler {
            Handler::Sql(h) => Ok(h.as_mut()),
            _ => {
                debug!(driver = %driver, operation, "Rejected relational operation");
                Err(unsupported(driver, operation))
            }
        }
    }

    fn document_for(&mut self, operation: &str) -> DbResult<&mut dyn NoSqlHandler> {
        let driver = self.driver;
        match &mut self.handler {
            Handler::Document(h) => Ok(h.as_mut()),
            _ => {
                debug!(driver = %driver, operation, "Rejected document operation");
                Err(unsupported(driver, operation))
            }
        }
    }

    // Relational contract

    /// Prepare `sql` on the relational handler. The returned handler chains
    /// into `bind` and `execute`.
    pub async fn query(&mut self, sql: &str) -> DbResult<&mut dyn SqlHandler> {
        self.sql_for("query")?.query(sql).await
    }

    pub fn bind_param(
        &mut self,
        placeholder: Placeholder,
        value: Value,
        kind: Option<ValueKind>,
    ) -> DbResult<&mut dyn SqlHandler> {
        self.sql_for("bind_param")?.bind_param(placeholder, value, kind)
    }

    pub async fn execute(&mut self) -> DbResult<bool> {
        self.sql_for("execute")?.execute().await
    }

    pub async fn result_set(&mut self) -> DbResult<Vec<Row>> {
        self.sql_for("result_set")?.result_set().await
    }

    pub async fn single(&mut self) -> DbResult<Option<Row>> {
        self.sql_for("single")?.single().await
    }

    pub async fn fetch_row(&mut self) -> DbResult<Option<Row>> {
        self.sql_for("fetch_row")?.fetch_row().await
    }

    pub fn row_count(&mut self) -> DbResult<u64> {
        Ok(self.sql_for("row_count")?.row_count())
    }

    pub async fn fetch_column(&mut self, sql: &str) -> DbResult<Option<Value>> {
        self.sql_for("fetch_column")?.fetch_column(sql).await
    }

    /// Prepare, bind by position and run in one call.
    pub async fn query_with(&mut self, sql: &str, params: Vec<Value>) -> DbResult<&mut dyn SqlHandler> {
        self.sql_for("query_with")?.query_with(sql, params).await
    }

    pub async fn insert_into(&mut self, table: &str, data: Row) -> DbResult<bool> {
        self.sql_for("insert_into")?.insert_into(table, data).await
    }

    pub async fn update_where(&mut self, table: &str, data: Row, conditions: Row) -> DbResult<bool> {
        self.sql_for("update_where")?
            .update_where(table, data, conditions)
            .await
    }

    pub async fn delete_where(&mut self, table: &str, conditions: Row) -> DbResult<bool> {
        self.sql_for("delete_where")?
            .delete_where(table, conditions)
            .await
    }

    pub async fn select_from(
        &mut self,
        table: &str,
        columns: &[&str],
        conditions: Row,
    ) -> DbResult<Vec<Row>> {
        self.sql_for("select_from")?
            .select_from(table, columns, conditions)
            .await
    }

    pub async fn begin_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.sql_for("begin_savepoint")?.begin_savepoint(name).await
    }

    pub async fn rollback_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.sql_for("rollback_savepoint")?
            .rollback_savepoint(name)
            .await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        self.sql_for("release_savepoint")?
            .release_savepoint(name)
            .await
    }

    pub fn savepoints(&mut self) -> DbResult<Vec<String>> {
        Ok(self.sql_for("savepoints")?.savepoints().to_vec())
    }

    pub async fn get_version(&mut self) -> DbResult<String> {
        self.sql_for("get_version")?.get_version().await
    }

    // Document contract

    pub async fn insert(&mut self, collection: &str, document: Document) -> DbResult<Option<Value>> {
        Ok(self
            .document_for("insert")?
            .insert(collection, document)
            .await)
    }

    pub async fn find_one(&mut self, collection: &str, filter: Document) -> DbResult<Option<Row>> {
        Ok(self
            .document_for("find_one")?
            .find_one(collection, filter)
            .await)
    }

    pub async fn find_many(
        &mut self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> DbResult<Vec<Row>> {
        Ok(self
            .document_for("find_many")?
            .find_many(collection, filter, options)
            .await)
    }

    pub async fn update_one(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DbResult<bool> {
        Ok(self
            .document_for("update_one")?
            .update_one(collection, filter, update)
            .await)
    }

    pub async fn update_many(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> DbResult<u64> {
        Ok(self
            .document_for("update_many")?
            .update_many(collection, filter, update)
            .await)
    }

    pub async fn delete_one(&mut self, collection: &str, filter: Document) -> DbResult<bool> {
        Ok(self
            .document_for("delete_one")?
            .delete_one(collection, filter)
            .await)
    }

    pub async fn delete_many(&mut self, collection: &str, filter: Document) -> DbResult<u64> {
        Ok(self
            .document_for("delete_many")?
            .delete_many(collection, filter)
            .await)
    }

    pub async fn count(&mut self, collection: &str, filter: Document) -> DbResult<u64> {
        Ok(self
            .document_for("count")?
            .count(collection, filter)
            .await)
    }

    pub async fn raw_query(&mut self, collection: &str, pipeline: Vec<Document>) -> DbResult<Vec<Row>> {
        Ok(self
            .document_for("raw_query")?
            .raw_query(collection, pipeline)
            .await)
    }

    pub async fn command(&mut self, command: Document) -> DbResult<Option<Row>> {
        Ok(self.document_for("command")?.command(command).await)
    }

    // Key/value contract

    pub async fn increment(&mut self, key: &str, amount: i64) -> DbResult<Option<i64>> {
        Ok(self.key_value_for("increment")?.increment(key, amount).await)
    }

    pub async fn decrement(&mut self, key: &str, amount: i64) -> DbResult<Option<i64>> {
        Ok(self.key_value_for("decrement")?.decrement(key, amount).await)
    }

    pub async fn select_all(&mut self) -> DbResult<Vec<String>> {
        Ok(self.key_value_for("select_all")?.select_all().await)
    }

    pub async fn flush(&mut self) -> DbResult<bool> {
        Ok(self.key_value_for("flush")?.flush().await)
    }

    pub async fn hash_insert(&mut self, hash: &str, field: &str, value: &str) -> DbResult<u64> {
        Ok(self
            .key_value_for("hash_insert")?
            .hash_insert(hash, field, value)
            .await)
    }

    pub async fn hash_select(&mut self, hash: &str, field: &str) -> DbResult<Option<String>> {
        Ok(self.key_value_for("hash_select")?.hash_select(hash, field).await)
    }

    pub async fn hash_delete(&mut self, hash: &str, field: &str) -> DbResult<u64> {
        Ok(self.key_value_for("hash_delete")?.hash_delete(hash, field).await)
    }

    pub async fn hash_select_all(&mut self, hash: &str) -> DbResult<IndexMap<String, String>> {
        Ok(self.key_value_for("hash_select_all")?.hash_select_all(hash).await)
    }

    pub async fn push(&mut self, list: &str, value: &str) -> DbResult<u64> {
        Ok(self.key_value_for("push")?.push(list, value).await)
    }

    pub async fn pop(&mut self, list: &str) -> DbResult<Option<String>> {
        Ok(self.key_value_for("pop")?.pop(list).await)
    }

    pub async fn list_range(&mut self, list: &str, start: i64, stop: i64) -> DbResult<Vec<String>> {
        Ok(self
            .key_value_for("list_range")?
            .list_range(list, start, stop)
            .await)
    }

    pub async fn set_add(&mut self, set: &str, value: &str) -> DbResult<u64> {
        Ok(self.key_value_for("set_add")?.set_add(set, value).await)
    }

    pub async fn set_remove(&mut self, set: &str, value: &str) -> DbResult<u64> {
        Ok(self.key_value_for("set_remove")?.set_remove(set, value).await)
    }

    pub async fn set_members(&mut self, set: &str) -> DbResult<Vec<String>> {
        Ok(self.key_value_for("set_members")?.set_members(set).await)
    }

    pub async fn set_intersect(&mut self, first: &str, second: &str) -> DbResult<Vec<String>> {
        Ok(self
            .key_value_for("set_intersect")?
            .set_intersect(first, second)
            .await)
    }

    pub async fn zadd(&mut self, zset: &str, score: f64, member: &str) -> DbResult<u64> {
        Ok(self.key_value_for("zadd")?.zadd(zset, score, member).await)
    }

    pub async fn zrem(&mut self, zset: &str, member: &str) -> DbResult<u64> {
        Ok(self.key_value_for("zrem")?.zrem(zset, member).await)
    }

    pub async fn zrange(&mut self, zset: &str, start: i64, stop: i64) -> DbResult<Vec<String>> {
        Ok(self.key_value_for("zrange")?.zrange(zset, start, stop).await)
    }

    pub async fn zrange_with_scores(
        &mut self,
        zset: &str,
        start: i64,
        stop: i64,
    ) -> DbResult<Vec<(String, f64)>> {
        Ok(self
            .key_value_for("zrange_with_scores")?
            .zrange_with_scores(zset, start, stop)
            .await)
    }

    pub async fn zrevrange(&mut self, zset: &str, start: i64, stop: i64) -> DbResult<Vec<String>> {
        Ok(self.key_value_for("zrevrange")?.zrevrange(zset, start, stop).await)
    }

    pub async fn zrevrange_with_scores(
        &mut self,
        zset: &str,
        start: i64,
        stop: i64,
    ) -> DbResult<Vec<(String, f64)>> {
        Ok(self
            .key_value_for("zrevrange_with_scores")?
            .zrevrange_with_scores(zset, start, stop)
            .await)
    }

    pub async fn zscore(&mut self, zset: &str, member: &str) -> DbResult<Option<f64>> {
        Ok(self.key_value_for("zscore")?.zscore(zset, member).await)
    }

    pub async fn zrank(&mut self, zset: &str, member: &str) -> DbResult<Option<u64>> {
        Ok(self.key_value_for("zrank")?.zrank(zset, member).await)
    }

    pub async fn publish(&mut self, channel: &str, message: &str) -> DbResult<u64> {
        Ok(self.key_value_for("publish")?.publish(channel, message).await)
    }

    /// Blocks the calling task for the whole subscription; see
    /// [`KeyValueHandler::subscribe`].
    pub async fn subscribe(
        &mut self,
        channel: &str,
        callback: &mut (dyn FnMut(Message) + Send),
    ) -> DbResult<bool> {
        Ok(self.key_value_for("subscribe")?.subscribe(channel, callback).await)
    }

    pub async fn set_expiration(&mut self, key: &str, seconds: i64) -> DbResult<bool> {
        Ok(self
            .key_value_for("set_expiration")?
            .set_expiration(key, seconds)
            .await)
    }

    pub async fn get_ttl(&mut self, key: &str) -> DbResult<Option<i64>> {
        Ok(self.key_value_for("get_ttl")?.get_ttl(key).await)
    }

    // Shared operations

    /// Open a transaction at the default `SERIALIZABLE` level.
    pub async fn begin_transaction(&mut self) -> DbResult<()> {
        self.begin_transaction_with(IsolationLevel::default()).await
    }

    /// Open a transaction at `level`. Document stores have no isolation
    /// levels and ignore it.
    pub async fn begin_transaction_with(&mut self, level: IsolationLevel) -> DbResult<()> {
        match &mut self.handler {
            Handler::Sql(h) => h.begin_transaction(level).await,
            Handler::Document(h) => {
                if level != IsolationLevel::default() {
                    debug!(level = %level, "Isolation level ignored by the document store");
                }
                h.begin_transaction().await
            }
            Handler::KeyValue(_) => Err(unsupported(self.driver, "begin_transaction")),
        }
    }

    pub async fn commit_transaction(&mut self) -> DbResult<()> {
        match &mut self.handler {
            Handler::Sql(h) => h.commit_transaction().await,
            Handler::Document(h) => h.commit_transaction().await,
            Handler::KeyValue(_) => Err(unsupported(self.driver, "commit_transaction")),
        }
    }

    pub async fn rollback_transaction(&mut self) -> DbResult<()> {
        match &mut self.handler {
            Handler::Sql(h) => h.rollback_transaction().await,
            Handler::Document(h) => h.rollback_transaction().await,
            Handler::KeyValue(_) => Err(unsupported(self.driver, "rollback_transaction")),
        }
    }

    /// Always `false` for key/value stores.
    pub fn in_transaction(&self) -> bool {
        match &self.handler {
            Handler::Sql(h) => h.in_transaction(),
            Handler::Document(h) => h.in_transaction(),
            Handler::KeyValue(_) => false,
        }
    }

    pub async fn last_insert_id(&mut self) -> DbResult<String> {
        match &mut self.handler {
            Handler::Sql(h) => h.last_insert_id().await,
            Handler::Document(h) => h.last_insert_id().await,
            Handler::KeyValue(_) => Err(unsupported(self.driver, "last_insert_id")),
        }
    }

    /// The failure of the handler's most recent operation, if it failed.
    pub fn error_info(&self) -> Option<&ErrorRecord> {
        self.handler.error_info()
    }

    pub fn last_error_code(&self) -> String {
        self.error_info()
            .map(|e| e.code.clone())
            .unwrap_or_else(|| SUCCESS_CODE.to_string())
    }

    pub fn last_error_message(&self) -> String {
        self.error_info()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "No error message".to_string())
    }

    /// Close the handler's connection. Dropping the facade releases it too.
    pub async fn close(self) -> DbResult<()> {
        let driver = self.driver;
        match self.handler {
            Handler::Sql(h) => h.close().await?,
            Handler::Document(h) => h.close().await?,
            Handler::KeyValue(h) => h.close().await?,
        }
        info!(driver = %driver, "Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sqlite() -> Database {
        Database::connect(&Config::from_url("sqlite::memory:").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_selects_sql_family() {
        let db = sqlite().await;
        assert_eq!(db.driver(), Driver::Sqlite);
        assert_eq!(db.family(), BackendFamily::Sql);
        assert!(matches!(db.handler(), Handler::Sql(_)));
    }

    #[tokio::test]
    async fn test_unknown_driver_fails_before_connecting() {
        let err = Database::connect(&Config::new("oracle")).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_document_operations_rejected_on_sql() {
        let mut db = sqlite().await;
        let err = db.insert("users", Row::new()).await.unwrap_err();
        match err {
            DbError::UnsupportedOperation { operation, backend } => {
                assert_eq!(operation, "insert");
                assert_eq!(backend, "SQLite");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(db.key_value().is_err());
        assert!(db.document().is_err());
        assert!(format!("{:?}", db.sql().unwrap()).contains("Sqlite"));
    }

    #[tokio::test]
    async fn test_key_value_operations_rejected_by_name() {
        let mut db = sqlite().await;
        for (operation, err) in [
            ("zadd", db.zadd("scores", 1.0, "a").await.unwrap_err()),
            ("get_ttl", db.get_ttl("k").await.unwrap_err()),
            ("publish", db.publish("events", "ping").await.unwrap_err()),
        ] {
            assert!(
                matches!(&err, DbError::UnsupportedOperation { operation: op, .. } if op == operation),
                "{err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_supports_matches_contract() {
        let db = sqlite().await;
        assert!(db.supports("query"));
        assert!(db.supports("begin_savepoint"));
        assert!(!db.supports("find_many"));
        assert!(!db.supports("zadd"));
        assert!(db.operations().contains(&"get_version"));
    }

    #[tokio::test]
    async fn test_query_chains_through_facade() {
        let mut db = sqlite().await;
        db.query("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap()
            .execute()
            .await
            .unwrap();
        db.query("INSERT INTO t (name) VALUES (:name)")
            .await
            .unwrap()
            .bind("name", "alice")
            .unwrap()
            .execute()
            .await
            .unwrap();
        assert_eq!(db.row_count().unwrap(), 1);
        assert_eq!(db.last_insert_id().await.unwrap(), "1");
        assert_eq!(
            db.fetch_column("SELECT name FROM t").await.unwrap(),
            Some(Value::from("alice"))
        );
        assert_eq!(db.last_error_code(), SUCCESS_CODE);
        db.close().await.unwrap();
    }
}
