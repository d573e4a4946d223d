//! Document-store handler contract and its MongoDB implementation.
//!
//! CRUD operations never return errors. A failure is logged, recorded for
//! [`NoSqlHandler::error_info`], and the call returns its falsy value
//! (`None`, `false`, `0` or an empty vector). Check `error_info()` after a
//! suspicious falsy result. Transaction control and `last_insert_id` do
//! return errors.

mod convert;
mod mongo;

pub use mongo::MongoHandler;

use crate::config::Driver;
use crate::error::{DbResult, ErrorRecord};
use crate::models::{Document, FindOptions, Row, Value};
use async_trait::async_trait;
use futures_util::future::BoxFuture;

/// Capability set of a document store.
#[async_trait]
pub trait NoSqlHandler: Send {
    fn driver(&self) -> Driver;

    /// Insert one document; returns its identifier.
    async fn insert(&mut self, collection: &str, document: Document) -> Option<Value>;

    async fn find_one(&mut self, collection: &str, filter: Document) -> Option<Row>;

    async fn find_many(
        &mut self,
        collection: &str,
        filter: Document,
        options: FindOptions,
    ) -> Vec<Row>;

    /// Whether a document was modified. Plain field documents are applied
    /// with `$set`.
    async fn update_one(&mut self, collection: &str, filter: Document, update: Document) -> bool;

    /// Number of documents modified.
    async fn update_many(&mut self, collection: &str, filter: Document, update: Document) -> u64;

    async fn delete_one(&mut self, collection: &str, filter: Document) -> bool;

    async fn delete_many(&mut self, collection: &str, filter: Document) -> u64;

    async fn count(&mut self, collection: &str, filter: Document) -> u64;

    /// Run an aggregation pipeline.
    async fn raw_query(&mut self, collection: &str, pipeline: Vec<Document>) -> Vec<Row>;

    /// Run a database command and return the server's reply.
    async fn command(&mut self, command: Document) -> Option<Row>;

    async fn begin_transaction(&mut self) -> DbResult<()>;
    async fn commit_transaction(&mut self) -> DbResult<()>;
    async fn rollback_transaction(&mut self) -> DbResult<()>;

    fn in_transaction(&self) -> bool;

    /// Always an unsupported-operation error: identifiers are generated per
    /// document and returned by [`insert`](Self::insert).
    async fn last_insert_id(&mut self) -> DbResult<String>;

    fn error_info(&self) -> Option<&ErrorRecord>;

    /// End any open session and shut the client down.
    fn close(self: Box<Self>) -> BoxFuture<'static, DbResult<()>>;
}
