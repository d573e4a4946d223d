//! Key/value handler contract and its Redis implementation.
//!
//! Every operation is one backend command, atomic at that granularity and
//! no more; there is no transaction boundary. Failures are absorbed the way
//! the document handler absorbs them: logged, recorded for
//! [`KeyValueHandler::error_info`], and degraded to `false`, `0`, `None` or
//! an empty collection.

mod redis_store;

pub use redis_store::RedisHandler;

use crate::config::Driver;
use crate::error::{DbResult, ErrorRecord};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;

/// One message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: String,
}

/// Capability set of a data-structure store.
#[async_trait]
pub trait KeyValueHandler: Send {
    fn driver(&self) -> Driver;

    // Scalars

    /// Store `value`, expiring after `expiration` seconds (0 = never).
    async fn insert(&mut self, key: &str, value: &str, expiration: u64) -> bool;
    async fn select(&mut self, key: &str) -> Option<String>;
    async fn update(&mut self, key: &str, value: &str, expiration: u64) -> bool;
    /// Number of keys removed.
    async fn delete(&mut self, key: &str) -> u64;
    async fn increment(&mut self, key: &str, amount: i64) -> Option<i64>;
    async fn decrement(&mut self, key: &str, amount: i64) -> Option<i64>;
    /// Every key in the selected database.
    async fn select_all(&mut self) -> Vec<String>;
    /// Remove every key on the server.
    async fn flush(&mut self) -> bool;

    // Hashes

    /// Number of fields newly created (0 when an existing field changed).
    async fn hash_insert(&mut self, hash: &str, field: &str, value: &str) -> u64;
    async fn hash_select(&mut self, hash: &str, field: &str) -> Option<String>;
    async fn hash_delete(&mut self, hash: &str, field: &str) -> u64;
    async fn hash_select_all(&mut self, hash: &str) -> IndexMap<String, String>;

    // Lists

    /// Push onto the head; returns the new length.
    async fn push(&mut self, list: &str, value: &str) -> u64;
    /// Pop from the tail.
    async fn pop(&mut self, list: &str) -> Option<String>;
    async fn list_range(&mut self, list: &str, start: i64, stop: i64) -> Vec<String>;

    // Sets

    async fn set_add(&mut self, set: &str, value: &str) -> u64;
    async fn set_remove(&mut self, set: &str, value: &str) -> u64;
    async fn set_members(&mut self, set: &str) -> Vec<String>;
    async fn set_intersect(&mut self, first: &str, second: &str) -> Vec<String>;

    // Sorted sets

    async fn zadd(&mut self, zset: &str, score: f64, member: &str) -> u64;
    async fn zrem(&mut self, zset: &str, member: &str) -> u64;
    async fn zrange(&mut self, zset: &str, start: i64, stop: i64) -> Vec<String>;
    async fn zrange_with_scores(&mut self, zset: &str, start: i64, stop: i64) -> Vec<(String, f64)>;
    async fn zrevrange(&mut self, zset: &str, start: i64, stop: i64) -> Vec<String>;
    async fn zrevrange_with_scores(
        &mut self,
        zset: &str,
        start: i64,
        stop: i64,
    ) -> Vec<(String, f64)>;
    async fn zscore(&mut self, zset: &str, member: &str) -> Option<f64>;
    async fn zrank(&mut self, zset: &str, member: &str) -> Option<u64>;

    // Pub/sub

    /// Number of subscribers that received the message.
    async fn publish(&mut self, channel: &str, message: &str) -> u64;

    /// Invoke `callback` for every message on `channel` until the server
    /// closes the stream.
    ///
    /// This suspends the calling task for the whole subscription. There is
    /// no unsubscribe: drop or abort the future to stop listening, which is
    /// why a subscriber belongs on its own task with its own handler.
    async fn subscribe(
        &mut self,
        channel: &str,
        callback: &mut (dyn FnMut(Message) + Send),
    ) -> bool;

    // Expiration

    async fn set_expiration(&mut self, key: &str, seconds: i64) -> bool;
    /// Seconds to live; `-1` without expiry, `-2` for a missing key.
    async fn get_ttl(&mut self, key: &str) -> Option<i64>;

    fn error_info(&self) -> Option<&ErrorRecord>;

    fn close(self: Box<Self>) -> BoxFuture<'static, DbResult<()>>;
}
