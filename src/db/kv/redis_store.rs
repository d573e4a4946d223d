//! Redis handler.

use super::{KeyValueHandler, Message};
use crate::config::{Driver, KeyValueSettings, mask_uri};
use crate::error::{DbError, DbResult, ErrorRecord};
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue, RedisError};
use std::fmt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Key/value handler over one multiplexed Redis connection.
pub struct RedisHandler {
    /// Kept for opening the dedicated pub/sub connection.
    client: redis::Client,
    conn: MultiplexedConnection,
    error: Option<ErrorRecord>,
}

impl fmt::Debug for RedisHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisHandler")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

fn operation_error(operation: &str, err: &RedisError) -> DbError {
    let code = err
        .code()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()));
    DbError::operation(operation, err.to_string(), Some(code))
}

fn connect_error(err: &RedisError) -> DbError {
    let suggestion = if err.is_connection_refusal() {
        "Check that the Redis server is running and accessible"
    } else if err.kind() == redis::ErrorKind::AuthenticationFailed {
        "Verify the Redis password"
    } else {
        "Verify the Redis host, port and scheme"
    };
    DbError::connection(format!("Failed to connect: {err}"), suggestion)
}

impl RedisHandler {
    /// Open the connection and PING the server.
    pub async fn connect(settings: &KeyValueSettings) -> DbResult<Self> {
        let url = settings.connection_url()?;
        let client = redis::Client::open(url.as_str()).map_err(|e| {
            DbError::configuration(format!("Invalid Redis URL '{}': {e}", mask_uri(&url)))
        })?;

        let attempt = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await?;
            Ok::<_, RedisError>(conn)
        };
        let conn = match settings.connect_timeout {
            Some(limit) => timeout(limit, attempt).await.map_err(|_| {
                DbError::connection(
                    format!("Timed out after {:.1}s connecting to Redis", limit.as_secs_f64()),
                    "Check that the Redis server is reachable, or raise the timeout",
                )
            })?,
            None => attempt.await,
        }
        .map_err(|e| connect_error(&e))?;

        info!(url = %mask_uri(&url), "Connected to Redis");
        Ok(Self {
            client,
            conn,
            error: None,
        })
    }

    /// Send one command, recording a failure instead of returning it.
    async fn run<T: FromRedisValue>(&mut self, operation: &str, cmd: &Cmd) -> Option<T> {
        self.error = None;
        match cmd.query_async::<T>(&mut self.conn).await {
            Ok(value) => {
                debug!(operation, "Redis command succeeded");
                Some(value)
            }
            Err(e) => {
                warn!(operation, error = %e, "Redis command failed");
                self.error = Some(operation_error(operation, &e).record());
                None
            }
        }
    }

    fn fail(&mut self, operation: &str, err: &RedisError) {
        warn!(operation, error = %err, "Redis command failed");
        self.error = Some(operation_error(operation, err).record());
    }

    async fn set(&mut self, operation: &str, key: &str, value: &str, expiration: u64) -> bool {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if expiration > 0 {
            cmd.arg("EX").arg(expiration);
        }
        self.run::<()>(operation, &cmd).await.is_some()
    }

    async fn range(
        &mut self,
        operation: &str,
        command: &str,
        zset: &str,
        start: i64,
        stop: i64,
    ) -> Vec<String> {
        self.run(operation, redis::cmd(command).arg(zset).arg(start).arg(stop))
            .await
            .unwrap_or_default()
    }

    async fn range_with_scores(
        &mut self,
        operation: &str,
        command: &str,
        zset: &str,
        start: i64,
        stop: i64,
    ) -> Vec<(String, f64)> {
        self.run(
            operation,
            redis::cmd(command)
                .arg(zset)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES"),
        )
        .await
        .unwrap_or_default()
    }
}

#[async_trait]
impl KeyValueHandler for RedisHandler {
    fn driver(&self) -> Driver {
        Driver::Redis
    }

    async fn insert(&mut self, key: &str, value: &str, expiration: u64) -> bool {
        self.set("insert", key, value, expiration).await
    }

    async fn select(&mut self, key: &str) -> Option<String> {
        self.run::<Option<String>>("select", redis::cmd("GET").arg(key))
            .await
            .flatten()
    }

    async fn update(&mut self, key: &str, value: &str, expiration: u64) -> bool {
        self.set("update", key, value, expiration).await
    }

    async fn delete(&mut self, key: &str) -> u64 {
        self.run("delete", redis::cmd("DEL").arg(key))
            .await
            .unwrap_or(0)
    }

    async fn increment(&mut self, key: &str, amount: i64) -> Option<i64> {
        self.run("increment", redis::cmd("INCRBY").arg(key).arg(amount))
            .await
    }

    async fn decrement(&mut self, key: &str, amount: i64) -> Option<i64> {
        self.run("decrement", redis::cmd("DECRBY").arg(key).arg(amount))
            .await
    }

    async fn select_all(&mut self) -> Vec<String> {
        self.run("select_all", redis::cmd("KEYS").arg("*"))
            .await
            .unwrap_or_default()
    }

    async fn flush(&mut self) -> bool {
        self.run::<()>("flush", &redis::cmd("FLUSHALL"))
            .await
            .is_some()
    }

    async fn hash_insert(&mut self, hash: &str, field: &str, value: &str) -> u64 {
        self.run("hash_insert", redis::cmd("HSET").arg(hash).arg(field).arg(value))
            .await
            .unwrap_or(0)
    }

    async fn hash_select(&mut self, hash: &str, field: &str) -> Option<String> {
        self.run::<Option<String>>("hash_select", redis::cmd("HGET").arg(hash).arg(field))
            .await
            .flatten()
    }

    async fn hash_delete(&mut self, hash: &str, field: &str) -> u64 {
        self.run("hash_delete", redis::cmd("HDEL").arg(hash).arg(field))
            .await
            .unwrap_or(0)
    }

    async fn hash_select_all(&mut self, hash: &str) -> IndexMap<String, String> {
        self.run::<Vec<(String, String)>>("hash_select_all", redis::cmd("HGETALL").arg(hash))
            .await
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    async fn push(&mut self, list: &str, value: &str) -> u64 {
        self.run("push", redis::cmd("LPUSH").arg(list).arg(value))
            .await
            .unwrap_or(0)
    }

    async fn pop(&mut self, list: &str) -> Option<String> {
        self.run::<Option<String>>("pop", redis::cmd("RPOP").arg(list))
            .await
            .flatten()
    }

    async fn list_range(&mut self, list: &str, start: i64, stop: i64) -> Vec<String> {
        self.run("list_range", redis::cmd("LRANGE").arg(list).arg(start).arg(stop))
            .await
            .unwrap_or_default()
    }

    async fn set_add(&mut self, set: &str, value: &str) -> u64 {
        self.run("set_add", redis::cmd("SADD").arg(set).arg(value))
            .await
            .unwrap_or(0)
    }

    async fn set_remove(&mut self, set: &str, value: &str) -> u64 {
        self.run("set_remove", redis::cmd("SREM").arg(set).arg(value))
            .await
            .unwrap_or(0)
    }

    async fn set_members(&mut self, set: &str) -> Vec<String> {
        self.run("set_members", redis::cmd("SMEMBERS").arg(set))
            .await
            .unwrap_or_default()
    }

    async fn set_intersect(&mut self, first: &str, second: &str) -> Vec<String> {
        self.run("set_intersect", redis::cmd("SINTER").arg(first).arg(second))
            .await
            .unwrap_or_default()
    }

    async fn zadd(&mut self, zset: &str, score: f64, member: &str) -> u64 {
        self.run("zadd", redis::cmd("ZADD").arg(zset).arg(score).arg(member))
            .await
            .unwrap_or(0)
    }

    async fn zrem(&mut self, zset: &str, member: &str) -> u64 {
        self.run("zrem", redis::cmd("ZREM").arg(zset).arg(member))
            .await
            .unwrap_or(0)
    }

    async fn zrange(&mut self, zset: &str, start: i64, stop: i64) -> Vec<String> {
        self.range("zrange", "ZRANGE", zset, start, stop).await
    }

    async fn zrange_with_scores(&mut self, zset: &str, start: i64, stop: i64) -> Vec<(String, f64)> {
        self.range_with_scores("zrange", "ZRANGE", zset, start, stop)
            .await
    }

    async fn zrevrange(&mut self, zset: &str, start: i64, stop: i64) -> Vec<String> {
        self.range("zrevrange", "ZREVRANGE", zset, start, stop).await
    }

    async fn zrevrange_with_scores(
        &mut self,
        zset: &str,
        start: i64,
        stop: i64,
    ) -> Vec<(String, f64)> {
        self.range_with_scores("zrevrange", "ZREVRANGE", zset, start, stop)
            .await
    }

    async fn zscore(&mut self, zset: &str, member: &str) -> Option<f64> {
        self.run::<Option<f64>>("zscore", redis::cmd("ZSCORE").arg(zset).arg(member))
            .await
            .flatten()
    }

    async fn zrank(&mut self, zset: &str, member: &str) -> Option<u64> {
        self.run::<Option<u64>>("zrank", redis::cmd("ZRANK").arg(zset).arg(member))
            .await
            .flatten()
    }

    async fn publish(&mut self, channel: &str, message: &str) -> u64 {
        self.run("publish", redis::cmd("PUBLISH").arg(channel).arg(message))
            .await
            .unwrap_or(0)
    }

    async fn subscribe(
        &mut self,
        channel: &str,
        callback: &mut (dyn FnMut(Message) + Send),
    ) -> bool {
        self.error = None;
        // Subscribing takes a connection over, so it gets its own
        let mut pubsub = match self.client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                self.fail("subscribe", &e);
                return false;
            }
        };
        if let Err(e) = pubsub.subscribe(channel).await {
            self.fail("subscribe", &e);
            return false;
        }
        info!(channel, "Subscribed");

        let mut messages = std::pin::pin!(pubsub.on_message());
        while let Some(msg) = messages.next().await {
            match msg.get_payload::<String>() {
                Ok(payload) => callback(Message {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                }),
                Err(e) => warn!(channel, error = %e, "Skipping undecodable message"),
            }
        }
        info!(channel, "Subscription closed by the server");
        true
    }

    async fn set_expiration(&mut self, key: &str, seconds: i64) -> bool {
        self.run::<i64>("set_expiration", redis::cmd("EXPIRE").arg(key).arg(seconds))
            .await
            .is_some_and(|set| set == 1)
    }

    async fn get_ttl(&mut self, key: &str) -> Option<i64> {
        self.run("get_ttl", redis::cmd("TTL").arg(key)).await
    }

    fn error_info(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, DbResult<()>> {
        Box::pin(async move {
            // The multiplexed connection closes when its last handle drops
            drop(self);
            info!("Redis connection closed");
            Ok(())
        })
    }
}
