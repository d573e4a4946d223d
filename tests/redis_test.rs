//! Key/value contract tests against a live Redis.
//!
//! Set TEST_REDIS_URL environment variable to run these tests.
//! Example: TEST_REDIS_URL="redis://localhost:6379/0"
//! Keys are namespaced per test run; nothing here flushes the server.

use polydb::{Config, Database, DbError, Message};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::time::Duration;

fn namespace() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("polydb:{suffix}")
}

fn config() -> Option<Config> {
    match std::env::var("TEST_REDIS_URL") {
        Ok(url) => Some(Config::from_url(&url).unwrap()),
        Err(_) => {
            eprintln!("Skipping test: TEST_REDIS_URL not set");
            None
        }
    }
}

async fn connect() -> Option<Database> {
    let config = config()?;
    Some(Database::connect(&config).await.unwrap())
}

#[tokio::test]
async fn test_scalars_and_expiration() {
    let Some(mut db) = connect().await else {
        return;
    };
    let ns = namespace();
    let key = format!("{ns}:greeting");
    let kv = db.key_value().unwrap();

    assert!(kv.insert(&key, "hello", 60).await);
    assert_eq!(kv.select(&key).await.as_deref(), Some("hello"));
    let ttl = kv.get_ttl(&key).await.unwrap();
    assert!(ttl > 0 && ttl <= 60, "ttl {ttl}");

    assert!(kv.update(&key, "bye", 0).await);
    assert_eq!(kv.select(&key).await.as_deref(), Some("bye"));
    assert_eq!(kv.get_ttl(&key).await, Some(-1));

    assert!(kv.set_expiration(&key, 30).await);
    assert!(kv.get_ttl(&key).await.unwrap() > 0);
    assert!(kv.select_all().await.contains(&key));

    assert_eq!(kv.delete(&key).await, 1);
    assert_eq!(kv.delete(&key).await, 0);
    assert_eq!(kv.select(&key).await, None);
    assert_eq!(kv.get_ttl(&key).await, Some(-2));
    assert!(!kv.set_expiration(&key, 30).await);
    assert!(kv.error_info().is_none());
}

#[tokio::test]
async fn test_counters() {
    let Some(mut db) = connect().await else {
        return;
    };
    let key = format!("{}:counter", namespace());
    let kv = db.key_value().unwrap();

    assert_eq!(kv.increment(&key, 5).await, Some(5));
    assert_eq!(kv.decrement(&key, 2).await, Some(3));
    assert_eq!(kv.increment(&key, -4).await, Some(-1));
    kv.delete(&key).await;
}

#[tokio::test]
async fn test_failures_are_absorbed_and_recorded() {
    let Some(mut db) = connect().await else {
        return;
    };
    let key = format!("{}:text", namespace());
    let kv = db.key_value().unwrap();

    assert!(kv.insert(&key, "not a number", 0).await);
    assert_eq!(kv.increment(&key, 1).await, None);
    let record = kv.error_info().cloned().expect("failure recorded");
    assert!(!record.code.is_empty());

    // Wrong type for a list command
    assert_eq!(kv.push(&key, "x").await, 0);
    assert!(kv.error_info().is_some());

    assert_eq!(kv.select(&key).await.as_deref(), Some("not a number"));
    assert!(kv.error_info().is_none());
    kv.delete(&key).await;
}

#[tokio::test]
async fn test_hashes_lists_and_sets() {
    let Some(mut db) = connect().await else {
        return;
    };
    let ns = namespace();
    let (hash, list, a, b) = (
        format!("{ns}:hash"),
        format!("{ns}:list"),
        format!("{ns}:set:a"),
        format!("{ns}:set:b"),
    );
    let kv = db.key_value().unwrap();

    assert_eq!(kv.hash_insert(&hash, "name", "ada").await, 1);
    assert_eq!(kv.hash_insert(&hash, "name", "grace").await, 0);
    assert_eq!(kv.hash_insert(&hash, "role", "admiral").await, 1);
    assert_eq!(kv.hash_select(&hash, "name").await.as_deref(), Some("grace"));
    assert_eq!(kv.hash_select(&hash, "missing").await, None);
    let all = kv.hash_select_all(&hash).await;
    assert_eq!(all.get("role").map(String::as_str), Some("admiral"));
    assert_eq!(all.len(), 2);
    assert_eq!(kv.hash_delete(&hash, "role").await, 1);

    assert_eq!(kv.push(&list, "first").await, 1);
    assert_eq!(kv.push(&list, "second").await, 2);
    assert_eq!(kv.list_range(&list, 0, -1).await, ["second", "first"]);
    assert_eq!(kv.pop(&list).await.as_deref(), Some("first"));
    assert_eq!(kv.pop(&list).await.as_deref(), Some("second"));
    assert_eq!(kv.pop(&list).await, None);

    for member in ["x", "y", "z"] {
        assert_eq!(kv.set_add(&a, member).await, 1);
    }
    assert_eq!(kv.set_add(&a, "x").await, 0);
    kv.set_add(&b, "y").await;
    kv.set_add(&b, "z").await;
    kv.set_add(&b, "w").await;
    let mut common = kv.set_intersect(&a, &b).await;
    common.sort();
    assert_eq!(common, ["y", "z"]);
    assert_eq!(kv.set_remove(&a, "x").await, 1);
    assert_eq!(kv.set_members(&a).await.len(), 2);

    for key in [&hash, &a, &b] {
        kv.delete(key).await;
    }
}

#[tokio::test]
async fn test_sorted_sets() {
    let Some(mut db) = connect().await else {
        return;
    };
    let zset = format!("{}:scores", namespace());
    let kv = db.key_value().unwrap();

    assert_eq!(kv.zadd(&zset, 3.0, "c").await, 1);
    assert_eq!(kv.zadd(&zset, 1.0, "a").await, 1);
    assert_eq!(kv.zadd(&zset, 2.5, "b").await, 1);
    assert_eq!(kv.zadd(&zset, 2.0, "b").await, 0);

    assert_eq!(kv.zrange(&zset, 0, -1).await, ["a", "b", "c"]);
    assert_eq!(kv.zrevrange(&zset, 0, 0).await, ["c"]);
    assert_eq!(
        kv.zrange_with_scores(&zset, 0, 1).await,
        [("a".to_string(), 1.0), ("b".to_string(), 2.0)]
    );
    assert_eq!(
        kv.zrevrange_with_scores(&zset, 0, 0).await,
        [("c".to_string(), 3.0)]
    );
    assert_eq!(kv.zscore(&zset, "b").await, Some(2.0));
    assert_eq!(kv.zscore(&zset, "nope").await, None);
    assert_eq!(kv.zrank(&zset, "c").await, Some(2));
    assert_eq!(kv.zrank(&zset, "nope").await, None);
    assert_eq!(kv.zrem(&zset, "a").await, 1);
    assert_eq!(kv.zrange(&zset, 0, -1).await, ["b", "c"]);
    kv.delete(&zset).await;
}

#[tokio::test]
async fn test_publish_reaches_subscriber() {
    let Some(config) = config() else {
        return;
    };
    let channel = format!("{}:events", namespace());

    // The subscriber blocks its task, so it gets its own handler
    let mut subscriber = Database::connect(&config).await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let listen_on = channel.clone();
    let listener = tokio::spawn(async move {
        let kv = subscriber.key_value().unwrap();
        let mut forward = move |message: Message| {
            let _ = tx.send(message);
        };
        kv.subscribe(&listen_on, &mut forward).await
    });

    let mut publisher = Database::connect(&config).await.unwrap();
    let kv = publisher.key_value().unwrap();
    let mut delivered = 0;
    for _ in 0..50 {
        delivered = kv.publish(&channel, "ping").await;
        if delivered > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(delivered, 1);

    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message before timeout")
        .expect("channel open");
    assert_eq!(message.channel, channel);
    assert_eq!(message.payload, "ping");

    // No unsubscribe: cancelling the task ends the subscription
    listener.abort();
    assert!(listener.await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_transactions_unsupported_on_facade() {
    let Some(mut db) = connect().await else {
        return;
    };
    for result in [
        db.begin_transaction().await,
        db.commit_transaction().await,
        db.rollback_transaction().await,
    ] {
        assert!(
            matches!(result, Err(DbError::UnsupportedOperation { .. })),
            "{result:?}"
        );
    }
    assert!(!db.in_transaction());
    assert!(db.last_insert_id().await.is_err());
    assert!(db.document().is_err());
    assert!(db.supports("zrevrange_with_scores"));
    assert!(!db.supports("begin_transaction"));
    db.close().await.unwrap();
}
