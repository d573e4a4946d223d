//! Facade dispatch tests that need no database server.

use polydb::{BackendFamily, Config, Database, DbError, Driver, Handler, Row};

fn sqlite_memory() -> Config {
    Config::new("sqlite").with_database(":memory:")
}

#[tokio::test]
async fn test_unknown_driver_is_configuration_error() {
    for name in ["oracle", "mssql", "memcached"] {
        let err = Database::connect(&Config::new(name)).await.unwrap_err();
        assert!(
            matches!(err, DbError::Configuration { .. }),
            "{name}: {err:?}"
        );
        assert!(err.to_string().contains(name));
    }
}

#[tokio::test]
async fn test_missing_driver_defaults_to_mysql() {
    let config = Config::default().with_database("app");
    assert_eq!(config.backend().unwrap(), Driver::MySql);

    // No username: rejected before any connection attempt
    let err = Database::connect(&config).await.unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }), "{err:?}");
}

#[tokio::test]
async fn test_invalid_settings_rejected_per_family() {
    let cases = [
        Config::new("sqlite"),
        Config::new("pgsql").with_username("app"),
        Config::new("mongodb"),
        Config::new("redis").with_scheme("carrier-pigeon"),
        sqlite_memory().with_timeout(-1.0),
    ];
    for config in cases {
        let err = Database::connect(&config).await.unwrap_err();
        assert!(
            matches!(err, DbError::Configuration { .. }),
            "{config:?}: {err:?}"
        );
    }
}

#[tokio::test]
async fn test_driver_aliases_resolve() {
    for (name, driver) in [
        ("postgres", Driver::Postgres),
        ("PostgreSQL", Driver::Postgres),
        ("pgsql", Driver::Postgres),
        ("mongo", Driver::MongoDb),
        ("REDIS", Driver::Redis),
        ("sqlite", Driver::Sqlite),
    ] {
        assert_eq!(Config::new(name).backend().unwrap(), driver, "{name}");
    }
}

#[tokio::test]
async fn test_unreachable_backends_fail_at_connect() {
    let cases = [
        Config::new("redis").with_port(1).with_timeout(2.0),
        Config::new("mongodb")
            .with_uri("mongodb://127.0.0.1:1")
            .with_database("polydb")
            .with_timeout(1.0),
        Config::new("pgsql")
            .with_host("127.0.0.1")
            .with_port(1)
            .with_database("polydb")
            .with_username("polydb")
            .with_timeout(2.0),
    ];
    for config in cases {
        let err = Database::connect(&config).await.unwrap_err();
        assert!(
            matches!(err, DbError::Connection { .. }),
            "{config:?}: {err:?}"
        );
        assert!(err.suggestion().is_some());
    }
}

#[tokio::test]
async fn test_sql_facade_rejects_other_contracts() {
    let mut db = Database::connect(&sqlite_memory()).await.unwrap();
    assert_eq!(db.family(), BackendFamily::Sql);

    let err = db.find_one("users", Row::new()).await.unwrap_err();
    match err {
        DbError::UnsupportedOperation { operation, backend } => {
            assert_eq!(operation, "find_one");
            assert_eq!(backend, "SQLite");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(db.count("users", Row::new()).await.is_err());
    assert!(db.raw_query("users", vec![]).await.is_err());
    assert!(db.key_value().is_err());

    for op in ["query", "execute", "begin_savepoint", "get_version", "close"] {
        assert!(db.supports(op), "{op}");
    }
    for op in ["insert", "find_many", "zadd", "subscribe", "teleport"] {
        assert!(!db.supports(op), "{op}");
    }
}

#[tokio::test]
async fn test_shared_operations_reach_sql_handler() {
    let mut db = Database::connect(&sqlite_memory()).await.unwrap();
    assert!(db.error_info().is_none());

    let err = db.commit_transaction().await.unwrap_err();
    assert!(matches!(err, DbError::TransactionState { .. }));
    assert_eq!(
        db.error_info().map(|e| e.code.as_str()),
        Some("transaction_state")
    );

    db.begin_transaction().await.unwrap();
    assert!(db.in_transaction());
    db.rollback_transaction().await.unwrap();
    assert!(!db.in_transaction());
    assert!(db.error_info().is_none());
}

#[tokio::test]
async fn test_into_handler_and_back() {
    let db = Database::connect(&sqlite_memory()).await.unwrap();
    let handler = db.into_handler();
    assert_eq!(handler.driver(), Driver::Sqlite);
    assert!(matches!(handler, Handler::Sql(_)));

    let mut db = Database::from_handler(handler);
    assert_eq!(db.driver(), Driver::Sqlite);
    assert!(db.sql().is_ok());
    db.close().await.unwrap();
}
