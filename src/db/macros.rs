//! Engine dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate engine-specific
//! match arms while maintaining linear readability. The macros expand
//! at compile time with zero runtime overhead.

/// Macro for generating engine dispatch match arms.
///
/// This macro generates match arms for `SqlConnection` variants, reducing the
/// need to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::run(c, sql, args).await,
///     Postgres(c) => postgres::run(c, sql, args).await,
///     SQLite(c) => sqlite::run(c, sql, args).await,
/// });
/// ```
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::sql::connection::SqlConnection::$variant($c) => $body,
            )+
        }
    };
}
