//! SQL dialect strings for each relational engine.
//!
//! Everything the handler sends natively that is not caller SQL comes from
//! here, so the engines differ only in these strings.

use crate::config::Driver;
use crate::error::{DbError, DbResult};
use crate::models::IsolationLevel;

/// Native placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?`, bound once per occurrence.
    Question,
    /// `$1`, `$2`, ... ; a number may repeat.
    Dollar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn for_driver(driver: Driver) -> DbResult<Self> {
        match driver {
            Driver::MySql => Ok(Self::MySql),
            Driver::Postgres => Ok(Self::Postgres),
            Driver::Sqlite => Ok(Self::Sqlite),
            other => Err(DbError::configuration(format!(
                "{} is not a relational driver",
                other.display_name()
            ))),
        }
    }

    pub fn driver(&self) -> Driver {
        match self {
            Self::MySql => Driver::MySql,
            Self::Postgres => Driver::Postgres,
            Self::Sqlite => Driver::Sqlite,
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::Postgres => PlaceholderStyle::Dollar,
            Self::MySql | Self::Sqlite => PlaceholderStyle::Question,
        }
    }

    /// Whether backslash escapes a quote inside string literals.
    pub fn backslash_escapes(&self) -> bool {
        matches!(self, Self::MySql)
    }

    /// Whether `#` starts a line comment.
    pub fn hash_comments(&self) -> bool {
        matches!(self, Self::MySql)
    }

    /// Whether `$tag$ ... $tag$` quoting is recognized.
    pub fn dollar_quotes(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Statements that open a transaction at the given isolation level.
    pub fn begin_transaction(&self, level: IsolationLevel) -> Vec<String> {
        match self {
            Self::MySql => vec![
                format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()),
                "START TRANSACTION".to_string(),
            ],
            Self::Postgres => vec![format!(
                "START TRANSACTION ISOLATION LEVEL {}",
                level.as_sql()
            )],
            // SQLite transactions are always serializable
            Self::Sqlite => vec!["BEGIN".to_string()],
        }
    }

    pub fn commit(&self) -> &'static str {
        "COMMIT"
    }

    pub fn rollback(&self) -> &'static str {
        "ROLLBACK"
    }

    pub fn savepoint(&self, name: &str) -> String {
        format!("SAVEPOINT {name}")
    }

    pub fn rollback_to_savepoint(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {name}")
    }

    pub fn release_savepoint(&self, name: &str) -> String {
        format!("RELEASE SAVEPOINT {name}")
    }

    pub fn version_query(&self) -> &'static str {
        match self {
            Self::MySql => "SELECT VERSION()",
            Self::Postgres => "SHOW server_version",
            Self::Sqlite => "SELECT sqlite_version()",
        }
    }

    /// Query for the last generated id, when the driver does not report it.
    pub fn last_insert_id_query(&self) -> Option<&'static str> {
        match self {
            Self::Postgres => Some("SELECT LASTVAL()"),
            Self::MySql | Self::Sqlite => None,
        }
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 63
}

/// Validate a savepoint name before it is interpolated into SQL.
pub fn validate_savepoint_name(name: &str) -> DbResult<()> {
    if is_plain_identifier(name) {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid savepoint name '{name}': use letters, digits and underscores, starting with a letter or underscore"
        )))
    }
}

/// Validate a table or column name before it is interpolated into SQL.
/// One qualifier is allowed, as in `schema.table`.
pub fn validate_identifier(name: &str) -> DbResult<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|part| is_plain_identifier(part)) {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid identifier '{name}': use letters, digits and underscores, optionally qualified as schema.name"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_begin_sets_isolation_first() {
        let stmts = Dialect::MySql.begin_transaction(IsolationLevel::ReadCommitted);
        assert_eq!(
            stmts,
            vec![
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
                "START TRANSACTION"
            ]
        );
    }

    #[test]
    fn test_postgres_begin_is_single_statement() {
        let stmts = Dialect::Postgres.begin_transaction(IsolationLevel::Serializable);
        assert_eq!(stmts, vec!["START TRANSACTION ISOLATION LEVEL SERIALIZABLE"]);
    }

    #[test]
    fn test_sqlite_begin_ignores_level() {
        assert_eq!(
            Dialect::Sqlite.begin_transaction(IsolationLevel::ReadUncommitted),
            vec!["BEGIN"]
        );
    }

    #[test]
    fn test_savepoint_statements_shared() {
        for dialect in [Dialect::MySql, Dialect::Postgres, Dialect::Sqlite] {
            assert_eq!(dialect.savepoint("sp1"), "SAVEPOINT sp1");
            assert_eq!(dialect.rollback_to_savepoint("sp1"), "ROLLBACK TO SAVEPOINT sp1");
            assert_eq!(dialect.release_savepoint("sp1"), "RELEASE SAVEPOINT sp1");
        }
    }

    #[test]
    fn test_version_queries() {
        assert_eq!(Dialect::MySql.version_query(), "SELECT VERSION()");
        assert_eq!(Dialect::Postgres.version_query(), "SHOW server_version");
        assert_eq!(Dialect::Sqlite.version_query(), "SELECT sqlite_version()");
    }

    #[test]
    fn test_for_driver_rejects_non_relational() {
        assert!(Dialect::for_driver(Driver::Redis).is_err());
        assert_eq!(Dialect::for_driver(Driver::Postgres).unwrap(), Dialect::Postgres);
    }

    #[test]
    fn test_savepoint_name_validation() {
        assert!(validate_savepoint_name("sp_1").is_ok());
        assert!(validate_savepoint_name("_a").is_ok());
        assert!(validate_savepoint_name("").is_err());
        assert!(validate_savepoint_name("1abc").is_err());
        assert!(validate_savepoint_name("sp; DROP TABLE users").is_err());
        assert!(validate_savepoint_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("public.users").is_ok());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("users;--").is_err());
        assert!(validate_identifier("first name").is_err());
        assert!(validate_identifier(".users").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_savepoint_name("public.sp").is_err());
    }
}
