//! Statement, transaction and query-option vocabulary.

use crate::error::{DbError, DbResult};
use crate::models::Document;
use std::fmt;

/// Identifies a bind slot in a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// 1-based position of a `?` marker.
    Position(usize),
    /// Name of a `:name` marker, without the colon.
    Named(String),
}

impl Placeholder {
    /// Build a named placeholder, accepting an optional leading colon.
    pub fn named(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        Self::Named(name.strip_prefix(':').unwrap_or(name).to_string())
    }
}

impl From<usize> for Placeholder {
    fn from(position: usize) -> Self {
        Self::Position(position)
    }
}

impl From<i32> for Placeholder {
    fn from(position: i32) -> Self {
        Self::Position(usize::try_from(position).unwrap_or(0))
    }
}

impl From<&str> for Placeholder {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for Placeholder {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(n) => write!(f, "?{n}"),
            Self::Named(name) => write!(f, ":{name}"),
        }
    }
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = DbError;

    fn from_str(s: &str) -> DbResult<Self> {
        let normalized = s
            .trim()
            .to_ascii_uppercase()
            .replace(['_', '-'], " ");
        match normalized.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "READ UNCOMMITTED" => Ok(Self::ReadUncommitted),
            "READ COMMITTED" => Ok(Self::ReadCommitted),
            "REPEATABLE READ" => Ok(Self::RepeatableRead),
            "SERIALIZABLE" => Ok(Self::Serializable),
            _ => Err(DbError::invalid_input(format!(
                "Unknown isolation level '{s}'"
            ))),
        }
    }
}

/// Options for `find_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    /// Sort specification, e.g. `{"created_at": -1}`.
    pub sort: Option<Document>,
    /// Projection, e.g. `{"name": 1, "_id": 0}`.
    pub projection: Option<Document>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }
}
