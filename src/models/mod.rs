//! Data models shared by every backend.
//!
//! This module re-exports the value, row and query types used throughout the crate.

pub mod query;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use query::{FindOptions, IsolationLevel, Placeholder};
pub use row::{Document, Row};
pub use value::{Value, ValueKind};
