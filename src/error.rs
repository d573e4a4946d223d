//! Error types for polydb.
//!
//! `DbError` is the single error type every handler returns. Relational
//! handlers propagate it; document and key/value handlers record it as an
//! [`ErrorRecord`] and degrade to a falsy return instead (see the handler
//! modules for the exact policy of each contract).

use serde::Serialize;
use thiserror::Error;

/// SQLSTATE reported when the driver gives no code of its own.
pub const GENERAL_ERROR_CODE: &str = "HY000";

/// SQLSTATE class for connection exceptions.
pub const CONNECTION_ERROR_CODE: &str = "08000";

/// SQLSTATE for "no error".
pub const SUCCESS_CODE: &str = "00000";

#[derive(Error, Debug)]
pub enum DbError {
    /// Unknown backend identifier or invalid connection parameters.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// Prepare/bind/execute or transaction-control failure on a relational handler.
    #[error("Database operation failed: {message}")]
    Statement {
        message: String,
        /// SQLSTATE, e.g. "42P01" for an undefined table
        code: Option<String>,
    },

    /// Document or key/value failure. Recorded on the handler, normally not returned.
    #[error("Operation failed: {operation} - {message}")]
    Operation {
        operation: String,
        message: String,
        code: Option<String>,
    },

    #[error("Transaction error: {message}")]
    TransactionState { message: String },

    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    UnsupportedOperation { operation: String, backend: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a statement error with optional SQLSTATE.
    pub fn statement(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Statement {
            message: message.into(),
            code,
        }
    }

    /// Create an operation error for a document or key/value call.
    pub fn operation(
        operation: impl Into<String>,
        message: impl Into<String>,
        code: Option<String>,
    ) -> Self {
        Self::Operation {
            operation: operation.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a transaction state error.
    pub fn transaction_state(message: impl Into<String>) -> Self {
        Self::TransactionState {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported_operation(operation: impl Into<String>, backend: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            backend: backend.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Prefix the message of a statement error with the failing step,
    /// e.g. "Execution failed: ...".
    pub(crate) fn context(self, step: &str) -> Self {
        match self {
            Self::Statement { message, code } => Self::Statement {
                message: format!("{step}: {message}"),
                code,
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable. Nothing in this crate retries;
    /// this is a hint for callers that layer a retry policy on top.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// The normalized code for this error.
    pub fn code(&self) -> String {
        match self {
            Self::Statement { code, .. } | Self::Operation { code, .. } => code
                .clone()
                .unwrap_or_else(|| GENERAL_ERROR_CODE.to_string()),
            Self::Connection { .. } => CONNECTION_ERROR_CODE.to_string(),
            Self::Configuration { .. } => "configuration".to_string(),
            Self::TransactionState { .. } => "transaction_state".to_string(),
            Self::UnsupportedOperation { .. } => "unsupported_operation".to_string(),
            Self::InvalidInput { .. } => "invalid_input".to_string(),
        }
    }

    /// Normalize into the {code, message} shape stored on handlers.
    pub fn record(&self) -> ErrorRecord {
        let message = match self {
            Self::Statement { message, .. } | Self::Operation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ErrorRecord::new(self.code(), message)
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection parameters and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::statement(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::statement("No rows returned", None),
            sqlx::Error::PoolTimedOut => {
                DbError::connection("Timed out waiting for a connection", "Retry later")
            }
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::statement(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::statement(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::statement(
                format!("Column index {} out of bounds (len: {})", index, len),
                None,
            ),
            sqlx::Error::ColumnDecode { index, source } => DbError::statement(
                format!("Failed to decode column {}: {}", index, source),
                None,
            ),
            sqlx::Error::Encode(source) => {
                DbError::statement(format!("Encode error: {}", source), None)
            }
            sqlx::Error::Decode(source) => {
                DbError::statement(format!("Decode error: {}", source), None)
            }
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Reconnect to the database",
            ),
            _ => DbError::statement(format!("Unknown database error: {}", err), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// The normalized {code, message} of the most recent failure on a handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub code: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
