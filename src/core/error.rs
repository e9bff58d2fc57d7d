/// Error Module
///
/// This module defines the error taxonomy for sqlconn. Every operation on a
/// `Connection` returns one of these variants unchanged to its caller; the
/// core never swallows or retries a failure.
use thiserror::Error;

/// Error type for connection, statement and transaction operations.
///
/// - `Config`: missing or invalid data-source fields, detected at construction
/// - `Connection`: the driver rejected the connect parameters
/// - `Query`: prepare or execute failed; carries the driver diagnostic
/// - `Logic`: manual transaction control attempted inside `transaction()`
/// - `Binding`: a parameter has no supported wire representation
#[derive(Error, Debug)]
pub enum DbError {
    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The driver could not establish a connection
    #[error("Connection error for {dsn}: {source}")]
    Connection {
        dsn: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Statement preparation or execution errors
    #[error("Query error: {source} (query: {sql})")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Caller misuse of the transaction API
    #[error("Logic error: {0}")]
    Logic(String),

    /// Parameter values the driver cannot represent
    #[error("Binding error: {0}")]
    Binding(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML configuration parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON encoding and parameter parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Wraps a driver failure raised while running `sql`.
    pub fn query(sql: &str, source: rusqlite::Error) -> Self {
        DbError::Query {
            sql: sql.to_string(),
            source,
        }
    }

    /// Returns the underlying driver diagnostic, if this error carries one.
    pub fn driver_error(&self) -> Option<&rusqlite::Error> {
        match self {
            DbError::Connection { source, .. } | DbError::Query { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
