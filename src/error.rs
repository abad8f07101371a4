//! Error types for pg-schema-cache.
//!
//! All fallible operations return [`DbResult`]. Variants map directly onto
//! the failure points of the service: input validation, pool lifecycle,
//! transaction discipline, statement execution, row decoding, and crawling.
//! None of these are retried internally; callers decide what to do.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid connection string: {message}")]
    InvalidConnectionString { message: String },

    #[error("Unknown identity: {identity}")]
    UnknownIdentity { identity: String },

    #[error("Pool creation failed: {message}")]
    PoolCreate { message: String },

    #[error("Failed to acquire connection: {message}")]
    Acquire { message: String },

    #[error("Failed to start transaction: {message}")]
    TxBegin { message: String },

    /// Statement execution failed. Carries the server-reported SQLSTATE and
    /// detail when the driver surfaced them.
    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        code: Option<String>,
        detail: Option<String>,
    },

    #[error("Failed to decode result row: {message}")]
    Decode { message: String },

    #[error("Failed to commit transaction: {message}")]
    Commit { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    /// Top-level crawl failure (schema or table enumeration). Per-table
    /// sub-failures are logged and absorbed, they never produce this.
    #[error("Schema crawl failed: {message}")]
    Crawl { message: String },
}

impl DbError {
    pub fn invalid_connection_string(message: impl Into<String>) -> Self {
        Self::InvalidConnectionString {
            message: message.into(),
        }
    }

    pub fn unknown_identity(identity: impl Into<String>) -> Self {
        Self::UnknownIdentity {
            identity: identity.into(),
        }
    }

    pub fn pool_create(message: impl Into<String>) -> Self {
        Self::PoolCreate {
            message: message.into(),
        }
    }

    pub fn acquire(message: impl Into<String>) -> Self {
        Self::Acquire {
            message: message.into(),
        }
    }

    pub fn tx_begin(message: impl Into<String>) -> Self {
        Self::TxBegin {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn commit(message: impl Into<String>) -> Self {
        Self::Commit {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn crawl(message: impl Into<String>) -> Self {
        Self::Crawl {
            message: message.into(),
        }
    }

    /// Build a [`DbError::Statement`] from a driver error, preserving the
    /// SQLSTATE code and server detail when present.
    pub fn statement(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let detail = db_err
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| pg.detail().map(String::from));
                Self::Statement {
                    message: db_err.message().to_string(),
                    code,
                    detail,
                }
            }
            _ => Self::Statement {
                message: err.to_string(),
                code: None,
                detail: None,
            },
        }
    }

    /// SQLSTATE code reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Statement { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for all service operations.
pub type DbResult<T> = Result<T, DbError>;
