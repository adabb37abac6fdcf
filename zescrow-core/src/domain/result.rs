//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// Another writer changed the record between read and update
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient balance: need {needed} zatoshi, have {available}")]
    InsufficientBalance { needed: i64, available: i64 },

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn chain(msg: impl Into<String>) -> Self {
        Self::Chain(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable code, used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Database(_) => "DATABASE_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::InvalidTransition { .. } => "INVALID_TRANSITION",
            Error::Conflict(_) => "CONFLICT",
            Error::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Error::Chain(_) => "CHAIN_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors wrapped in anyhow keep their variant
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(other) => Self::Other(format!("{:#}", other)),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::invalid_transition("created", "completed");
        assert_eq!(
            err.to_string(),
            "Invalid transition from 'created' to 'completed'"
        );
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_anyhow_round_trip_keeps_variant() {
        let wrapped: anyhow::Error = Error::not_found("deal-1").into();
        let err: Error = wrapped.into();
        assert!(matches!(err, Error::NotFound(ref m) if m == "deal-1"));
    }

    #[test]
    fn test_plain_anyhow_becomes_other() {
        let err: Error = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
