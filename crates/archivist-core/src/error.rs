//! Error types for Archivist.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("backend error during {operation} on {key}: {message}")]
    Backend {
        operation: &'static str,
        key: String,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a backend error for `operation` against `key`.
    pub fn backend(
        operation: &'static str,
        key: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Error::Backend {
            operation,
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Prefix the message of a backend error with extra context.
    pub fn context(self, context: &str) -> Self {
        match self {
            Error::Backend {
                operation,
                key,
                message,
            } => Error::Backend {
                operation,
                key,
                message: format!("{}: {}", context, message),
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
