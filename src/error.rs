//! Error types for contact book operations.

use thiserror::Error;

use crate::remote::RemoteError;

/// Every failure leaves the store in its last consistent state.
#[derive(Error, Debug)]
pub enum BookError {
    /// A required field is missing or a value is rejected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced contact, event or group no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A storage backend failed without a more specific source.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON or does not match the layout.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
}

impl BookError {
    pub fn required(field: &str) -> Self {
        Self::Validation(format!("{field} is required"))
    }
}

pub type BookResult<T> = Result<T, BookError>;
