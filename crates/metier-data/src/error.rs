use thiserror::Error;

/// Errors produced by a data-service backend.
///
/// "No matching row" is not an error: reads return empty row sets and the
/// layers above turn those into `Option::None`.
#[derive(Error, Debug)]
pub enum DataError {
    /// Generic backend failure (transport, query, storage).
    #[error("Data service error: {0}")]
    Backend(String),

    /// An insert collided with a declared unique key.
    ///
    /// Callers doing insert-if-absent treat this as "already exists,
    /// re-read and proceed".
    #[error("Unique constraint violated on {resource}")]
    UniqueViolation { resource: String },

    /// A row did not decode into the expected shape.
    #[error("Row decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The change feed for a subscription was closed by the backend.
    #[error("Change feed closed")]
    FeedClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DataError>;
