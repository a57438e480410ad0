//! Projection error types.

use event_store::Sequence;
use thiserror::Error;

/// Errors that can occur during projection processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    #[error("Checkpoint storage error: {0}")]
    Checkpoint(#[from] sqlx::Error),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection rejected an event; its checkpoint stays before `sequence`.
    #[error("Projection {projection} failed at {sequence}: {message}")]
    Handler {
        projection: &'static str,
        sequence: Sequence,
        message: String,
    },

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
