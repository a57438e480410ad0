//! Domain error types.

use common::AggregateId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::catalog::ItemId;
use crate::order::OrderError;

/// Coarse classification callers map to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Permission,
    InvalidState,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Permission => "permission",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Order not found: {0}")]
    OrderNotFound(AggregateId),

    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Payment reference already used: {0}")]
    ReferenceInUse(String),

    #[error("Could not allocate a unique order number after {attempts} attempts")]
    OrderNumberExhausted { attempts: u32 },

    #[error("Gave up on aggregate {aggregate_id} after {attempts} concurrent modifications")]
    ConcurrencyExhausted {
        aggregate_id: AggregateId,
        attempts: u32,
    },

    /// A collaborator (catalog, user directory) failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Order(e) => e.kind(),
            DomainError::EventStore(e) if e.is_conflict() => ErrorKind::Conflict,
            DomainError::OrderNotFound(_) | DomainError::ItemNotFound(_) => ErrorKind::NotFound,
            DomainError::PermissionDenied(_) => ErrorKind::Permission,
            DomainError::ReferenceInUse(_)
            | DomainError::OrderNumberExhausted { .. }
            | DomainError::ConcurrencyExhausted { .. } => ErrorKind::Conflict,
            DomainError::EventStore(_)
            | DomainError::Collaborator(_)
            | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }
}
