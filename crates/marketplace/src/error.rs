//! Facade and host error types.

use domain::{DomainError, ErrorKind};
use event_store::EventStoreError;
use notifications::NotificationError;
use projections::ProjectionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Tracing or metrics could not be installed.
    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}

impl MarketplaceError {
    /// The taxonomy callers map to responses.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketplaceError::Domain(e) => e.kind(),
            MarketplaceError::Notification(e) => e.kind(),
            MarketplaceError::EventStore(e) if e.is_conflict() => ErrorKind::Conflict,
            MarketplaceError::Projection(_)
            | MarketplaceError::EventStore(_)
            | MarketplaceError::Database(_)
            | MarketplaceError::Telemetry(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketplaceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;

    #[test]
    fn kind_passes_through() {
        let err = MarketplaceError::from(DomainError::PermissionDenied("not the seller".into()));
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(err.to_string(), "Permission denied: not the seller");

        let err = MarketplaceError::from(NotificationError::RecipientNotFound(UserId::new()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(
            MarketplaceError::Telemetry("recorder already set".into()).kind(),
            ErrorKind::Internal
        );
    }
}
