//! Notification error types.

use std::time::Duration;

use common::UserId;
use domain::{DomainError, ErrorKind};
use thiserror::Error;

use crate::model::NotificationId;
use crate::preferences::Channel;

/// Errors raised by the router, its stores and the channel adapters.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(NotificationId),

    #[error("Recipient not found: {0}")]
    RecipientNotFound(UserId),

    #[error("User directory error: {0}")]
    Directory(#[from] DomainError),

    /// A channel adapter failed to hand the message over.
    #[error("{channel} delivery failed: {reason}")]
    Delivery { channel: Channel, reason: String },

    #[error("{channel} delivery timed out after {after:?}")]
    Timeout { channel: Channel, after: Duration },

    /// The dispatch worker is no longer running.
    #[error("Dispatch queue closed")]
    QueueClosed,

    /// The dispatch queue is at capacity; the job was not queued.
    #[error("Dispatch queue full")]
    QueueFull,

    #[error("Notification storage error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl NotificationError {
    pub fn delivery(channel: Channel, reason: impl Into<String>) -> Self {
        NotificationError::Delivery {
            channel,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NotificationError::NotFound(_) | NotificationError::RecipientNotFound(_) => {
                ErrorKind::NotFound
            }
            NotificationError::Directory(e) => e.kind(),
            NotificationError::Delivery { .. }
            | NotificationError::Timeout { .. }
            | NotificationError::QueueClosed
            | NotificationError::QueueFull
            | NotificationError::Store(_)
            | NotificationError::Database(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;
