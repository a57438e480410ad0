//! Notifications and the requests that create them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::preferences::Category;

common::uuid_id!(
    /// A stored notification.
    NotificationId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewMessage,
    NewOrder,
    OrderAccepted,
    OrderRejected,
    OrderCompleted,
    OrderCancelled,
    ItemLiked,
    ItemRated,
    UserRated,
    ItemExpired,
    System,
    Promotion,
}

impl NotificationType {
    pub const ALL: [NotificationType; 12] = [
        NotificationType::NewMessage,
        NotificationType::NewOrder,
        NotificationType::OrderAccepted,
        NotificationType::OrderRejected,
        NotificationType::OrderCompleted,
        NotificationType::OrderCancelled,
        NotificationType::ItemLiked,
        NotificationType::ItemRated,
        NotificationType::UserRated,
        NotificationType::ItemExpired,
        NotificationType::System,
        NotificationType::Promotion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewMessage => "new_message",
            NotificationType::NewOrder => "new_order",
            NotificationType::OrderAccepted => "order_accepted",
            NotificationType::OrderRejected => "order_rejected",
            NotificationType::OrderCompleted => "order_completed",
            NotificationType::OrderCancelled => "order_cancelled",
            NotificationType::ItemLiked => "item_liked",
            NotificationType::ItemRated => "item_rated",
            NotificationType::UserRated => "user_rated",
            NotificationType::ItemExpired => "item_expired",
            NotificationType::System => "system",
            NotificationType::Promotion => "promotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// The preference category that gates this type, `None` when no
    /// preference toggle covers it.
    pub fn category(&self) -> Option<Category> {
        match self {
            NotificationType::NewMessage => Some(Category::Message),
            NotificationType::NewOrder => Some(Category::NewOrder),
            NotificationType::OrderAccepted
            | NotificationType::OrderRejected
            | NotificationType::OrderCompleted
            | NotificationType::OrderCancelled => Some(Category::OrderUpdates),
            NotificationType::ItemLiked
            | NotificationType::ItemRated
            | NotificationType::UserRated => Some(Category::ItemInteractions),
            NotificationType::System => Some(Category::System),
            NotificationType::Promotion => Some(Category::Promotions),
            NotificationType::ItemExpired => None,
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Urgent,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Order,
    Item,
    Payment,
    User,
    Message,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Order,
        EntityKind::Item,
        EntityKind::Payment,
        EntityKind::User,
        EntityKind::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Item => "item",
            EntityKind::Payment => "payment",
            EntityKind::User => "user",
            EntityKind::Message => "message",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl Into<Uuid>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub sender: Option<UserId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub entity: Option<EntityRef>,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Returns false if it was already read.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(at);
        true
    }

    pub fn mark_sent(&mut self, at: DateTime<Utc>) {
        self.is_sent = true;
        self.sent_at = Some(at);
    }
}

/// Input to [`NotificationRouter::notify`](crate::NotificationRouter::notify).
///
/// Title and message are optional: when absent they are rendered from the
/// type's template in the recipient's language, using `context` for the
/// `{placeholder}` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub recipient: UserId,
    pub notification_type: NotificationType,
    pub sender: Option<UserId>,
    pub title: Option<String>,
    pub message: Option<String>,
    /// Overrides the template's default priority.
    pub priority: Option<Priority>,
    pub entity: Option<EntityRef>,
    pub action_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub context: HashMap<String, String>,
}

impl NotificationRequest {
    pub fn new(recipient: UserId, notification_type: NotificationType) -> Self {
        Self {
            recipient,
            notification_type,
            sender: None,
            title: None,
            message: None,
            priority: None,
            entity: None,
            action_url: None,
            expires_at: None,
            context: HashMap::new(),
        }
    }

    pub fn sender(mut self, sender: UserId) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Narrowing for recipient listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub notification_type: Option<NotificationType>,
    pub is_read: Option<bool>,
    pub priority: Option<Priority>,
    pub include_expired: bool,
}

impl NotificationFilter {
    pub fn unread() -> Self {
        Self {
            is_read: Some(false),
            ..Self::default()
        }
    }

    pub fn of_type(notification_type: NotificationType) -> Self {
        Self {
            notification_type: Some(notification_type),
            ..Self::default()
        }
    }

    pub fn matches(&self, notification: &Notification, now: DateTime<Utc>) -> bool {
        (self.include_expired || !notification.is_expired(now))
            && self
                .notification_type
                .is_none_or(|t| t == notification.notification_type)
            && self.is_read.is_none_or(|r| r == notification.is_read)
            && self.priority.is_none_or(|p| p == notification.priority)
    }
}

/// Per-recipient counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    pub read: usize,
    pub by_type: HashMap<NotificationType, usize>,
    pub last_24h: usize,
}

impl NotificationStats {
    pub fn collect<'a>(
        notifications: impl IntoIterator<Item = &'a Notification>,
        now: DateTime<Utc>,
    ) -> Self {
        let day_ago = now - chrono::Duration::hours(24);
        let mut stats = Self::default();
        for n in notifications {
            stats.total += 1;
            if n.is_read {
                stats.read += 1;
            } else {
                stats.unread += 1;
            }
            *stats.by_type.entry(n.notification_type).or_default() += 1;
            if n.created_at >= day_ago {
                stats.last_24h += 1;
            }
        }
        stats
    }
}
