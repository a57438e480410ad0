//! Notification persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::NotificationError;
use crate::model::{Notification, NotificationFilter, NotificationId};

/// Recipient-scoped operations fail with `NotFound` for another user's
/// notification, the same as for a missing one.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<()>;

    async fn get(&self, recipient: UserId, id: NotificationId) -> Result<Notification>;

    /// Marks one notification read; already read ones keep their `read_at`.
    async fn mark_read(
        &self,
        recipient: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<Notification>;

    /// Returns how many were newly marked read.
    async fn mark_all_read(&self, recipient: UserId, at: DateTime<Utc>) -> Result<usize>;

    async fn mark_sent(&self, id: NotificationId, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, recipient: UserId, id: NotificationId) -> Result<()>;

    /// Deletes the recipient's notifications, or only the read ones.
    async fn clear(&self, recipient: UserId, read_only: bool) -> Result<usize>;

    /// Newest first.
    async fn list(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>>;

    /// Notifications never marked sent, oldest first.
    async fn unsent(&self, limit: usize) -> Result<Vec<Notification>>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    notifications: Arc<RwLock<HashMap<NotificationId, Notification>>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.notifications.read().await.len()
    }
}

fn owned_by(notification: &Notification, recipient: UserId) -> bool {
    notification.recipient == recipient
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: Notification) -> Result<()> {
        self.notifications
            .write()
            .await
            .insert(notification.id, notification);
        Ok(())
    }

    async fn get(&self, recipient: UserId, id: NotificationId) -> Result<Notification> {
        self.notifications
            .read()
            .await
            .get(&id)
            .filter(|n| owned_by(n, recipient))
            .cloned()
            .ok_or(NotificationError::NotFound(id))
    }

    async fn mark_read(
        &self,
        recipient: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<Notification> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .filter(|n| owned_by(n, recipient))
            .ok_or(NotificationError::NotFound(id))?;
        notification.mark_read(at);
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, recipient: UserId, at: DateTime<Utc>) -> Result<usize> {
        let mut notifications = self.notifications.write().await;
        Ok(notifications
            .values_mut()
            .filter(|n| owned_by(n, recipient))
            .filter_map(|n| n.mark_read(at).then_some(()))
            .count())
    }

    async fn mark_sent(&self, id: NotificationId, at: DateTime<Utc>) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or(NotificationError::NotFound(id))?;
        notification.mark_sent(at);
        Ok(())
    }

    async fn delete(&self, recipient: UserId, id: NotificationId) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        match notifications.get(&id) {
            Some(n) if owned_by(n, recipient) => {
                notifications.remove(&id);
                Ok(())
            }
            _ => Err(NotificationError::NotFound(id)),
        }
    }

    async fn clear(&self, recipient: UserId, read_only: bool) -> Result<usize> {
        let mut notifications = self.notifications.write().await;
        let before = notifications.len();
        notifications.retain(|_, n| !(owned_by(n, recipient) && (!read_only || n.is_read)));
        Ok(before - notifications.len())
    }

    async fn list(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut listed: Vec<_> = notifications
            .values()
            .filter(|n| owned_by(n, recipient) && filter.matches(n, now))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }

    async fn unsent(&self, limit: usize) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut unsent: Vec<_> = notifications
            .values()
            .filter(|n| !n.is_sent)
            .cloned()
            .collect();
        unsent.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        unsent.truncate(limit);
        Ok(unsent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NotificationType, Priority};
    use chrono::Duration;

    fn notification(recipient: UserId, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id: NotificationId::new(),
            recipient,
            sender: None,
            notification_type: NotificationType::OrderAccepted,
            title: "Order accepted".into(),
            message: "Your order was accepted".into(),
            priority: Priority::Normal,
            entity: None,
            action_url: None,
            is_read: false,
            read_at: None,
            is_sent: false,
            sent_at: None,
            created_at,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_notification() {
        let store = InMemoryNotificationStore::new();
        let owner = UserId::new();
        let n = notification(owner, Utc::now());
        let id = n.id;
        store.insert(n).await.unwrap();

        let stranger = UserId::new();
        assert!(matches!(
            store.get(stranger, id).await,
            Err(NotificationError::NotFound(_))
        ));
        assert!(store.mark_read(stranger, id, Utc::now()).await.is_err());
        assert!(store.delete(stranger, id).await.is_err());
        assert!(!store.get(owner, id).await.unwrap().is_read);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        let now = Utc::now();
        let older = notification(user, now - Duration::minutes(10));
        let newer = notification(user, now);
        let newer_id = newer.id;
        store.insert(older).await.unwrap();
        store.insert(newer).await.unwrap();

        let listed = store
            .list(user, NotificationFilter::default(), now)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer_id);
    }

    #[tokio::test]
    async fn mark_all_read_counts_only_new_reads() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        let now = Utc::now();
        let first = notification(user, now);
        let first_id = first.id;
        store.insert(first).await.unwrap();
        store.insert(notification(user, now)).await.unwrap();
        store.insert(notification(UserId::new(), now)).await.unwrap();

        store.mark_read(user, first_id, now).await.unwrap();
        assert_eq!(store.mark_all_read(user, now).await.unwrap(), 1);
        assert_eq!(store.mark_all_read(user, now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_read_only_keeps_unread() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        let now = Utc::now();
        let read = notification(user, now);
        let read_id = read.id;
        store.insert(read).await.unwrap();
        store.insert(notification(user, now)).await.unwrap();
        store.insert(notification(UserId::new(), now)).await.unwrap();
        store.mark_read(user, read_id, now).await.unwrap();

        assert_eq!(store.clear(user, true).await.unwrap(), 1);
        assert_eq!(store.clear(user, false).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unsent_excludes_sent() {
        let store = InMemoryNotificationStore::new();
        let user = UserId::new();
        let now = Utc::now();
        let sent = notification(user, now);
        let sent_id = sent.id;
        store.insert(sent).await.unwrap();
        store.insert(notification(user, now)).await.unwrap();

        store.mark_sent(sent_id, now).await.unwrap();
        let unsent = store.unsent(10).await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_ne!(unsent[0].id, sent_id);
        assert!(store.unsent(0).await.unwrap().is_empty());
    }
}
