//! The notification router: renders, stores and queues notifications, and
//! serves the recipient's inbox.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use common::UserId;
use domain::{UserDirectory, UserProfile};

use crate::Result;
use crate::channels::Delivery;
use crate::config::NotificationConfig;
use crate::dispatch::{DispatchHandle, DispatchJob};
use crate::error::NotificationError;
use crate::model::{
    Notification, NotificationFilter, NotificationId, NotificationRequest, NotificationStats,
};
use crate::preferences::{
    Channel, NotificationPreference, PreferenceStore, PreferenceUpdate, plan_channels,
};
use crate::store::NotificationStore;
use crate::templates::{RenderedText, TemplateRegistry};

#[derive(Clone)]
pub struct NotificationRouter {
    store: Arc<dyn NotificationStore>,
    preferences: Arc<dyn PreferenceStore>,
    users: Arc<dyn UserDirectory>,
    templates: Arc<TemplateRegistry>,
    dispatch: DispatchHandle,
    config: NotificationConfig,
}

impl NotificationRouter {
    /// Uses the default order templates and configuration.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        preferences: Arc<dyn PreferenceStore>,
        users: Arc<dyn UserDirectory>,
        dispatch: DispatchHandle,
    ) -> Self {
        Self {
            store,
            preferences,
            users,
            templates: Arc::new(TemplateRegistry::with_defaults()),
            dispatch,
            config: NotificationConfig::default(),
        }
    }

    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    pub fn with_config(mut self, config: NotificationConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a notification and queues it for delivery.
    ///
    /// Returns as soon as the notification is stored; channel sends happen
    /// on the dispatch worker.
    #[tracing::instrument(skip(self, request), fields(recipient = %request.recipient, notification_type = %request.notification_type))]
    pub async fn notify(&self, request: NotificationRequest) -> Result<Notification> {
        let user = self.recipient(request.recipient).await?;
        let text = self.text_for(&request, &user);
        let priority = request
            .priority
            .unwrap_or_else(|| self.templates.priority(request.notification_type));
        let preference = self.preferences.get_or_create(request.recipient).await?;

        let now = Utc::now();
        let notification = Notification {
            id: NotificationId::new(),
            recipient: request.recipient,
            sender: request.sender,
            notification_type: request.notification_type,
            title: text.title.clone(),
            message: text.message.clone(),
            priority,
            entity: request.entity,
            action_url: request.action_url,
            is_read: false,
            read_at: None,
            is_sent: false,
            sent_at: None,
            created_at: now,
            expires_at: request.expires_at,
        };
        self.store.insert(notification.clone()).await?;
        metrics::counter!(
            "notifications_created_total",
            "type" => notification.notification_type.as_str()
        )
        .increment(1);

        let channels = self.plan(&preference, &notification, now);
        let job = DispatchJob {
            notification_id: notification.id,
            deliveries: deliveries(&channels, &user, &text),
        };
        if let Err(e) = self.dispatch.enqueue(job) {
            tracing::warn!(notification_id = %notification.id, error = %e, "notification stored but not queued");
        }

        Ok(notification)
    }

    /// Queues notifications that were never marked sent, typically after a
    /// restart. Returns how many were queued.
    #[tracing::instrument(skip(self))]
    pub async fn redispatch_unsent(&self) -> Result<usize> {
        let unsent = self.store.unsent(self.config.redispatch_batch).await?;
        let now = Utc::now();
        let mut queued = 0;

        for notification in unsent {
            let Some(user) = self.users.get_user(notification.recipient).await? else {
                tracing::warn!(notification_id = %notification.id, "recipient gone, skipping");
                continue;
            };
            let preference = self.preferences.get_or_create(user.id).await?;
            let channels = self.plan(&preference, &notification, now);
            let text = RenderedText::plain(&notification.title, &notification.message);

            let job = DispatchJob {
                notification_id: notification.id,
                deliveries: deliveries(&channels, &user, &text),
            };
            match self.dispatch.enqueue(job) {
                Ok(()) => queued += 1,
                Err(NotificationError::QueueFull) => {
                    tracing::warn!(queued, "dispatch queue full, leaving the rest for later");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if queued > 0 {
            tracing::info!(queued, "re-queued unsent notifications");
        }
        Ok(queued)
    }

    pub async fn mark_read(&self, recipient: UserId, id: NotificationId) -> Result<Notification> {
        self.store.mark_read(recipient, id, Utc::now()).await
    }

    /// Fetches a notification for display, marking it read.
    pub async fn open(&self, recipient: UserId, id: NotificationId) -> Result<Notification> {
        self.mark_read(recipient, id).await
    }

    pub async fn mark_all_read(&self, recipient: UserId) -> Result<usize> {
        self.store.mark_all_read(recipient, Utc::now()).await
    }

    pub async fn delete(&self, recipient: UserId, id: NotificationId) -> Result<()> {
        self.store.delete(recipient, id).await
    }

    pub async fn clear(&self, recipient: UserId, read_only: bool) -> Result<usize> {
        self.store.clear(recipient, read_only).await
    }

    pub async fn list(
        &self,
        recipient: UserId,
        filter: NotificationFilter,
    ) -> Result<Vec<Notification>> {
        self.store.list(recipient, filter, Utc::now()).await
    }

    /// Unread, unexpired notifications.
    pub async fn unread_count(&self, recipient: UserId) -> Result<usize> {
        Ok(self
            .store
            .list(recipient, NotificationFilter::unread(), Utc::now())
            .await?
            .len())
    }

    pub async fn stats(&self, recipient: UserId) -> Result<NotificationStats> {
        let now = Utc::now();
        let all = NotificationFilter {
            include_expired: true,
            ..NotificationFilter::default()
        };
        let notifications = self.store.list(recipient, all, now).await?;
        Ok(NotificationStats::collect(&notifications, now))
    }

    pub async fn preferences(&self, user: UserId) -> Result<NotificationPreference> {
        self.preferences.get_or_create(user).await
    }

    pub async fn update_preferences(
        &self,
        user: UserId,
        update: PreferenceUpdate,
    ) -> Result<NotificationPreference> {
        self.preferences.update(user, update).await
    }

    async fn recipient(&self, id: UserId) -> Result<UserProfile> {
        self.users
            .get_user(id)
            .await?
            .ok_or(NotificationError::RecipientNotFound(id))
    }

    fn text_for(&self, request: &NotificationRequest, user: &UserProfile) -> RenderedText {
        let rendered =
            self.templates
                .render(request.notification_type, user.language, &request.context);
        if request.title.is_none() && request.message.is_none() {
            return rendered;
        }
        RenderedText::plain(
            request.title.clone().unwrap_or(rendered.title),
            request.message.clone().unwrap_or(rendered.message),
        )
    }

    fn plan(
        &self,
        preference: &NotificationPreference,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Vec<Channel> {
        plan_channels(
            preference,
            notification.notification_type,
            notification.priority,
            self.local_time(now),
            &self.config.quiet_hours,
        )
    }

    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.config.utc_offset).time()
    }
}

/// Addresses each planned channel, skipping those the user has no contact
/// for.
fn deliveries(channels: &[Channel], user: &UserProfile, text: &RenderedText) -> Vec<Delivery> {
    channels
        .iter()
        .filter_map(|channel| match channel {
            Channel::Push => Some(Delivery::Push {
                user: user.id,
                title: text.title.clone(),
                body: text.message.clone(),
            }),
            Channel::Email => user.email.as_ref().map(|address| Delivery::Email {
                address: address.clone(),
                subject: text.email_subject.clone(),
                body: text.email_body.clone(),
            }),
            Channel::Sms => user.phone.as_ref().map(|phone| Delivery::Sms {
                phone: phone.clone(),
                body: text.sms.clone(),
            }),
        })
        .collect()
}
