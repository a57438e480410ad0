//! Per-user channel preferences, quiet hours and the channel plan.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::model::{NotificationType, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    Email,
    Sms,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Push, Channel::Email, Channel::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preference categories. Several notification types share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Message,
    NewOrder,
    OrderUpdates,
    ItemInteractions,
    System,
    Promotions,
}

/// Toggles for a channel that covers every category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryToggles {
    pub new_message: bool,
    pub new_order: bool,
    pub order_updates: bool,
    pub item_interactions: bool,
    pub system: bool,
    pub promotions: bool,
}

impl CategoryToggles {
    fn get(&self, category: Category) -> bool {
        match category {
            Category::Message => self.new_message,
            Category::NewOrder => self.new_order,
            Category::OrderUpdates => self.order_updates,
            Category::ItemInteractions => self.item_interactions,
            Category::System => self.system,
            Category::Promotions => self.promotions,
        }
    }
}

/// SMS only carries order and system traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsToggles {
    pub new_order: bool,
    pub order_updates: bool,
    pub system: bool,
}

impl SmsToggles {
    fn get(&self, category: Category) -> Option<bool> {
        match category {
            Category::NewOrder => Some(self.new_order),
            Category::OrderUpdates => Some(self.order_updates),
            Category::System => Some(self.system),
            Category::Message | Category::ItemInteractions | Category::Promotions => None,
        }
    }
}

/// A daily window, possibly wrapping midnight (22:00 to 07:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Both ends inclusive.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: UserId,
    pub email: CategoryToggles,
    pub push: CategoryToggles,
    pub sms: SmsToggles,
    pub quiet_hours: Option<QuietHours>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    pub fn defaults(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email: CategoryToggles {
                new_message: true,
                new_order: true,
                order_updates: true,
                item_interactions: false,
                system: true,
                promotions: false,
            },
            push: CategoryToggles {
                new_message: true,
                new_order: true,
                order_updates: true,
                item_interactions: true,
                system: true,
                promotions: false,
            },
            sms: SmsToggles::default(),
            quiet_hours: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user accepts this type on this channel.
    ///
    /// Types without a toggle are allowed on push and refused on email
    /// and SMS.
    pub fn allows(&self, channel: Channel, notification_type: NotificationType) -> bool {
        let category = notification_type.category();
        match channel {
            Channel::Push => category.is_none_or(|c| self.push.get(c)),
            Channel::Email => category.is_some_and(|c| self.email.get(c)),
            Channel::Sms => category.and_then(|c| self.sms.get(c)).unwrap_or(false),
        }
    }

    pub fn in_quiet_hours(&self, time: NaiveTime) -> bool {
        self.quiet_hours.is_some_and(|q| q.contains(time))
    }

    pub(crate) fn apply(&mut self, update: &PreferenceUpdate) {
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(push) = update.push {
            self.push = push;
        }
        if let Some(sms) = update.sms {
            self.sms = sms;
        }
        if let Some(quiet_hours) = update.quiet_hours {
            self.quiet_hours = quiet_hours;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial preference change; `None` leaves a field as it is.
///
/// `quiet_hours: Some(None)` clears the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreferenceUpdate {
    pub email: Option<CategoryToggles>,
    pub push: Option<CategoryToggles>,
    pub sms: Option<SmsToggles>,
    pub quiet_hours: Option<Option<QuietHours>>,
}

/// Which channels quiet hours silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHoursPolicy {
    pub suppress_push: bool,
    pub suppress_email: bool,
    pub suppress_sms: bool,
}

impl Default for QuietHoursPolicy {
    fn default() -> Self {
        Self {
            suppress_push: true,
            suppress_email: false,
            suppress_sms: true,
        }
    }
}

impl QuietHoursPolicy {
    /// A policy that never suppresses anything.
    pub fn disabled() -> Self {
        Self {
            suppress_push: false,
            suppress_email: false,
            suppress_sms: false,
        }
    }

    pub fn suppresses(&self, channel: Channel) -> bool {
        match channel {
            Channel::Push => self.suppress_push,
            Channel::Email => self.suppress_email,
            Channel::Sms => self.suppress_sms,
        }
    }
}

/// Channels a notification goes out on: the ones the user enabled, minus
/// those the policy silences during the user's quiet hours. Urgent
/// notifications ignore quiet hours.
pub fn plan_channels(
    preference: &NotificationPreference,
    notification_type: NotificationType,
    priority: Priority,
    local_time: NaiveTime,
    policy: &QuietHoursPolicy,
) -> Vec<Channel> {
    let quiet = priority != Priority::Urgent && preference.in_quiet_hours(local_time);
    Channel::ALL
        .into_iter()
        .filter(|&c| preference.allows(c, notification_type))
        .filter(|&c| !(quiet && policy.suppresses(c)))
        .collect()
}

/// Storage for preferences, one row per user.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Returns the user's preferences, creating the defaults atomically
    /// when none exist yet.
    async fn get_or_create(&self, user_id: UserId) -> Result<NotificationPreference>;

    async fn update(
        &self,
        user_id: UserId,
        update: PreferenceUpdate,
    ) -> Result<NotificationPreference>;
}

#[derive(Clone, Default)]
pub struct InMemoryPreferenceStore {
    preferences: Arc<RwLock<HashMap<UserId, NotificationPreference>>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.preferences.read().await.len()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get_or_create(&self, user_id: UserId) -> Result<NotificationPreference> {
        if let Some(existing) = self.preferences.read().await.get(&user_id) {
            return Ok(existing.clone());
        }
        let mut preferences = self.preferences.write().await;
        Ok(preferences
            .entry(user_id)
            .or_insert_with(|| NotificationPreference::defaults(user_id))
            .clone())
    }

    async fn update(
        &self,
        user_id: UserId,
        update: PreferenceUpdate,
    ) -> Result<NotificationPreference> {
        let mut preferences = self.preferences.write().await;
        let preference = preferences
            .entry(user_id)
            .or_insert_with(|| NotificationPreference::defaults(user_id));
        preference.apply(&update);
        Ok(preference.clone())
    }
}
