//! Channel adapter ports and the adapters shipped with the crate.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::UserId;
use tokio::sync::RwLock;

use crate::Result;
use crate::error::NotificationError;
use crate::preferences::Channel;

#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send_push(&self, user: UserId, title: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send_email(&self, address: &str, subject: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait SmsChannel: Send + Sync {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<()>;
}

/// One message for one channel, addressed and rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Push {
        user: UserId,
        title: String,
        body: String,
    },
    Email {
        address: String,
        subject: String,
        body: String,
    },
    Sms {
        phone: String,
        body: String,
    },
}

impl Delivery {
    pub fn channel(&self) -> Channel {
        match self {
            Delivery::Push { .. } => Channel::Push,
            Delivery::Email { .. } => Channel::Email,
            Delivery::Sms { .. } => Channel::Sms,
        }
    }
}

/// The adapters the dispatcher sends through.
#[derive(Clone)]
pub struct ChannelSet {
    pub push: Arc<dyn PushChannel>,
    pub email: Arc<dyn EmailChannel>,
    pub sms: Arc<dyn SmsChannel>,
}

impl ChannelSet {
    pub fn new(
        push: Arc<dyn PushChannel>,
        email: Arc<dyn EmailChannel>,
        sms: Arc<dyn SmsChannel>,
    ) -> Self {
        Self { push, email, sms }
    }

    /// Uses one adapter for all three channels.
    pub fn uniform<A>(adapter: Arc<A>) -> Self
    where
        A: PushChannel + EmailChannel + SmsChannel + 'static,
    {
        Self {
            push: adapter.clone(),
            email: adapter.clone(),
            sms: adapter,
        }
    }

    pub async fn deliver(&self, delivery: &Delivery) -> Result<()> {
        match delivery {
            Delivery::Push { user, title, body } => self.push.send_push(*user, title, body).await,
            Delivery::Email {
                address,
                subject,
                body,
            } => self.email.send_email(address, subject, body).await,
            Delivery::Sms { phone, body } => self.sms.send_sms(phone, body).await,
        }
    }
}

/// Adapters that log each message instead of contacting a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChannels;

#[async_trait]
impl PushChannel for TracingChannels {
    async fn send_push(&self, user: UserId, title: &str, body: &str) -> Result<()> {
        tracing::info!(%user, title, body, "push notification");
        Ok(())
    }
}

#[async_trait]
impl EmailChannel for TracingChannels {
    async fn send_email(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(address, subject, body_len = body.len(), "email notification");
        Ok(())
    }
}

#[async_trait]
impl SmsChannel for TracingChannels {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<()> {
        tracing::info!(phone, body, "sms notification");
        Ok(())
    }
}

/// In-memory adapters that record what was sent, for tests.
///
/// Individual channels can be made to fail or to stall.
#[derive(Clone, Default)]
pub struct RecordingChannels {
    sent: Arc<RwLock<Vec<Delivery>>>,
    failing: Arc<RwLock<HashSet<Channel>>>,
    delays: Arc<RwLock<HashMap<Channel, Duration>>>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, channel: Channel, fail: bool) {
        let mut failing = self.failing.write().await;
        if fail {
            failing.insert(channel);
        } else {
            failing.remove(&channel);
        }
    }

    pub async fn set_delay(&self, channel: Channel, delay: Option<Duration>) {
        let mut delays = self.delays.write().await;
        match delay {
            Some(delay) => delays.insert(channel, delay),
            None => delays.remove(&channel),
        };
    }

    pub async fn sent(&self) -> Vec<Delivery> {
        self.sent.read().await.clone()
    }

    pub async fn sent_on(&self, channel: Channel) -> Vec<Delivery> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|d| d.channel() == channel)
            .cloned()
            .collect()
    }

    async fn record(&self, delivery: Delivery) -> Result<()> {
        let channel = delivery.channel();
        let delay = self.delays.read().await.get(&channel).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.read().await.contains(&channel) {
            return Err(NotificationError::delivery(channel, "simulated failure"));
        }
        self.sent.write().await.push(delivery);
        Ok(())
    }
}

#[async_trait]
impl PushChannel for RecordingChannels {
    async fn send_push(&self, user: UserId, title: &str, body: &str) -> Result<()> {
        self.record(Delivery::Push {
            user,
            title: title.to_string(),
            body: body.to_string(),
        })
        .await
    }
}

#[async_trait]
impl EmailChannel for RecordingChannels {
    async fn send_email(&self, address: &str, subject: &str, body: &str) -> Result<()> {
        self.record(Delivery::Email {
            address: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
        .await
    }
}

#[async_trait]
impl SmsChannel for RecordingChannels {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<()> {
        self.record(Delivery::Sms {
            phone: phone.to_string(),
            body: body.to_string(),
        })
        .await
    }
}
