//! Background delivery of stored notifications to their channels.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::Result;
use crate::channels::{ChannelSet, Delivery};
use crate::config::NotificationConfig;
use crate::error::NotificationError;
use crate::model::NotificationId;
use crate::store::NotificationStore;

/// Everything needed to send one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    pub notification_id: NotificationId,
    pub deliveries: Vec<Delivery>,
}

enum Command {
    Deliver(DispatchJob),
    Flush(oneshot::Sender<()>),
}

/// Sending side of the dispatch queue.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Command>,
}

impl DispatchHandle {
    /// Queues a job without waiting. A full queue rejects it with
    /// [`NotificationError::QueueFull`].
    pub fn enqueue(&self, job: DispatchJob) -> Result<()> {
        match self.tx.try_send(Command::Deliver(job)) {
            Ok(()) => {
                metrics::counter!("notifications_dispatch_enqueued_total").increment(1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                metrics::counter!("notifications_dispatch_rejected_total").increment(1);
                Err(NotificationError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(NotificationError::QueueClosed),
        }
    }

    /// Resolves once every job queued before the call has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .await
            .map_err(|_| NotificationError::QueueClosed)?;
        done.await.map_err(|_| NotificationError::QueueClosed)
    }
}

/// Sends each job's deliveries concurrently, every send bounded by the
/// channel timeout, then marks the notification sent.
///
/// Failures are logged and counted. Nothing is retried here; a
/// notification whose job never ran stays unsent and can be queued again.
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    channels: ChannelSet,
    channel_timeout: Duration,
    queue_capacity: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, channels: ChannelSet) -> Self {
        Self::with_config(store, channels, &NotificationConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn NotificationStore>,
        channels: ChannelSet,
        config: &NotificationConfig,
    ) -> Self {
        Self {
            store,
            channels,
            channel_timeout: config.channel_timeout,
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    /// Starts the worker task.
    ///
    /// It stops when `shutdown` flips to true or every handle is dropped.
    /// Jobs still queued at shutdown are dropped; their notifications stay
    /// unsent.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> (DispatchHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(self.queue_capacity);

        let worker = tokio::spawn(async move {
            let mut watching = true;
            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(Command::Deliver(job)) => self.deliver(&job).await,
                        Some(Command::Flush(ack)) => {
                            let _ = ack.send(());
                        }
                        None => break,
                    },
                    changed = shutdown.changed(), if watching => match changed {
                        Ok(()) if *shutdown.borrow() => break,
                        Ok(()) => {}
                        Err(_) => watching = false,
                    },
                }
            }
            tracing::info!("notification dispatcher stopped");
        });

        (DispatchHandle { tx }, worker)
    }

    #[tracing::instrument(skip(self, job), fields(notification_id = %job.notification_id, channels = job.deliveries.len()))]
    pub async fn deliver(&self, job: &DispatchJob) {
        join_all(job.deliveries.iter().map(|d| self.attempt(d))).await;

        if let Err(e) = self.store.mark_sent(job.notification_id, Utc::now()).await {
            tracing::warn!(error = %e, "could not mark notification sent");
        }
    }

    async fn attempt(&self, delivery: &Delivery) {
        let channel = delivery.channel();
        let started = Instant::now();

        let outcome =
            match tokio::time::timeout(self.channel_timeout, self.channels.deliver(delivery)).await
            {
                Ok(Ok(())) => "sent",
                Ok(Err(e)) => {
                    tracing::warn!(%channel, error = %e, "channel delivery failed");
                    "failed"
                }
                Err(_) => {
                    let e = NotificationError::Timeout {
                        channel,
                        after: self.channel_timeout,
                    };
                    tracing::warn!(%channel, error = %e, "channel delivery timed out");
                    "timeout"
                }
            };

        metrics::counter!(
            "notifications_dispatch_total",
            "channel" => channel.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("notifications_dispatch_seconds", "channel" => channel.as_str())
            .record(started.elapsed().as_secs_f64());
    }
}
