//! Projection processor for feeding events to projections.

use std::sync::Arc;
use std::time::Duration;

use event_store::{EventStore, Sequence};
use metrics::counter;
use tokio::sync::{Mutex, watch};

use crate::checkpoint::{CheckpointStore, InMemoryCheckpointStore};
use crate::projection::Projection;
use crate::{ProjectionError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Events read from the store per query.
    pub batch_size: usize,

    /// Delay between catch-up runs in [`ProjectionProcessor::run`].
    pub poll_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Delivers stored events to the registered projections in sequence order.
///
/// Each projection has its own checkpoint, saved after every successfully
/// handled event. A failing projection stops at the failed event and is
/// retried from there on the next run; the others carry on.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    checkpoints: Arc<dyn CheckpointStore>,
    projections: Vec<Box<dyn Projection>>,
    config: ProcessorConfig,
    run_lock: Mutex<()>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    /// Creates a processor keeping checkpoints in memory.
    pub fn new(store: S) -> Self {
        Self::with_checkpoints(store, Arc::new(InMemoryCheckpointStore::new()))
    }

    pub fn with_checkpoints(store: S, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            checkpoints,
            projections: Vec::new(),
            config: ProcessorConfig::default(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = ProcessorConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        self
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    pub async fn checkpoint(&self, projection: &str) -> Result<Sequence> {
        self.checkpoints.load(projection).await
    }

    /// Delivers every event past each projection's checkpoint.
    ///
    /// Returns the number of deliveries made. When a projection fails the
    /// remaining projections are still processed and the first failure is
    /// returned.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<usize> {
        let _guard = self.run_lock.lock().await;

        let mut delivered = 0;
        let mut first_failure = None;

        for projection in &self.projections {
            match self.drain(projection.as_ref()).await {
                Ok(count) => delivered += count,
                Err(e) => {
                    tracing::error!(projection = projection.name(), error = %e, "projection stalled");
                    counter!("projections_failures_total", "projection" => projection.name())
                        .increment(1);
                    first_failure.get_or_insert(e);
                }
            }
        }

        if delivered > 0 {
            tracing::debug!(delivered, "catch-up complete");
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(delivered),
        }
    }

    /// Resets all projections and their checkpoints, then replays every event.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<usize> {
        {
            let _guard = self.run_lock.lock().await;
            for projection in &self.projections {
                projection.reset().await?;
                self.checkpoints
                    .save(projection.name(), Sequence::initial())
                    .await?;
            }
        }
        self.run_catch_up().await
    }

    /// Runs catch-up on every poll interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_catch_up().await {
                        tracing::warn!(error = %e, "catch-up run failed, retrying next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("projection processor stopped");
    }

    async fn drain(&self, projection: &dyn Projection) -> Result<usize> {
        let name = projection.name();
        let mut checkpoint = self.checkpoints.load(name).await?;
        let mut delivered = 0;

        loop {
            let batch = self
                .store
                .read_after(checkpoint, self.config.batch_size)
                .await?;
            let exhausted = batch.len() < self.config.batch_size;

            for event in &batch {
                projection
                    .handle(event)
                    .await
                    .map_err(|e| ProjectionError::Handler {
                        projection: name,
                        sequence: event.sequence,
                        message: e.to_string(),
                    })?;

                checkpoint = event.sequence;
                self.checkpoints.save(name, checkpoint).await?;
                counter!("projections_events_processed", "projection" => name).increment(1);
                delivered += 1;
            }

            if exhausted {
                return Ok(delivered);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::AggregateId;
    use event_store::{AppendOptions, EventEnvelope, InMemoryEventStore, Version};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Counts events; optionally fails on one event type.
    struct CountingProjection {
        name: &'static str,
        count: Arc<AtomicU64>,
        fail_on: Option<&'static str>,
    }

    impl CountingProjection {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                count: Arc::new(AtomicU64::new(0)),
                fail_on: None,
            }
        }

        fn failing_on(mut self, event_type: &'static str) -> Self {
            self.fail_on = Some(event_type);
            self
        }
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            if self.fail_on == Some(event.event_type.as_str()) {
                return Err(ProjectionError::Projection("boom".into()));
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reset(&self) -> Result<()> {
            self.count.store(0, Ordering::SeqCst);
            Ok(())
        }
    }

    fn test_event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Order")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    async fn seeded_store(types: &[&str]) -> InMemoryEventStore {
        let store = InMemoryEventStore::new();
        let agg_id = AggregateId::new();
        let events = types
            .iter()
            .enumerate()
            .map(|(i, t)| test_event(agg_id, i as i64 + 1, t))
            .collect();
        store.append(events, AppendOptions::new()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_catch_up_processes_all_events() {
        let store = seeded_store(&["A", "B", "C"]).await;
        let projection = CountingProjection::new("counting");
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(projection));

        assert_eq!(processor.run_catch_up().await.unwrap(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(processor.checkpoint("counting").await.unwrap(), Sequence::new(3));
    }

    #[tokio::test]
    async fn test_catch_up_skips_already_processed() {
        let store = seeded_store(&["A", "B", "C"]).await;
        let projection = CountingProjection::new("counting");
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store.clone());
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.run_catch_up().await.unwrap(), 0);

        store
            .append(
                vec![test_event(AggregateId::new(), 1, "D")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
        assert_eq!(processor.run_catch_up().await.unwrap(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_small_batches_read_everything() {
        let store = seeded_store(&["A", "B", "C", "D", "E"]).await;
        let projection = CountingProjection::new("counting");
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store).with_config(ProcessorConfig {
            batch_size: 2,
            ..ProcessorConfig::default()
        });
        processor.register(Box::new(projection));

        assert_eq!(processor.run_catch_up().await.unwrap(), 5);
        assert_eq!(count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_failure_holds_checkpoint_and_spares_others() {
        let store = seeded_store(&["A", "B", "C"]).await;
        let failing = CountingProjection::new("failing").failing_on("B");
        let healthy = CountingProjection::new("healthy");
        let failing_count = Arc::clone(&failing.count);
        let healthy_count = Arc::clone(&healthy.count);

        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(failing));
        processor.register(Box::new(healthy));

        let err = processor.run_catch_up().await.unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::Handler { projection: "failing", sequence, .. } if sequence == Sequence::new(2)
        ));

        assert_eq!(failing_count.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_count.load(Ordering::SeqCst), 3);
        assert_eq!(processor.checkpoint("failing").await.unwrap(), Sequence::new(1));

        // Retried from the failed event on the next run.
        assert!(processor.run_catch_up().await.is_err());
        assert_eq!(failing_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rebuild_resets_and_replays() {
        let store = seeded_store(&["A", "B"]).await;
        let projection = CountingProjection::new("counting");
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store);
        processor.register(Box::new(projection));

        processor.run_catch_up().await.unwrap();
        assert_eq!(processor.rebuild_all().await.unwrap(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_checkpoints_survive_processor_restart() {
        let store = seeded_store(&["A", "B"]).await;
        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());

        let mut first = ProjectionProcessor::with_checkpoints(store.clone(), checkpoints.clone());
        first.register(Box::new(CountingProjection::new("counting")));
        first.run_catch_up().await.unwrap();

        let restarted = CountingProjection::new("counting");
        let count = Arc::clone(&restarted.count);
        let mut second = ProjectionProcessor::with_checkpoints(store, checkpoints);
        second.register(Box::new(restarted));

        assert_eq!(second.run_catch_up().await.unwrap(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = seeded_store(&["A"]).await;
        let projection = CountingProjection::new("counting");
        let count = Arc::clone(&projection.count);

        let mut processor = ProjectionProcessor::new(store).with_config(ProcessorConfig {
            batch_size: 16,
            poll_interval: Duration::from_millis(10),
        });
        processor.register(Box::new(projection));
        let processor = Arc::new(processor);

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(processor.clone().run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
