//! Command execution against event-sourced aggregates.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, EventStoreExt, Snapshot, Version};
use serde::de::DeserializeOwned;

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Outcome of a successfully executed command.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were decided and persisted.
    pub events: Vec<A::Event>,

    pub new_version: Version,
}

/// Loads aggregates, runs decisions against them and persists the result.
///
/// Every append carries the version the decision was made against. When a
/// concurrent writer got there first the aggregate is reloaded and the
/// decision is made again, up to `max_attempts` times, so a stale decision
/// is never persisted.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    max_attempts: u32,
    _phantom: PhantomData<A>,
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate + DeserializeOwned,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: 3,
            _phantom: PhantomData,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning a default instance if it has no events.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let version = snapshot.version;
                let mut restored: A = snapshot.into_state()?;
                restored.set_version(version);
                restored
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Decides events with `command_fn` and appends them.
    ///
    /// `command_fn` may run more than once and must not have side effects.
    /// An empty decision persists nothing and returns the current state.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempt = 1;
        loop {
            let mut aggregate = self.load(aggregate_id).await?;
            let current_version = aggregate.version();

            let events = command_fn(&aggregate)?;
            if events.is_empty() {
                return Ok(CommandResult {
                    aggregate,
                    events,
                    new_version: current_version,
                });
            }

            let envelopes = Self::build_envelopes(aggregate_id, current_version, &events)?;
            let options = if current_version == Version::initial() {
                AppendOptions::expect_new()
            } else {
                AppendOptions::expect_version(current_version)
            };

            match self.store.append(envelopes, options).await {
                Ok(new_version) => {
                    aggregate.apply_events(events.iter().cloned());
                    aggregate.set_version(new_version);
                    return Ok(CommandResult {
                        aggregate,
                        events,
                        new_version,
                    });
                }
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    tracing::debug!(%aggregate_id, attempt, "lost append race, deciding again");
                    attempt += 1;
                }
                Err(e) if e.is_conflict() => {
                    return Err(DomainError::ConcurrencyExhausted {
                        aggregate_id,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn build_envelopes(
        aggregate_id: AggregateId,
        current_version: Version,
        events: &[A::Event],
    ) -> Result<Vec<EventEnvelope>, DomainError> {
        let mut version = current_version;
        events
            .iter()
            .map(|event| {
                version = version.next();
                Ok(EventEnvelope::builder()
                    .aggregate_id(aggregate_id)
                    .aggregate_type(A::aggregate_type())
                    .event_type(event.event_type())
                    .version(version)
                    .payload(event)?
                    .build()?)
            })
            .collect()
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
{
    /// Like [`CommandHandler::execute`], saving a snapshot whenever the
    /// appended batch crosses a multiple of the snapshot interval.
    pub async fn execute_with_snapshot<F>(
        &self,
        aggregate_id: AggregateId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let result = self.execute(aggregate_id, command_fn).await?;

        let interval = A::snapshot_interval().max(1) as i64;
        let new = result.new_version.as_i64();
        let previous = new - result.events.len() as i64;
        if new / interval > previous / interval {
            let snapshot = Snapshot::from_state(
                aggregate_id,
                A::aggregate_type(),
                result.new_version,
                &result.aggregate,
            )?;
            self.store.save_snapshot(snapshot).await?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use event_store::{EventStoreError, EventStream, InMemoryEventStore, Sequence};
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum StockEvent {
        Listed { id: AggregateId, quantity: u32 },
        Reserved { quantity: u32 },
    }

    impl DomainEvent for StockEvent {
        fn event_type(&self) -> &'static str {
            match self {
                StockEvent::Listed { .. } => "StockListed",
                StockEvent::Reserved { .. } => "StockReserved",
            }
        }
    }

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct Stock {
        id: Option<AggregateId>,
        available: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("only {available} left")]
    struct NotEnough {
        available: u32,
    }

    impl From<NotEnough> for DomainError {
        fn from(e: NotEnough) -> Self {
            DomainError::Collaborator(e.to_string())
        }
    }

    impl Aggregate for Stock {
        type Event = StockEvent;
        type Error = NotEnough;

        fn aggregate_type() -> &'static str {
            "Stock"
        }

        fn id(&self) -> Option<AggregateId> {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn set_version(&mut self, version: Version) {
            self.version = version;
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                StockEvent::Listed { id, quantity } => {
                    self.id = Some(id);
                    self.available = quantity;
                }
                StockEvent::Reserved { quantity } => self.available -= quantity,
            }
        }
    }

    impl SnapshotCapable for Stock {
        fn snapshot_interval() -> usize {
            2
        }
    }

    impl Stock {
        fn reserve(&self, quantity: u32) -> Result<Vec<StockEvent>, NotEnough> {
            if quantity > self.available {
                return Err(NotEnough {
                    available: self.available,
                });
            }
            Ok(vec![StockEvent::Reserved { quantity }])
        }
    }

    /// Delegates to an in-memory store but reports a conflict on the first
    /// `conflicts` appends.
    #[derive(Clone)]
    struct RacingStore {
        inner: InMemoryEventStore,
        conflicts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl EventStore for RacingStore {
        async fn append(
            &self,
            events: Vec<EventEnvelope>,
            options: AppendOptions,
        ) -> event_store::Result<Version> {
            if self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: events[0].aggregate_id,
                    expected: options.expected_version.unwrap_or_default(),
                    actual: Version::new(99),
                });
            }
            self.inner.append(events, options).await
        }

        async fn get_events_for_aggregate(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.get_events_for_aggregate(aggregate_id).await
        }

        async fn get_events_for_aggregate_from_version(
            &self,
            aggregate_id: AggregateId,
            from_version: Version,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner
                .get_events_for_aggregate_from_version(aggregate_id, from_version)
                .await
        }

        async fn read_after(
            &self,
            after: Sequence,
            limit: usize,
        ) -> event_store::Result<Vec<EventEnvelope>> {
            self.inner.read_after(after, limit).await
        }

        async fn stream_all_events(&self) -> event_store::Result<EventStream> {
            self.inner.stream_all_events().await
        }

        async fn get_aggregate_version(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Version>> {
            self.inner.get_aggregate_version(aggregate_id).await
        }

        async fn save_snapshot(&self, snapshot: Snapshot) -> event_store::Result<()> {
            self.inner.save_snapshot(snapshot).await
        }

        async fn get_snapshot(
            &self,
            aggregate_id: AggregateId,
        ) -> event_store::Result<Option<Snapshot>> {
            self.inner.get_snapshot(aggregate_id).await
        }
    }

    async fn listed(handler: &CommandHandler<impl EventStore, Stock>, quantity: u32) -> AggregateId {
        let id = AggregateId::new();
        handler
            .execute(id, |_| Ok(vec![StockEvent::Listed { id, quantity }]))
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn execute_persists_and_applies() {
        let handler: CommandHandler<_, Stock> = CommandHandler::new(InMemoryEventStore::new());
        let id = listed(&handler, 5).await;

        let result = handler.execute(id, |s| s.reserve(2)).await.unwrap();

        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.aggregate.available, 3);
        assert_eq!(handler.load(id).await.unwrap().available, 3);
    }

    #[tokio::test]
    async fn rejected_decision_persists_nothing() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Stock> = CommandHandler::new(store.clone());
        let id = listed(&handler, 1).await;

        let err = handler.execute(id, |s| s.reserve(4)).await.unwrap_err();

        assert!(err.to_string().contains("only 1 left"));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn empty_decision_keeps_version() {
        let handler: CommandHandler<_, Stock> = CommandHandler::new(InMemoryEventStore::new());
        let id = listed(&handler, 1).await;

        let result = handler.execute(id, |_| Ok(vec![])).await.unwrap();
        assert_eq!(result.new_version, Version::first());
    }

    #[tokio::test]
    async fn load_existing_distinguishes_missing_aggregates() {
        let handler: CommandHandler<_, Stock> = CommandHandler::new(InMemoryEventStore::new());
        assert!(handler.load_existing(AggregateId::new()).await.unwrap().is_none());

        let id = listed(&handler, 1).await;
        assert!(handler.load_existing(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn conflict_triggers_a_fresh_decision() {
        let store = RacingStore {
            inner: InMemoryEventStore::new(),
            conflicts: Arc::new(AtomicU32::new(0)),
        };
        let handler: CommandHandler<_, Stock> = CommandHandler::new(store.clone());
        let id = listed(&handler, 5).await;

        store.conflicts.store(1, Ordering::SeqCst);
        let decisions = AtomicU32::new(0);
        let result = handler
            .execute(id, |s| {
                decisions.fetch_add(1, Ordering::SeqCst);
                s.reserve(1)
            })
            .await
            .unwrap();

        assert_eq!(decisions.load(Ordering::SeqCst), 2);
        assert_eq!(result.aggregate.available, 4);
    }

    #[tokio::test]
    async fn conflicts_beyond_budget_surface_as_conflict() {
        let store = RacingStore {
            inner: InMemoryEventStore::new(),
            conflicts: Arc::new(AtomicU32::new(0)),
        };
        let handler: CommandHandler<_, Stock> =
            CommandHandler::new(store.clone()).with_max_attempts(2);
        let id = listed(&handler, 5).await;

        store.conflicts.store(5, Ordering::SeqCst);
        let err = handler.execute(id, |s| s.reserve(1)).await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::ConcurrencyExhausted { attempts: 2, .. }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn snapshot_saved_when_interval_crossed() {
        let store = InMemoryEventStore::new();
        let handler: CommandHandler<_, Stock> = CommandHandler::new(store.clone());
        let id = AggregateId::new();

        handler
            .execute_with_snapshot(id, |_| Ok(vec![StockEvent::Listed { id, quantity: 9 }]))
            .await
            .unwrap();
        assert!(store.get_snapshot(id).await.unwrap().is_none());

        handler
            .execute_with_snapshot(id, |s| s.reserve(4))
            .await
            .unwrap();
        let snapshot = store.get_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, Version::new(2));

        let reloaded = handler.load(id).await.unwrap();
        assert_eq!(reloaded.available, 5);
        assert_eq!(reloaded.version(), Version::new(2));
    }
}
