//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// An immutable fact emitted by a state transition.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Stable name stored alongside the payload (e.g. "OrderAccepted").
    fn event_type(&self) -> &'static str;
}

/// An event-sourced consistency boundary.
///
/// Aggregates decide events from commands in pure methods and rebuild their
/// state by folding those events through [`Aggregate::apply`], which must be
/// deterministic and infallible.
pub trait Aggregate: Default + Send + Sync + Sized {
    type Event: DomainEvent;
    type Error: std::error::Error + Send + Sync;

    fn aggregate_type() -> &'static str;

    /// None until the creation event has been applied.
    fn id(&self) -> Option<AggregateId>;

    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Aggregates whose state can be stored as a snapshot.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    fn should_snapshot(&self) -> bool {
        self.version().as_i64() > 0
            && (self.version().as_i64() as usize).is_multiple_of(Self::snapshot_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum LikeEvent {
        Opened { id: AggregateId },
        Liked,
    }

    impl DomainEvent for LikeEvent {
        fn event_type(&self) -> &'static str {
            match self {
                LikeEvent::Opened { .. } => "LikeCounterOpened",
                LikeEvent::Liked => "Liked",
            }
        }
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct LikeCounter {
        id: Option<AggregateId>,
        likes: u32,
        version: Version,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("unused")]
    struct Never;

    impl Aggregate for LikeCounter {
        type Event = LikeEvent;
        type Error = Never;

        fn aggregate_type() -> &'static str {
            "LikeCounter"
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
                LikeEvent::Opened { id } => self.id = Some(id),
                LikeEvent::Liked => self.likes += 1,
            }
        }
    }

    impl SnapshotCapable for LikeCounter {
        fn snapshot_interval() -> usize {
            10
        }
    }

    #[test]
    fn apply_events_folds_in_order() {
        let id = AggregateId::new();
        let mut counter = LikeCounter::default();
        counter.apply_events([LikeEvent::Opened { id }, LikeEvent::Liked, LikeEvent::Liked]);

        assert_eq!(counter.id(), Some(id));
        assert_eq!(counter.likes, 2);
        assert_eq!(LikeEvent::Liked.event_type(), "Liked");
    }

    #[test]
    fn snapshots_follow_interval() {
        let mut counter = LikeCounter::default();
        assert!(!counter.should_snapshot());

        counter.set_version(Version::new(10));
        assert!(counter.should_snapshot());

        counter.set_version(Version::new(11));
        assert!(!counter.should_snapshot());
    }
}
