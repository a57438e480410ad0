//! Event persistence for the marketplace core.
//!
//! Events are appended per aggregate with optimistic concurrency and receive
//! a global sequence number, which subscribers use as a checkpoint. The
//! [`KeyRegistry`] claims globally unique business keys such as order
//! numbers and payment references.

pub mod error;
pub mod event;
pub mod keys;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Sequence, Version};
pub use keys::{InMemoryKeyRegistry, KeyRegistry};
pub use memory::InMemoryEventStore;
pub use postgres::{PostgresEventStore, PostgresKeyRegistry};
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
