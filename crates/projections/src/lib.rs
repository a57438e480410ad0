//! Event subscribers for the query side.
//!
//! - [`Projection`] trait for anything that consumes stored events
//! - [`ProjectionProcessor`] delivers events by global sequence to the
//!   registered projections, advancing each one's checkpoint only after
//!   the projection handled the event
//! - [`CheckpointStore`] persists those checkpoints (in memory or PostgreSQL)
//! - [`OrderBoardView`]: orders by buyer, seller and order number, with
//!   buying and selling statistics

pub mod checkpoint;
pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, PostgresCheckpointStore};
pub use error::{ProjectionError, Result};
pub use processor::{ProcessorConfig, ProjectionProcessor};
pub use projection::{Projection, order_event};
pub use views::{BuyingStats, OrderBoardView, OrderFilter, OrderSummary, SellingStats, TradeStats};
