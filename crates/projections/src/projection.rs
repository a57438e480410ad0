//! Core projection trait.

use async_trait::async_trait;
use domain::{Aggregate, Order, OrderEvent};
use event_store::EventEnvelope;

use crate::Result;

/// A subscriber that processes stored events in global sequence order.
///
/// The processor tracks each projection's checkpoint by [`Projection::name`],
/// so names must be unique and stable across restarts. Delivery is
/// at-least-once: an event whose handling failed is delivered again on the
/// next run.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Handles a single event, updating the projection's state.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    /// Resets the projection to its initial state before a rebuild.
    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// Decodes an order event, or None for events of other aggregates.
pub fn order_event(envelope: &EventEnvelope) -> Result<Option<OrderEvent>> {
    if envelope.aggregate_type != Order::aggregate_type() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(envelope.payload.clone())?))
}
