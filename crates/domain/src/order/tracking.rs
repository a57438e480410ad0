//! The order audit trail.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use super::OrderEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    OrderPlaced,
    OrderAccepted,
    OrderRejected,
    InProgress,
    Delivered,
    OrderCancelled,
    PaymentSubmitted,
    PaymentVerified,
    PaymentCancelled,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::OrderPlaced => "order_placed",
            TrackingStatus::OrderAccepted => "order_accepted",
            TrackingStatus::OrderRejected => "order_rejected",
            TrackingStatus::InProgress => "in_progress",
            TrackingStatus::Delivered => "delivered",
            TrackingStatus::OrderCancelled => "order_cancelled",
            TrackingStatus::PaymentSubmitted => "payment_submitted",
            TrackingStatus::PaymentVerified => "payment_verified",
            TrackingStatus::PaymentCancelled => "payment_cancelled",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            TrackingStatus::OrderPlaced => "Order placed",
            TrackingStatus::OrderAccepted => "Order accepted by seller",
            TrackingStatus::OrderRejected => "Order rejected by seller",
            TrackingStatus::InProgress => "Order is being prepared",
            TrackingStatus::Delivered => "Order completed",
            TrackingStatus::OrderCancelled => "Order cancelled",
            TrackingStatus::PaymentSubmitted => "Payment submitted for verification",
            TrackingStatus::PaymentVerified => "Payment verified",
            TrackingStatus::PaymentCancelled => "Payment cancelled",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable line of an order's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub status: TrackingStatus,
    pub description: String,
    pub actor_id: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl TrackingEntry {
    /// The entry an event leaves in the trail, if any.
    pub fn for_event(event: &OrderEvent) -> Option<Self> {
        let status = match event {
            OrderEvent::OrderCreated(_) => TrackingStatus::OrderPlaced,
            OrderEvent::OrderAccepted(_) => TrackingStatus::OrderAccepted,
            OrderEvent::OrderRejected(_) => TrackingStatus::OrderRejected,
            OrderEvent::OrderStarted(_) => TrackingStatus::InProgress,
            OrderEvent::OrderCompleted(_) => TrackingStatus::Delivered,
            OrderEvent::OrderCancelled(_) => TrackingStatus::OrderCancelled,
            OrderEvent::PaymentInitiated(_) => TrackingStatus::PaymentSubmitted,
            OrderEvent::PaymentVerified(_) => TrackingStatus::PaymentVerified,
            OrderEvent::PaymentCancelled(_) => TrackingStatus::PaymentCancelled,
            OrderEvent::OrderDetailsUpdated(_) => return None,
        };

        Some(Self {
            status,
            description: status.description().to_string(),
            actor_id: event.actor(),
            recorded_at: event.occurred_at(),
        })
    }
}
