//! Order domain events.

use chrono::{DateTime, NaiveDate, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::catalog::ItemId;
use crate::payment::PaymentId;

use super::{DeliveryInfo, Money, OrderNumber};

/// Events recorded on an order stream, payments included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedData),
    OrderAccepted(OrderAcceptedData),
    OrderRejected(OrderRejectedData),
    OrderStarted(OrderStartedData),
    OrderCompleted(OrderCompletedData),
    OrderCancelled(OrderCancelledData),
    /// Seller notes or expected delivery changed; no status change.
    OrderDetailsUpdated(OrderDetailsUpdatedData),
    PaymentInitiated(PaymentInitiatedData),
    PaymentVerified(PaymentVerifiedData),
    PaymentCancelled(PaymentCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::OrderAccepted(_) => "OrderAccepted",
            OrderEvent::OrderRejected(_) => "OrderRejected",
            OrderEvent::OrderStarted(_) => "OrderStarted",
            OrderEvent::OrderCompleted(_) => "OrderCompleted",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::OrderDetailsUpdated(_) => "OrderDetailsUpdated",
            OrderEvent::PaymentInitiated(_) => "PaymentInitiated",
            OrderEvent::PaymentVerified(_) => "PaymentVerified",
            OrderEvent::PaymentCancelled(_) => "PaymentCancelled",
        }
    }
}

impl OrderEvent {
    /// The user whose action produced the event.
    pub fn actor(&self) -> UserId {
        match self {
            OrderEvent::OrderCreated(d) => d.buyer_id,
            OrderEvent::OrderAccepted(d) => d.accepted_by,
            OrderEvent::OrderRejected(d) => d.rejected_by,
            OrderEvent::OrderStarted(d) => d.started_by,
            OrderEvent::OrderCompleted(d) => d.completed_by,
            OrderEvent::OrderCancelled(d) => d.cancelled_by,
            OrderEvent::OrderDetailsUpdated(d) => d.updated_by,
            OrderEvent::PaymentInitiated(d) => d.payer_id,
            OrderEvent::PaymentVerified(d) => d.verified_by,
            OrderEvent::PaymentCancelled(d) => d.cancelled_by,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(d) => d.created_at,
            OrderEvent::OrderAccepted(d) => d.accepted_at,
            OrderEvent::OrderRejected(d) => d.rejected_at,
            OrderEvent::OrderStarted(d) => d.started_at,
            OrderEvent::OrderCompleted(d) => d.completed_at,
            OrderEvent::OrderCancelled(d) => d.cancelled_at,
            OrderEvent::OrderDetailsUpdated(d) => d.updated_at,
            OrderEvent::PaymentInitiated(d) => d.initiated_at,
            OrderEvent::PaymentVerified(d) => d.verified_at,
            OrderEvent::PaymentCancelled(d) => d.cancelled_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub item_id: ItemId,
    /// Item title at the time of ordering.
    pub item_title: String,
    pub quantity: u32,
    /// Item price at the time of ordering.
    pub unit_price: Money,
    pub total_price: Money,
    pub delivery: DeliveryInfo,
    pub buyer_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAcceptedData {
    pub accepted_by: UserId,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejectedData {
    pub rejected_by: UserId,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStartedData {
    pub started_by: UserId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletedData {
    pub completed_by: UserId,
    /// The order took the item's whole remaining quantity.
    pub item_sold_out: bool,
    /// Set when the completion cascaded from a payment verification.
    pub payment_id: Option<PaymentId>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetailsUpdatedData {
    pub updated_by: UserId,
    pub seller_notes: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiatedData {
    pub payment_id: PaymentId,
    pub payer_id: UserId,
    pub payer_phone: String,
    pub amount: Money,
    pub reference_number: String,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentVerifiedData {
    pub payment_id: PaymentId,
    pub verified_by: UserId,
    /// Whether the verification should mark the item sold.
    pub marks_item_sold: bool,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCancelledData {
    pub payment_id: PaymentId,
    pub cancelled_by: UserId,
    pub cancelled_at: DateTime<Utc>,
}

// Convenience constructors stamping the current time
impl OrderEvent {
    pub fn order_accepted(accepted_by: UserId) -> Self {
        OrderEvent::OrderAccepted(OrderAcceptedData {
            accepted_by,
            accepted_at: Utc::now(),
        })
    }

    pub fn order_rejected(rejected_by: UserId) -> Self {
        OrderEvent::OrderRejected(OrderRejectedData {
            rejected_by,
            rejected_at: Utc::now(),
        })
    }

    pub fn order_started(started_by: UserId) -> Self {
        OrderEvent::OrderStarted(OrderStartedData {
            started_by,
            started_at: Utc::now(),
        })
    }

    pub fn order_completed(
        completed_by: UserId,
        item_sold_out: bool,
        payment_id: Option<PaymentId>,
    ) -> Self {
        OrderEvent::OrderCompleted(OrderCompletedData {
            completed_by,
            item_sold_out,
            payment_id,
            completed_at: Utc::now(),
        })
    }

    pub fn order_cancelled(cancelled_by: UserId) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }

    pub fn details_updated(
        updated_by: UserId,
        seller_notes: Option<String>,
        expected_delivery_date: Option<NaiveDate>,
    ) -> Self {
        OrderEvent::OrderDetailsUpdated(OrderDetailsUpdatedData {
            updated_by,
            seller_notes,
            expected_delivery_date,
            updated_at: Utc::now(),
        })
    }

    pub fn payment_verified(payment_id: PaymentId, verified_by: UserId, marks_item_sold: bool) -> Self {
        OrderEvent::PaymentVerified(PaymentVerifiedData {
            payment_id,
            verified_by,
            marks_item_sold,
            verified_at: Utc::now(),
        })
    }

    pub fn payment_cancelled(payment_id: PaymentId, cancelled_by: UserId) -> Self {
        OrderEvent::PaymentCancelled(PaymentCancelledData {
            payment_id,
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }
}
