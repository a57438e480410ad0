//! Order commands.

use chrono::NaiveDate;
use common::{AggregateId, UserId};

use crate::catalog::ItemId;

use super::{DeliveryInfo, OrderStatus};

/// A buyer orders a quantity of a listed item.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub buyer_id: UserId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub delivery: DeliveryInfo,
    pub buyer_notes: Option<String>,
}

impl PlaceOrder {
    pub fn new(buyer_id: UserId, item_id: ItemId, quantity: u32, delivery: DeliveryInfo) -> Self {
        Self {
            buyer_id,
            item_id,
            quantity,
            delivery,
            buyer_notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.buyer_notes = Some(notes.into());
        self
    }
}

/// Seller accepts a pending order.
#[derive(Debug, Clone, Copy)]
pub struct AcceptOrder {
    pub order_id: AggregateId,
    pub actor_id: UserId,
}

impl AcceptOrder {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Seller rejects a pending order.
#[derive(Debug, Clone, Copy)]
pub struct RejectOrder {
    pub order_id: AggregateId,
    pub actor_id: UserId,
}

impl RejectOrder {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Seller starts preparing an accepted order.
#[derive(Debug, Clone, Copy)]
pub struct StartOrder {
    pub order_id: AggregateId,
    pub actor_id: UserId,
}

impl StartOrder {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Seller marks an order delivered.
#[derive(Debug, Clone, Copy)]
pub struct CompleteOrder {
    pub order_id: AggregateId,
    pub actor_id: UserId,
}

impl CompleteOrder {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Buyer withdraws an order that has not started.
#[derive(Debug, Clone, Copy)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub actor_id: UserId,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Seller moves an order to any status the transition table allows.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOrderStatus {
    pub order_id: AggregateId,
    pub actor_id: UserId,
    pub target: OrderStatus,
}

impl UpdateOrderStatus {
    pub fn new(order_id: AggregateId, actor_id: UserId, target: OrderStatus) -> Self {
        Self {
            order_id,
            actor_id,
            target,
        }
    }
}

/// Seller edits notes or the expected delivery date. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone)]
pub struct UpdateOrderDetails {
    pub order_id: AggregateId,
    pub actor_id: UserId,
    pub seller_notes: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
}

impl UpdateOrderDetails {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self {
            order_id,
            actor_id,
            seller_notes: None,
            expected_delivery_date: None,
        }
    }

    pub fn seller_notes(mut self, notes: impl Into<String>) -> Self {
        self.seller_notes = Some(notes.into());
        self
    }

    pub fn expected_delivery(mut self, date: NaiveDate) -> Self {
        self.expected_delivery_date = Some(date);
        self
    }
}
