//! Order board read model: orders by party and order number, with per-user
//! buying and selling statistics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use domain::{ItemId, Money, OrderEvent, OrderStatus, PaymentStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, order_event};

/// Denormalized row for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub order_number: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub item_id: ItemId,
    pub item_title: String,
    pub quantity: u32,
    pub total_price: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional narrowing of order listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn matches(&self, summary: &OrderSummary) -> bool {
        self.status.is_none_or(|s| s == summary.status)
            && self.payment_status.is_none_or(|p| p == summary.payment_status)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuyingStats {
    pub total: u64,
    pub active: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub total_spent: Money,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SellingStats {
    pub total: u64,
    pub pending: u64,
    pub active: u64,
    pub completed: u64,
    pub total_earned: Money,
}

/// A user's activity on both sides of the marketplace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TradeStats {
    pub buying: BuyingStats,
    pub selling: SellingStats,
}

#[derive(Default)]
struct OrderBoardState {
    orders: HashMap<AggregateId, OrderSummary>,
    by_number: HashMap<String, AggregateId>,
}

/// Read model view of every order, kept current from order events.
#[derive(Clone, Default)]
pub struct OrderBoardView {
    state: Arc<RwLock<OrderBoardState>>,
}

impl OrderBoardView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<OrderSummary> {
        self.state.read().await.orders.get(&order_id).cloned()
    }

    pub async fn by_order_number(&self, order_number: &str) -> Option<OrderSummary> {
        let state = self.state.read().await;
        let id = state.by_number.get(order_number)?;
        state.orders.get(id).cloned()
    }

    /// Orders the user placed, newest first.
    pub async fn for_buyer(&self, buyer: UserId, filter: OrderFilter) -> Vec<OrderSummary> {
        self.select(|o| o.buyer_id == buyer && filter.matches(o))
            .await
    }

    /// Orders received on the user's items, newest first.
    pub async fn for_seller(&self, seller: UserId, filter: OrderFilter) -> Vec<OrderSummary> {
        self.select(|o| o.seller_id == seller && filter.matches(o))
            .await
    }

    pub async fn stats(&self, user: UserId) -> TradeStats {
        let state = self.state.read().await;
        let mut stats = TradeStats::default();

        for order in state.orders.values() {
            if order.buyer_id == user {
                let buying = &mut stats.buying;
                buying.total += 1;
                match order.status {
                    OrderStatus::Completed => {
                        buying.completed += 1;
                        buying.total_spent += order.total_price;
                    }
                    OrderStatus::Cancelled => buying.cancelled += 1,
                    OrderStatus::Rejected => {}
                    OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::InProgress => {
                        buying.active += 1
                    }
                }
            }
            if order.seller_id == user {
                let selling = &mut stats.selling;
                selling.total += 1;
                match order.status {
                    OrderStatus::Pending => selling.pending += 1,
                    OrderStatus::Accepted | OrderStatus::InProgress => selling.active += 1,
                    OrderStatus::Completed => {
                        selling.completed += 1;
                        selling.total_earned += order.total_price;
                    }
                    OrderStatus::Rejected | OrderStatus::Cancelled => {}
                }
            }
        }
        stats
    }

    async fn select(&self, predicate: impl Fn(&OrderSummary) -> bool) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| predicate(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }
}

#[async_trait]
impl Projection for OrderBoardView {
    fn name(&self) -> &'static str {
        "OrderBoardView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let Some(order_event) = order_event(event)? else {
            return Ok(());
        };
        let order_id = event.aggregate_id;
        let mut state = self.state.write().await;

        if let OrderEvent::OrderCreated(data) = &order_event {
            let number = data.order_number.as_str().to_string();
            state.by_number.insert(number.clone(), order_id);
            state.orders.insert(
                order_id,
                OrderSummary {
                    order_id,
                    order_number: number,
                    buyer_id: data.buyer_id,
                    seller_id: data.seller_id,
                    item_id: data.item_id,
                    item_title: data.item_title.clone(),
                    quantity: data.quantity,
                    total_price: data.unit_price.multiply(data.quantity),
                    status: OrderStatus::Pending,
                    payment_status: PaymentStatus::Pending,
                    created_at: data.created_at,
                    updated_at: data.created_at,
                },
            );
            return Ok(());
        }

        let Some(summary) = state.orders.get_mut(&order_id) else {
            tracing::warn!(%order_id, event_type = %event.event_type, "event for unknown order");
            return Ok(());
        };
        summary.updated_at = order_event.occurred_at();

        match order_event {
            OrderEvent::OrderAccepted(_) => summary.status = OrderStatus::Accepted,
            OrderEvent::OrderRejected(_) => summary.status = OrderStatus::Rejected,
            OrderEvent::OrderStarted(_) => summary.status = OrderStatus::InProgress,
            OrderEvent::OrderCompleted(_) => summary.status = OrderStatus::Completed,
            OrderEvent::OrderCancelled(_) => summary.status = OrderStatus::Cancelled,
            OrderEvent::PaymentInitiated(_) => summary.payment_status = PaymentStatus::Verifying,
            OrderEvent::PaymentVerified(_) => summary.payment_status = PaymentStatus::Paid,
            OrderEvent::PaymentCancelled(_) => summary.payment_status = PaymentStatus::Unpaid,
            OrderEvent::OrderCreated(_) | OrderEvent::OrderDetailsUpdated(_) => {}
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.by_number.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DeliveryInfo, DomainEvent, OrderCreatedData, OrderNumber, PaymentId};
    use event_store::Version;

    struct Fixture {
        view: OrderBoardView,
        buyer: UserId,
        seller: UserId,
        version: i64,
        order_id: AggregateId,
    }

    impl Fixture {
        async fn send(&mut self, event: OrderEvent) {
            self.version += 1;
            let envelope = EventEnvelope::builder()
                .aggregate_id(self.order_id)
                .aggregate_type("Order")
                .event_type(event.event_type())
                .version(Version::new(self.version))
                .payload(&event)
                .unwrap()
                .build()
                .unwrap();
            self.view.handle(&envelope).await.unwrap();
        }
    }

    fn created(order_id: AggregateId, buyer: UserId, seller: UserId, number: &str) -> OrderEvent {
        OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            order_number: OrderNumber::parse(number).unwrap(),
            buyer_id: buyer,
            seller_id: seller,
            item_id: ItemId::new(),
            item_title: "Bookshelf".into(),
            quantity: 2,
            unit_price: Money::from_cents(1250),
            total_price: Money::from_cents(2500),
            delivery: DeliveryInfo::new("9 Cedar Rd", "+966"),
            buyer_notes: None,
            created_at: Utc::now(),
        })
    }

    async fn fixture(number: &str) -> Fixture {
        let mut f = Fixture {
            view: OrderBoardView::new(),
            buyer: UserId::new(),
            seller: UserId::new(),
            version: 0,
            order_id: AggregateId::new(),
        };
        let event = created(f.order_id, f.buyer, f.seller, number);
        f.send(event).await;
        f
    }

    #[tokio::test]
    async fn test_created_order_is_listed() {
        let f = fixture("BOARD001").await;

        let summary = f.view.get(f.order_id).await.unwrap();
        assert_eq!(summary.total_price, Money::from_cents(2500));
        assert_eq!(summary.status, OrderStatus::Pending);
        assert_eq!(
            f.view.by_order_number("BOARD001").await.unwrap().order_id,
            f.order_id
        );
        assert_eq!(f.view.for_buyer(f.buyer, OrderFilter::default()).await.len(), 1);
        assert_eq!(f.view.for_seller(f.seller, OrderFilter::default()).await.len(), 1);
        assert!(f.view.for_buyer(f.seller, OrderFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_and_payment_updates() {
        let mut f = fixture("BOARD002").await;
        let seller = f.seller;
        let buyer = f.buyer;

        f.send(OrderEvent::order_accepted(seller)).await;
        f.send(OrderEvent::payment_cancelled(PaymentId::new(), buyer))
            .await;

        let summary = f.view.get(f.order_id).await.unwrap();
        assert_eq!(summary.status, OrderStatus::Accepted);
        assert_eq!(summary.payment_status, PaymentStatus::Unpaid);

        let accepted = f
            .view
            .for_seller(seller, OrderFilter::status(OrderStatus::Accepted))
            .await;
        assert_eq!(accepted.len(), 1);
        let pending = f
            .view
            .for_seller(seller, OrderFilter::status(OrderStatus::Pending))
            .await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_trade_stats() {
        let mut f = fixture("BOARD003").await;
        let seller = f.seller;
        f.send(OrderEvent::order_accepted(seller)).await;
        f.send(OrderEvent::order_completed(seller, false, None)).await;

        let buyer_stats = f.view.stats(f.buyer).await;
        assert_eq!(buyer_stats.buying.total, 1);
        assert_eq!(buyer_stats.buying.completed, 1);
        assert_eq!(buyer_stats.buying.total_spent, Money::from_cents(2500));
        assert_eq!(buyer_stats.selling, SellingStats::default());

        let seller_stats = f.view.stats(seller).await;
        assert_eq!(seller_stats.selling.completed, 1);
        assert_eq!(seller_stats.selling.total_earned, Money::from_cents(2500));
    }

    #[tokio::test]
    async fn test_reset_clears() {
        let f = fixture("BOARD004").await;
        assert_eq!(f.view.len().await, 1);

        f.view.reset().await.unwrap();
        assert!(f.view.is_empty().await);
        assert!(f.view.by_order_number("BOARD004").await.is_none());
    }
}
