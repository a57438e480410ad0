//! Turns order events into notifications for the buyer or the seller.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{AggregateId, UserId};
use domain::{DomainEvent, OrderCreatedData, OrderEvent};
use event_store::{EventEnvelope, EventStore};
use projections::{Projection, ProjectionError, order_event};
use tokio::sync::RwLock;

use crate::error::NotificationError;
use crate::model::{EntityKind, EntityRef, NotificationRequest, NotificationType, Priority};
use crate::router::NotificationRouter;

/// Who is on each side of an order, as recorded when it was placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParties {
    pub order_id: AggregateId,
    pub order_number: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub item_title: String,
}

impl OrderParties {
    pub fn from_created(data: &OrderCreatedData) -> Self {
        Self {
            order_id: data.order_id,
            order_number: data.order_number.as_str().to_string(),
            buyer_id: data.buyer_id,
            seller_id: data.seller_id,
            item_title: data.item_title.clone(),
        }
    }
}

/// The notification an order event produces, if any.
///
/// New orders and cancellations go to the seller; acceptance, rejection and
/// completion go to the buyer. The recipient depends on the event type only.
pub fn route_order_event(event: &OrderEvent, parties: &OrderParties) -> Option<NotificationRequest> {
    let (recipient, notification_type) = match event {
        OrderEvent::OrderCreated(_) => (parties.seller_id, NotificationType::NewOrder),
        OrderEvent::OrderAccepted(_) => (parties.buyer_id, NotificationType::OrderAccepted),
        OrderEvent::OrderRejected(_) => (parties.buyer_id, NotificationType::OrderRejected),
        OrderEvent::OrderCompleted(_) => (parties.buyer_id, NotificationType::OrderCompleted),
        OrderEvent::OrderCancelled(_) => (parties.seller_id, NotificationType::OrderCancelled),
        OrderEvent::OrderStarted(_)
        | OrderEvent::OrderDetailsUpdated(_)
        | OrderEvent::PaymentInitiated(_)
        | OrderEvent::PaymentVerified(_)
        | OrderEvent::PaymentCancelled(_) => return None,
    };
    let priority = match notification_type {
        NotificationType::NewOrder => Priority::High,
        _ => Priority::Normal,
    };

    Some(
        NotificationRequest::new(recipient, notification_type)
            .sender(event.actor())
            .priority(priority)
            .entity(EntityRef::new(EntityKind::Order, parties.order_id.as_uuid()))
            .action_url(format!("/orders/{}/", parties.order_id))
            .context("item_title", parties.item_title.clone())
            .context("order_number", parties.order_number.clone()),
    )
}

/// Subscriber that notifies order parties as order events are stored.
///
/// Register it with the projection processor. A rebuild replays history,
/// so it would notify every past event again.
pub struct OrderNotifications<S: EventStore> {
    router: NotificationRouter,
    store: S,
    parties: RwLock<HashMap<AggregateId, OrderParties>>,
}

impl<S: EventStore> OrderNotifications<S> {
    /// `store` is read to find the parties of orders placed before this
    /// subscriber saw their creation.
    pub fn new(router: NotificationRouter, store: S) -> Self {
        Self {
            router,
            store,
            parties: RwLock::new(HashMap::new()),
        }
    }

    async fn parties(&self, order_id: AggregateId) -> projections::Result<Option<OrderParties>> {
        if let Some(parties) = self.parties.read().await.get(&order_id) {
            return Ok(Some(parties.clone()));
        }

        let events = self.store.get_events_for_aggregate(order_id).await?;
        let created = events
            .first()
            .map(order_event)
            .transpose()?
            .flatten()
            .and_then(|event| match event {
                OrderEvent::OrderCreated(data) => Some(OrderParties::from_created(&data)),
                _ => None,
            });
        if let Some(parties) = &created {
            self.parties
                .write()
                .await
                .insert(order_id, parties.clone());
        }
        Ok(created)
    }
}

fn closes_order(event: &OrderEvent) -> bool {
    matches!(
        event,
        OrderEvent::OrderRejected(_) | OrderEvent::OrderCompleted(_) | OrderEvent::OrderCancelled(_)
    )
}

#[async_trait]
impl<S> Projection for OrderNotifications<S>
where
    S: EventStore + 'static,
{
    fn name(&self) -> &'static str {
        "OrderNotifications"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> projections::Result<()> {
        let Some(event) = order_event(envelope)? else {
            return Ok(());
        };

        let parties = if let OrderEvent::OrderCreated(data) = &event {
            let parties = OrderParties::from_created(data);
            self.parties
                .write()
                .await
                .insert(parties.order_id, parties.clone());
            parties
        } else {
            match self.parties(envelope.aggregate_id).await? {
                Some(parties) => parties,
                None => {
                    tracing::warn!(
                        order_id = %envelope.aggregate_id,
                        event_type = event.event_type(),
                        "no creation event for order, not notifying"
                    );
                    return Ok(());
                }
            }
        };

        if let Some(request) = route_order_event(&event, &parties) {
            match self.router.notify(request).await {
                Ok(_) => {}
                Err(NotificationError::RecipientNotFound(user)) => {
                    tracing::warn!(%user, order_id = %parties.order_id, "recipient unknown, not notifying");
                }
                Err(e) => return Err(ProjectionError::Projection(e.to_string())),
            }
        }

        // later events on a closed order are rare; they reload from the store
        if closes_order(&event) {
            self.parties.write().await.remove(&parties.order_id);
        }
        Ok(())
    }

    async fn reset(&self) -> projections::Result<()> {
        self.parties.write().await.clear();
        Ok(())
    }
}
