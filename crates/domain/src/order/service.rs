//! Order service: the seller/buyer facing order lifecycle.

use std::sync::Arc;

use common::{AggregateId, UserId};
use event_store::{EventStore, KeyRegistry};
use metrics::counter;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::catalog::ItemCatalog;
use crate::command::{CommandHandler, CommandResult};
use crate::config::OrderConfig;
use crate::error::DomainError;
use crate::users::UserDirectory;

use super::{
    AcceptOrder, AllowedActions, CancelOrder, CompleteOrder, ORDER_NUMBER_NAMESPACE, Order,
    OrderEvent, OrderNumber, OrderStatus, PlaceOrder, RejectOrder, StartOrder, UpdateOrderDetails,
    UpdateOrderStatus,
};

type OrderNumberSource = Arc<dyn Fn() -> OrderNumber + Send + Sync>;

/// Service for managing marketplace orders.
///
/// Wraps the command handler with the collaborators a transition needs:
/// the item catalog, the user directory and the unique-key registry used
/// for order numbers.
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
    catalog: Arc<dyn ItemCatalog>,
    users: Arc<dyn UserDirectory>,
    keys: Arc<dyn KeyRegistry>,
    config: OrderConfig,
    order_numbers: OrderNumberSource,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(
        store: S,
        catalog: Arc<dyn ItemCatalog>,
        users: Arc<dyn UserDirectory>,
        keys: Arc<dyn KeyRegistry>,
    ) -> Self {
        Self::with_config(store, catalog, users, keys, OrderConfig::default())
    }

    pub fn with_config(
        store: S,
        catalog: Arc<dyn ItemCatalog>,
        users: Arc<dyn UserDirectory>,
        keys: Arc<dyn KeyRegistry>,
        config: OrderConfig,
    ) -> Self {
        Self {
            handler: CommandHandler::new(store).with_max_attempts(config.max_command_attempts),
            catalog,
            users,
            keys,
            config,
            order_numbers: Arc::new(OrderNumber::generate),
        }
    }

    /// Replaces the order number generator.
    pub fn with_order_number_source(
        mut self,
        source: impl Fn() -> OrderNumber + Send + Sync + 'static,
    ) -> Self {
        self.order_numbers = Arc::new(source);
        self
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Places an order for a listed item.
    #[tracing::instrument(skip(self, cmd), fields(buyer_id = %cmd.buyer_id, item_id = %cmd.item_id))]
    pub async fn create_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        let item = self
            .catalog
            .get_item(cmd.item_id)
            .await?
            .ok_or(DomainError::ItemNotFound(cmd.item_id))?;
        Order::validate_placement(&cmd, &item)?;

        let order_number = self.claim_order_number().await?;
        let order_id = AggregateId::new();

        let result = self
            .handler
            .execute_with_snapshot(order_id, |order| {
                order.place(order_id, order_number.clone(), &cmd, &item)
            })
            .await;

        match result {
            Ok(result) => {
                tracing::info!(%order_id, %order_number, "order placed");
                record_transitions(&result.events);
                Ok(result)
            }
            Err(e) => {
                if let Err(release) = self
                    .keys
                    .release(ORDER_NUMBER_NAMESPACE, order_number.as_str())
                    .await
                {
                    tracing::warn!(%order_number, error = %release, "failed to release order number");
                }
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn accept(&self, cmd: AcceptOrder) -> Result<CommandResult<Order>, DomainError> {
        self.run(cmd.order_id, |order| order.accept(cmd.actor_id))
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn reject(&self, cmd: RejectOrder) -> Result<CommandResult<Order>, DomainError> {
        self.run(cmd.order_id, |order| order.reject(cmd.actor_id))
            .await
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn start_progress(
        &self,
        cmd: StartOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(cmd.order_id, |order| order.start(cmd.actor_id))
            .await
    }

    /// Completes an order, marking the item sold when this order takes its
    /// whole remaining quantity.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn complete(&self, cmd: CompleteOrder) -> Result<CommandResult<Order>, DomainError> {
        let sold_out = self.item_sold_out(cmd.order_id).await?;
        let result = self
            .run(cmd.order_id, |order| order.complete(cmd.actor_id, sold_out))
            .await?;
        apply_completion_effects(self.catalog.as_ref(), self.users.as_ref(), &result).await;
        Ok(result)
    }

    /// Buyer cancellation.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        self.run(cmd.order_id, |order| order.cancel(cmd.actor_id))
            .await
    }

    /// Seller-side status update to any reachable status.
    #[tracing::instrument(
        skip(self),
        fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id, target_status = %cmd.target)
    )]
    pub async fn update_status(
        &self,
        cmd: UpdateOrderStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let sold_out = if cmd.target == OrderStatus::Completed {
            self.item_sold_out(cmd.order_id).await?
        } else {
            false
        };

        let result = self
            .run(cmd.order_id, |order| {
                order.transition_to(cmd.actor_id, cmd.target, sold_out)
            })
            .await?;
        apply_completion_effects(self.catalog.as_ref(), self.users.as_ref(), &result).await;
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn update_details(
        &self,
        cmd: UpdateOrderDetails,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(cmd.order_id, |order| {
            order.update_details(
                cmd.actor_id,
                cmd.seller_notes.clone(),
                cmd.expected_delivery_date,
            )
        })
        .await
    }

    /// Loads an order by ID. Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    pub async fn allowed_actions(
        &self,
        order_id: AggregateId,
        actor: UserId,
    ) -> Result<AllowedActions, DomainError> {
        let order = self.require(order_id).await?;
        Ok(order.allowed_actions(actor))
    }

    async fn require(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.handler
            .load_existing(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Runs a decision against an existing order.
    async fn run<F>(
        &self,
        order_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult<Order>, DomainError>
    where
        F: Fn(&Order) -> Result<Vec<OrderEvent>, super::OrderError>,
    {
        let result = self
            .handler
            .execute_with_snapshot(order_id, |order| {
                if order.id().is_none() {
                    return Err(super::OrderError::NotCreated);
                }
                decide(order)
            })
            .await
            .map_err(|e| match e {
                DomainError::Order(super::OrderError::NotCreated) => {
                    DomainError::OrderNotFound(order_id)
                }
                other => other,
            })?;

        record_transitions(&result.events);
        Ok(result)
    }

    async fn item_sold_out(&self, order_id: AggregateId) -> Result<bool, DomainError> {
        let order = self.require(order_id).await?;
        let Some(item_id) = order.item_id() else {
            return Ok(false);
        };
        let item = self.catalog.get_item(item_id).await?;
        Ok(item.is_some_and(|item| order.quantity() >= item.quantity))
    }

    async fn claim_order_number(&self) -> Result<OrderNumber, DomainError> {
        let attempts = self.config.order_number_attempts.max(1);
        for attempt in 1..=attempts {
            let candidate = (self.order_numbers)();
            if self
                .keys
                .claim(ORDER_NUMBER_NAMESPACE, candidate.as_str())
                .await?
            {
                return Ok(candidate);
            }
            tracing::debug!(%candidate, attempt, "order number taken");
        }
        Err(DomainError::OrderNumberExhausted { attempts })
    }
}

fn record_transitions(events: &[OrderEvent]) {
    for event in events {
        counter!("orders_transitions_total", "event" => event.event_type()).increment(1);
    }
}

/// Applies catalog and user-directory side effects of freshly persisted
/// events. Failures are logged and counted; the events stay committed.
pub(crate) async fn apply_completion_effects(
    catalog: &dyn ItemCatalog,
    users: &dyn UserDirectory,
    result: &CommandResult<Order>,
) {
    let order = &result.aggregate;
    for event in &result.events {
        let (mark_sold, count_buyer) = match event {
            OrderEvent::OrderCompleted(data) => (data.item_sold_out, data.payment_id.is_none()),
            OrderEvent::PaymentVerified(data) => (data.marks_item_sold, false),
            _ => continue,
        };

        if mark_sold
            && let Some(item_id) = order.item_id()
            && let Err(e) = catalog.mark_sold(item_id).await
        {
            tracing::error!(%item_id, error = %e, "failed to mark item sold");
            counter!("orders_side_effect_failures_total", "effect" => "mark_sold").increment(1);
        }

        if count_buyer
            && let Some(buyer_id) = order.buyer_id()
            && let Err(e) = users.increment_order_count(buyer_id).await
        {
            tracing::error!(%buyer_id, error = %e, "failed to increment buyer order count");
            counter!("orders_side_effect_failures_total", "effect" => "order_count").increment(1);
        }
    }
}
