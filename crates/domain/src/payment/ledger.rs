//! Payment ledger: buyer payment submissions and staff verification.

use std::sync::Arc;

use common::{AggregateId, UserId};
use event_store::{EventStore, KeyRegistry};
use metrics::counter;

use crate::aggregate::Aggregate;
use crate::catalog::ItemCatalog;
use crate::command::{CommandHandler, CommandResult};
use crate::config::OrderConfig;
use crate::error::DomainError;
use crate::order::{Money, Order, OrderError, OrderEvent, apply_completion_effects};
use crate::users::UserDirectory;

use super::{PAYMENT_REFERENCE_NAMESPACE, Payment, PaymentId};

/// Buyer submits a transfer for staff to check.
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub order_id: AggregateId,
    pub payer_id: UserId,
    pub payer_phone: String,
    pub amount: Money,
    pub reference_number: String,
}

impl InitiatePayment {
    pub fn new(
        order_id: AggregateId,
        payer_id: UserId,
        payer_phone: impl Into<String>,
        amount: Money,
        reference_number: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            payer_id,
            payer_phone: payer_phone.into(),
            amount,
            reference_number: reference_number.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyPayment {
    pub order_id: AggregateId,
    pub payment_id: PaymentId,
    pub staff_id: UserId,
}

impl VerifyPayment {
    pub fn new(order_id: AggregateId, payment_id: PaymentId, staff_id: UserId) -> Self {
        Self {
            order_id,
            payment_id,
            staff_id,
        }
    }
}

/// Cancels the order's payment that is awaiting verification.
#[derive(Debug, Clone, Copy)]
pub struct CancelPayment {
    pub order_id: AggregateId,
    pub actor_id: UserId,
}

impl CancelPayment {
    pub fn new(order_id: AggregateId, actor_id: UserId) -> Self {
        Self { order_id, actor_id }
    }
}

/// Outcome of a payment command.
#[derive(Debug)]
pub struct PaymentResult {
    pub payment: Payment,
    pub order: Order,
    /// Empty when the command was a no-op.
    pub events: Vec<OrderEvent>,
}

/// Records payments against orders.
///
/// Payments are events on the order stream, so each command shares the
/// order's optimistic concurrency check.
pub struct PaymentLedger<S: EventStore> {
    handler: CommandHandler<S, Order>,
    catalog: Arc<dyn ItemCatalog>,
    users: Arc<dyn UserDirectory>,
    keys: Arc<dyn KeyRegistry>,
}

impl<S: EventStore> PaymentLedger<S> {
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
        }
    }

    #[tracing::instrument(
        skip(self, cmd),
        fields(order_id = %cmd.order_id, payer_id = %cmd.payer_id, amount = %cmd.amount)
    )]
    pub async fn initiate(&self, cmd: InitiatePayment) -> Result<PaymentResult, DomainError> {
        let payment_id = PaymentId::new();
        let decide = |order: &Order| {
            if order.id().is_none() {
                return Err(OrderError::NotCreated);
            }
            order.initiate_payment(
                payment_id,
                cmd.payer_id,
                &cmd.payer_phone,
                cmd.amount,
                &cmd.reference_number,
            )
        };

        // Surface validation errors before the reference is claimed.
        let current = self.require(cmd.order_id).await?;
        decide(&current)?;

        let reference = cmd.reference_number.trim();
        if !self.keys.claim(PAYMENT_REFERENCE_NAMESPACE, reference).await? {
            return Err(DomainError::ReferenceInUse(reference.to_string()));
        }

        let result = match self.execute(cmd.order_id, decide).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(release) = self.keys.release(PAYMENT_REFERENCE_NAMESPACE, reference).await
                {
                    tracing::warn!(reference, error = %release, "failed to release payment reference");
                }
                return Err(e);
            }
        };

        counter!("payments_initiated_total").increment(1);
        tracing::info!(%payment_id, "payment submitted for verification");
        into_payment_result(result, payment_id)
    }

    /// Staff verification. Verifying a payment that is already verified or
    /// cancelled returns it unchanged.
    #[tracing::instrument(
        skip(self),
        fields(order_id = %cmd.order_id, payment_id = %cmd.payment_id, staff_id = %cmd.staff_id)
    )]
    pub async fn verify(&self, cmd: VerifyPayment) -> Result<PaymentResult, DomainError> {
        if !self.is_staff(cmd.staff_id).await? {
            return Err(DomainError::PermissionDenied(
                "only staff can verify payments".to_string(),
            ));
        }

        let result = self
            .execute(cmd.order_id, |order| {
                order.verify_payment(cmd.payment_id, cmd.staff_id)
            })
            .await?;

        if result.events.is_empty() {
            tracing::debug!("payment already settled, nothing to verify");
        } else {
            counter!("payments_verified_total").increment(1);
            apply_completion_effects(self.catalog.as_ref(), self.users.as_ref(), &result).await;
        }

        into_payment_result(result, cmd.payment_id)
    }

    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, actor_id = %cmd.actor_id))]
    pub async fn cancel(&self, cmd: CancelPayment) -> Result<PaymentResult, DomainError> {
        let actor_is_staff = self.is_staff(cmd.actor_id).await?;

        let result = self
            .execute(cmd.order_id, |order| {
                order.cancel_payment(cmd.actor_id, actor_is_staff)
            })
            .await?;

        let payment_id = result
            .events
            .iter()
            .find_map(|event| match event {
                OrderEvent::PaymentCancelled(data) => Some(data.payment_id),
                _ => None,
            })
            .ok_or(OrderError::NoActivePayment)?;

        counter!("payments_cancelled_total").increment(1);
        into_payment_result(result, payment_id)
    }

    /// Every payment attempt recorded for an order, oldest first.
    pub async fn payments(&self, order_id: AggregateId) -> Result<Vec<Payment>, DomainError> {
        let order = self.require(order_id).await?;
        Ok(order.payments().to_vec())
    }

    async fn require(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.handler
            .load_existing(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    async fn is_staff(&self, user: UserId) -> Result<bool, DomainError> {
        Ok(self
            .users
            .get_user(user)
            .await?
            .is_some_and(|profile| profile.is_staff()))
    }

    async fn execute<F>(
        &self,
        order_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult<Order>, DomainError>
    where
        F: Fn(&Order) -> Result<Vec<OrderEvent>, OrderError>,
    {
        self.handler
            .execute_with_snapshot(order_id, |order| {
                if order.id().is_none() {
                    return Err(OrderError::NotCreated);
                }
                decide(order)
            })
            .await
            .map_err(|e| match e {
                DomainError::Order(OrderError::NotCreated) => DomainError::OrderNotFound(order_id),
                other => other,
            })
    }
}

fn into_payment_result(
    result: CommandResult<Order>,
    payment_id: PaymentId,
) -> Result<PaymentResult, DomainError> {
    let payment = result
        .aggregate
        .payment(payment_id)
        .cloned()
        .ok_or(OrderError::PaymentNotFound(payment_id))?;

    Ok(PaymentResult {
        payment,
        order: result.aggregate,
        events: result.events,
    })
}
