//! Order aggregate implementation.

use chrono::{DateTime, NaiveDate, Utc};
use common::{AggregateId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::catalog::{CatalogItem, ItemId, ItemStatus};
use crate::payment::{Payment, PaymentId};

use super::{
    DeliveryInfo, Money, OrderError, OrderEvent, OrderNumber, OrderStatus, PaymentStatus,
    PlaceOrder, TrackingEntry,
    events::{OrderCreatedData, PaymentInitiatedData},
};

/// Order aggregate root.
///
/// Holds the order, every payment attempt made against it and the audit
/// trail. Payments live in the order stream so that the one-active-payment
/// rule and the order status change under the same expected version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    order_number: Option<OrderNumber>,
    buyer_id: Option<UserId>,
    seller_id: Option<UserId>,
    item_id: Option<ItemId>,
    item_title: String,
    quantity: u32,
    unit_price: Money,
    total_price: Money,
    status: OrderStatus,
    payment_status: PaymentStatus,
    delivery: DeliveryInfo,
    buyer_notes: Option<String>,
    seller_notes: Option<String>,
    expected_delivery_date: Option<NaiveDate>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    payments: Vec<Payment>,
    tracking: Vec<TrackingEntry>,
}

/// What an actor may do with an order right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllowedActions {
    pub can_accept: bool,
    pub can_reject: bool,
    pub can_start: bool,
    pub can_complete: bool,
    pub can_cancel: bool,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        if let Some(entry) = TrackingEntry::for_event(&event) {
            self.tracking.push(entry);
        }
        self.updated_at = Some(event.occurred_at());

        match event {
            OrderEvent::OrderCreated(data) => self.apply_created(data),
            OrderEvent::OrderAccepted(data) => {
                self.status = OrderStatus::Accepted;
                self.accepted_at = Some(data.accepted_at);
            }
            OrderEvent::OrderRejected(_) => self.status = OrderStatus::Rejected,
            OrderEvent::OrderStarted(_) => self.status = OrderStatus::InProgress,
            OrderEvent::OrderCompleted(data) => {
                self.status = OrderStatus::Completed;
                self.completed_at = Some(data.completed_at);
            }
            OrderEvent::OrderCancelled(_) => self.status = OrderStatus::Cancelled,
            OrderEvent::OrderDetailsUpdated(data) => {
                if data.seller_notes.is_some() {
                    self.seller_notes = data.seller_notes;
                }
                if data.expected_delivery_date.is_some() {
                    self.expected_delivery_date = data.expected_delivery_date;
                }
            }
            OrderEvent::PaymentInitiated(data) => self.apply_payment_initiated(data),
            OrderEvent::PaymentVerified(data) => {
                if let Some(payment) = self.payment_mut(data.payment_id) {
                    payment.is_verified = true;
                    payment.verified_at = Some(data.verified_at);
                    payment.verified_by = Some(data.verified_by);
                }
                self.payment_status = PaymentStatus::Paid;
            }
            OrderEvent::PaymentCancelled(data) => {
                if let Some(payment) = self.payment_mut(data.payment_id) {
                    payment.is_cancelled = true;
                    payment.cancelled_at = Some(data.cancelled_at);
                }
                self.payment_status = PaymentStatus::Unpaid;
            }
        }
    }
}

impl SnapshotCapable for Order {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Order {
    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn buyer_id(&self) -> Option<UserId> {
        self.buyer_id
    }

    pub fn seller_id(&self) -> Option<UserId> {
        self.seller_id
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn item_title(&self) -> &str {
        &self.item_title
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn delivery(&self) -> &DeliveryInfo {
        &self.delivery
    }

    pub fn buyer_notes(&self) -> Option<&str> {
        self.buyer_notes.as_deref()
    }

    pub fn seller_notes(&self) -> Option<&str> {
        self.seller_notes.as_deref()
    }

    pub fn expected_delivery_date(&self) -> Option<NaiveDate> {
        self.expected_delivery_date
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == id)
    }

    /// The non-cancelled payment, if any.
    pub fn active_payment(&self) -> Option<&Payment> {
        self.payments.iter().find(|p| p.is_active())
    }

    pub fn tracking(&self) -> &[TrackingEntry] {
        &self.tracking
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_buyer(&self, user: UserId) -> bool {
        self.buyer_id == Some(user)
    }

    pub fn is_seller(&self, user: UserId) -> bool {
        self.seller_id == Some(user)
    }

    /// Evaluates every transition for `actor` without deciding anything.
    pub fn allowed_actions(&self, actor: UserId) -> AllowedActions {
        AllowedActions {
            can_accept: self.accept(actor).is_ok(),
            can_reject: self.reject(actor).is_ok(),
            can_start: self.start(actor).is_ok(),
            can_complete: self.complete(actor, false).is_ok(),
            can_cancel: self.cancel(actor).is_ok(),
        }
    }
}

// Order decisions (return events)
impl Order {
    /// Checks a placement against the listed item without needing an
    /// order number.
    pub fn validate_placement(cmd: &PlaceOrder, item: &CatalogItem) -> Result<(), OrderError> {
        if cmd.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: cmd.quantity,
            });
        }
        if item.status != ItemStatus::Available {
            return Err(OrderError::ItemUnavailable {
                status: item.status,
            });
        }
        if cmd.quantity > item.quantity {
            return Err(OrderError::InsufficientQuantity {
                requested: cmd.quantity,
                available: item.quantity,
            });
        }
        if cmd.buyer_id == item.owner_id {
            return Err(OrderError::OwnItem);
        }
        if !item.price.is_positive() {
            return Err(OrderError::InvalidPrice { price: item.price });
        }
        if item.price.checked_multiply(cmd.quantity).is_none() {
            return Err(OrderError::TotalOverflow {
                unit_price: item.price,
                quantity: cmd.quantity,
            });
        }
        if cmd.delivery.address.trim().is_empty() {
            return Err(OrderError::MissingField("delivery address"));
        }
        if cmd.delivery.phone.trim().is_empty() {
            return Err(OrderError::MissingField("delivery phone"));
        }
        Ok(())
    }

    /// Places a new order, snapshotting the item's title and price.
    pub fn place(
        &self,
        order_id: AggregateId,
        order_number: OrderNumber,
        cmd: &PlaceOrder,
        item: &CatalogItem,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        Self::validate_placement(cmd, item)?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            order_number,
            buyer_id: cmd.buyer_id,
            seller_id: item.owner_id,
            item_id: item.id,
            item_title: item.title.clone(),
            quantity: cmd.quantity,
            unit_price: item.price,
            total_price: item.price.multiply(cmd.quantity),
            delivery: cmd.delivery.clone(),
            buyer_notes: cmd.buyer_notes.clone(),
            created_at: Utc::now(),
        })])
    }

    pub fn accept(&self, actor: UserId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_seller(actor, "accept")?;
        self.ensure_transition(OrderStatus::Accepted, "accept")?;
        Ok(vec![OrderEvent::order_accepted(actor)])
    }

    pub fn reject(&self, actor: UserId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_seller(actor, "reject")?;
        self.ensure_transition(OrderStatus::Rejected, "reject")?;
        Ok(vec![OrderEvent::order_rejected(actor)])
    }

    pub fn start(&self, actor: UserId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_seller(actor, "start")?;
        self.ensure_transition(OrderStatus::InProgress, "start")?;
        Ok(vec![OrderEvent::order_started(actor)])
    }

    /// `item_sold_out` records whether this order takes the item's whole
    /// remaining quantity.
    pub fn complete(
        &self,
        actor: UserId,
        item_sold_out: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_seller(actor, "complete")?;
        self.ensure_transition(OrderStatus::Completed, "complete")?;
        Ok(vec![OrderEvent::order_completed(actor, item_sold_out, None)])
    }

    /// Buyer-side cancellation, allowed until the seller starts work.
    pub fn cancel(&self, actor: UserId) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.is_buyer(actor) {
            return Err(OrderError::NotBuyer { action: "cancel" });
        }
        if self.status == OrderStatus::InProgress {
            return Err(self.invalid("cancel"));
        }
        self.ensure_transition(OrderStatus::Cancelled, "cancel")?;
        Ok(vec![OrderEvent::order_cancelled(actor)])
    }

    /// Seller-side move to any status the table allows from the current one.
    pub fn transition_to(
        &self,
        actor: UserId,
        target: OrderStatus,
        item_sold_out: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_seller(actor, "update status")?;
        self.ensure_transition(target, "update status")?;

        let event = match target {
            OrderStatus::Accepted => OrderEvent::order_accepted(actor),
            OrderStatus::Rejected => OrderEvent::order_rejected(actor),
            OrderStatus::InProgress => OrderEvent::order_started(actor),
            OrderStatus::Completed => OrderEvent::order_completed(actor, item_sold_out, None),
            OrderStatus::Cancelled => OrderEvent::order_cancelled(actor),
            OrderStatus::Pending => return Err(self.invalid("update status")),
        };
        Ok(vec![event])
    }

    pub fn update_details(
        &self,
        actor: UserId,
        seller_notes: Option<String>,
        expected_delivery_date: Option<NaiveDate>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_seller(actor, "update details")?;
        if self.is_terminal() {
            return Err(self.invalid("update details"));
        }
        if seller_notes.is_none() && expected_delivery_date.is_none() {
            return Ok(vec![]);
        }
        Ok(vec![OrderEvent::details_updated(
            actor,
            seller_notes,
            expected_delivery_date,
        )])
    }
}

// Payment decisions
impl Order {
    pub fn initiate_payment(
        &self,
        payment_id: PaymentId,
        payer: UserId,
        payer_phone: &str,
        amount: Money,
        reference_number: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.is_buyer(payer) {
            return Err(OrderError::NotBuyer {
                action: "initiate a payment",
            });
        }
        if !amount.is_positive() {
            return Err(OrderError::InvalidPaymentAmount { amount });
        }
        if reference_number.trim().is_empty() {
            return Err(OrderError::MissingField("reference number"));
        }
        if payer_phone.trim().is_empty() {
            return Err(OrderError::MissingField("payer phone"));
        }
        if matches!(self.status, OrderStatus::Rejected | OrderStatus::Cancelled) {
            return Err(self.invalid("initiate a payment"));
        }
        if self.active_payment().is_some() {
            return Err(OrderError::ActivePaymentExists);
        }

        Ok(vec![OrderEvent::PaymentInitiated(PaymentInitiatedData {
            payment_id,
            payer_id: payer,
            payer_phone: payer_phone.trim().to_string(),
            amount,
            reference_number: reference_number.trim().to_string(),
            initiated_at: Utc::now(),
        })])
    }

    /// Staff confirmation of a payment. The caller checks the staff role.
    ///
    /// Verifying an already verified or cancelled payment decides nothing.
    /// Otherwise the order is paid and, unless already terminal, completed.
    pub fn verify_payment(
        &self,
        payment_id: PaymentId,
        staff: UserId,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        let payment = self
            .payment(payment_id)
            .ok_or(OrderError::PaymentNotFound(payment_id))?;
        if !payment.is_open() {
            return Ok(vec![]);
        }

        let marks_item_sold = !matches!(
            self.status,
            OrderStatus::Rejected | OrderStatus::Cancelled
        );
        let mut events = vec![OrderEvent::payment_verified(
            payment_id,
            staff,
            marks_item_sold,
        )];
        if !self.is_terminal() {
            events.push(OrderEvent::order_completed(staff, false, Some(payment_id)));
        }
        Ok(events)
    }

    /// Withdraws the payment awaiting verification.
    pub fn cancel_payment(
        &self,
        actor: UserId,
        actor_is_staff: bool,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_created()?;
        if !self.is_buyer(actor) && !actor_is_staff {
            return Err(OrderError::NotBuyerOrStaff {
                action: "cancel a payment",
            });
        }
        if self.payment_status != PaymentStatus::Verifying {
            return Err(OrderError::PaymentNotVerifying {
                payment_status: self.payment_status,
            });
        }
        let payment = self
            .payments
            .iter()
            .find(|p| p.is_open())
            .ok_or(OrderError::NoActivePayment)?;

        Ok(vec![OrderEvent::payment_cancelled(payment.id, actor)])
    }
}

// Guards and apply helpers
impl Order {
    fn ensure_created(&self) -> Result<(), OrderError> {
        self.id.map(|_| ()).ok_or(OrderError::NotCreated)
    }

    fn ensure_seller(&self, actor: UserId, action: &'static str) -> Result<(), OrderError> {
        self.ensure_created()?;
        if self.is_seller(actor) {
            Ok(())
        } else {
            Err(OrderError::NotSeller { action })
        }
    }

    fn ensure_transition(
        &self,
        target: OrderStatus,
        action: &'static str,
    ) -> Result<(), OrderError> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> OrderError {
        OrderError::InvalidStateTransition {
            current_state: self.status,
            action,
        }
    }

    fn payment_mut(&mut self, id: PaymentId) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|p| p.id == id)
    }

    fn apply_created(&mut self, data: OrderCreatedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.buyer_id = Some(data.buyer_id);
        self.seller_id = Some(data.seller_id);
        self.item_id = Some(data.item_id);
        self.item_title = data.item_title;
        self.quantity = data.quantity;
        self.unit_price = data.unit_price;
        self.total_price = data.unit_price.multiply(data.quantity);
        self.status = OrderStatus::Pending;
        self.payment_status = PaymentStatus::Pending;
        self.delivery = data.delivery;
        self.buyer_notes = data.buyer_notes;
        self.created_at = Some(data.created_at);
    }

    fn apply_payment_initiated(&mut self, data: PaymentInitiatedData) {
        let Some(order_id) = self.id else { return };
        self.payments.push(Payment {
            id: data.payment_id,
            order_id,
            payer_id: data.payer_id,
            payer_phone: data.payer_phone,
            amount: data.amount,
            reference_number: data.reference_number,
            is_verified: false,
            is_cancelled: false,
            created_at: data.initiated_at,
            verified_at: None,
            verified_by: None,
            cancelled_at: None,
        });
        self.payment_status = PaymentStatus::Verifying;
    }
}
