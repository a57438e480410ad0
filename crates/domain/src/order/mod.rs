//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod tracking;
mod value_objects;

pub use aggregate::{AllowedActions, Order};
pub use commands::*;
pub use events::{
    OrderAcceptedData, OrderCancelledData, OrderCompletedData, OrderCreatedData,
    OrderDetailsUpdatedData, OrderEvent, OrderRejectedData, OrderStartedData,
    PaymentCancelledData, PaymentInitiatedData, PaymentVerifiedData,
};
pub use service::OrderService;
pub(crate) use service::apply_completion_effects;
pub use state::{OrderStatus, PaymentStatus};
pub use tracking::{TrackingEntry, TrackingStatus};
pub use value_objects::{DeliveryInfo, Money, OrderNumber};

use thiserror::Error;

use crate::catalog::ItemStatus;
use crate::error::ErrorKind;
use crate::payment::PaymentId;

/// Key registry namespace for order numbers.
pub const ORDER_NUMBER_NAMESPACE: &str = "order_number";

/// Reasons an order decision is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order already created")]
    AlreadyCreated,

    #[error("Order does not exist")]
    NotCreated,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Item is not available (status {status})")]
    ItemUnavailable { status: ItemStatus },

    #[error("Requested {requested} but only {available} available")]
    InsufficientQuantity { requested: u32, available: u32 },

    #[error("Buyers cannot order their own item")]
    OwnItem,

    #[error("Invalid item price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    #[error("Order total overflows for {quantity} x {unit_price}")]
    TotalOverflow { unit_price: Money, quantity: u32 },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Only the seller can {action}")]
    NotSeller { action: &'static str },

    #[error("Only the buyer can {action}")]
    NotBuyer { action: &'static str },

    #[error("Only the buyer or staff can {action}")]
    NotBuyerOrStaff { action: &'static str },

    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    #[error("Invalid payment amount: {amount} (must be greater than 0)")]
    InvalidPaymentAmount { amount: Money },

    #[error("Order already has an active payment")]
    ActivePaymentExists,

    #[error("Payment status is {payment_status}, expected verifying")]
    PaymentNotVerifying { payment_status: PaymentStatus },

    #[error("Order has no active payment")]
    NoActivePayment,

    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::InvalidQuantity { .. }
            | OrderError::ItemUnavailable { .. }
            | OrderError::InsufficientQuantity { .. }
            | OrderError::OwnItem
            | OrderError::InvalidPrice { .. }
            | OrderError::TotalOverflow { .. }
            | OrderError::MissingField(_)
            | OrderError::InvalidPaymentAmount { .. } => ErrorKind::Validation,
            OrderError::NotSeller { .. }
            | OrderError::NotBuyer { .. }
            | OrderError::NotBuyerOrStaff { .. } => ErrorKind::Permission,
            OrderError::InvalidStateTransition { .. } | OrderError::PaymentNotVerifying { .. } => {
                ErrorKind::InvalidState
            }
            OrderError::AlreadyCreated | OrderError::ActivePaymentExists => ErrorKind::Conflict,
            OrderError::NotCreated
            | OrderError::NoActivePayment
            | OrderError::PaymentNotFound(_) => ErrorKind::NotFound,
        }
    }
}
