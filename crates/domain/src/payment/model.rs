use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::order::Money;

common::uuid_id!(
    /// One payment attempt against an order.
    PaymentId
);

/// A payment attempt, held by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: AggregateId,
    pub payer_id: UserId,
    pub payer_phone: String,
    pub amount: Money,
    /// External transfer reference, unique across all payments.
    pub reference_number: String,
    pub is_verified: bool,
    pub is_cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Counts against the one-payment-per-order limit.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled
    }

    /// Still waiting for staff to verify or the buyer to cancel.
    pub fn is_open(&self) -> bool {
        !self.is_cancelled && !self.is_verified
    }
}
