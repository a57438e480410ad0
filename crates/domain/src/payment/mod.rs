//! Payment attempts and the ledger that records them.

mod ledger;
mod model;

pub use ledger::{CancelPayment, InitiatePayment, PaymentLedger, PaymentResult, VerifyPayment};
pub use model::{Payment, PaymentId};

/// Key registry namespace for payment reference numbers.
pub const PAYMENT_REFERENCE_NAMESPACE: &str = "payment_reference";
