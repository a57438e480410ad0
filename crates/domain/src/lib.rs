//! Domain layer of the marketplace core.
//!
//! - [`Order`]: event-sourced aggregate holding the order, its payments and
//!   its audit trail
//! - [`OrderService`]: guarded, actor-checked order transitions
//! - [`PaymentLedger`]: payment initiation, staff verification and
//!   cancellation
//! - [`ItemCatalog`] and [`UserDirectory`]: ports to the surrounding
//!   marketplace

pub mod aggregate;
pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod order;
pub mod payment;
pub mod users;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use catalog::{CatalogItem, InMemoryItemCatalog, ItemCatalog, ItemId, ItemStatus};
pub use command::{CommandHandler, CommandResult};
pub use config::OrderConfig;
pub use error::{DomainError, ErrorKind};
pub use order::{
    AcceptOrder, AllowedActions, CancelOrder, CompleteOrder, DeliveryInfo, Money, Order,
    OrderAcceptedData, OrderCancelledData, OrderCompletedData, OrderCreatedData,
    OrderDetailsUpdatedData, OrderError, OrderEvent, OrderNumber, OrderRejectedData,
    OrderService, OrderStartedData, OrderStatus, PaymentCancelledData, PaymentInitiatedData,
    PaymentStatus, PaymentVerifiedData, PlaceOrder, RejectOrder, StartOrder, TrackingEntry,
    TrackingStatus, UpdateOrderDetails, UpdateOrderStatus,
};
pub use payment::{
    CancelPayment, InitiatePayment, Payment, PaymentId, PaymentLedger, PaymentResult,
    VerifyPayment,
};
pub use users::{InMemoryUserDirectory, Language, Role, UserDirectory, UserProfile};
