//! Host crate for the marketplace core.
//!
//! - [`Config`]: environment-driven settings for every component
//! - [`telemetry`]: tracing subscriber and Prometheus exporter setup
//! - [`Marketplace`]: the facade callers use; commands go through the order
//!   lifecycle or the payment ledger, then the subscribers (order board,
//!   order notifications) are brought up to date

pub mod config;
pub mod error;
pub mod marketplace;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use error::{MarketplaceError, Result};
pub use marketplace::{Collaborators, Marketplace};
