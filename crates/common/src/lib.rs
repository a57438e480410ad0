//! Shared identifier types used across the marketplace crates.

mod ids;

pub use ids::{AggregateId, UserId};

#[doc(hidden)]
pub use uuid as __uuid;
