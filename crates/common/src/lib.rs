//! Shared identifiers and pagination types used across the fulfillment crates.

pub mod pagination;
pub mod types;

pub use pagination::{Page, PageLimits, PageRequest};
pub use types::OrderId;
