//! Shared types for the CRM workspace.

pub mod types;

pub use types::{CustomerId, OrderId, ProductId};
