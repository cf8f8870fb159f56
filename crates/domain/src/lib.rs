//! Domain layer for the CRM data API.
//!
//! This crate provides:
//! - Input validation for customers and products
//! - The mutation service (customer, bulk customer, product, and order creates)
//! - The query service (lookups, filtered listings, cursor pagination)

pub mod error;
pub mod mutation;
pub mod query;
pub mod validation;

pub use error::DomainError;
pub use mutation::{
    BulkOutcome, CUSTOMER_CREATED_MESSAGE, CustomerOutcome, MutationService, ORDER_TOTAL_LIMIT,
};
pub use query::{
    DEFAULT_PAGE_SIZE, Edge, HELLO, MAX_PAGE_SIZE, Page, PageInfo, PageRequest, QueryService,
    decode_cursor, encode_cursor,
};
pub use validation::{CustomerInput, ProductInput};
