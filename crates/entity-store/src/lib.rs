//! Relational entity store for the CRM.
//!
//! Provides the [`EntityStore`] trait with an in-memory implementation for
//! tests and local runs, and a PostgreSQL implementation backed by sqlx.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{CustomerId, OrderId, ProductId};
pub use error::{Result, StoreError, UniqueField};
pub use memory::InMemoryStore;
pub use model::{
    Customer, NewCustomer, NewOrder, NewProduct, Order, Product, order_total, timestamp_now,
};
pub use postgres::PostgresStore;
pub use query::{
    CustomerFilter, CustomerQuery, CustomerSortField, ListQuery, OrderFilter, OrderQuery,
    OrderSortField, ProductFilter, ProductQuery, ProductSortField, SortDirection, SortField,
    SortKey, UnknownSortField, parse_order_by,
};
pub use store::{EntityStore, EntityStoreExt};
