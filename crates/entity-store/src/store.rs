use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId};

use crate::{
    Customer, CustomerQuery, NewCustomer, NewOrder, NewProduct, Order, OrderQuery, Product,
    ProductQuery, Result, StoreError,
};

/// Core trait for entity store implementations.
///
/// The store owns identifier and timestamp assignment, uniqueness, and
/// referential integrity. All implementations must be thread-safe
/// (Send + Sync).
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Inserts a customer.
    ///
    /// Fails with `DuplicateKey` if the email is already registered; an
    /// existing row is never overwritten.
    async fn insert_customer(&self, customer: NewCustomer) -> Result<Customer>;

    /// Inserts a product.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    /// Inserts an order together with its product association and total.
    ///
    /// The write is atomic: either the order, every association row, and the
    /// total are persisted, or nothing is. Fails with `MissingReference` if
    /// the customer or any product no longer exists.
    async fn insert_order(&self, order: NewOrder) -> Result<Order>;

    /// Retrieves a customer by ID.
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    /// Retrieves a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Retrieves every product whose ID is in `ids`.
    ///
    /// Missing IDs are skipped; the result order is unspecified.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Retrieves an order by ID.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists customers matching a query.
    async fn list_customers(&self, query: &CustomerQuery) -> Result<Vec<Customer>>;

    /// Lists products matching a query.
    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>>;

    /// Lists orders matching a query.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Returns the number of stored customers.
    async fn count_customers(&self) -> Result<u64>;

    /// Returns the number of stored products.
    async fn count_products(&self) -> Result<u64>;

    /// Returns the number of stored orders.
    async fn count_orders(&self) -> Result<u64>;
}

/// Extension trait providing convenience methods for entity stores.
#[async_trait]
pub trait EntityStoreExt: EntityStore {
    /// Loads a customer, treating absence as an error.
    async fn require_customer(&self, id: CustomerId) -> Result<Customer> {
        self.get_customer(id)
            .await?
            .ok_or_else(|| StoreError::MissingReference {
                entity: "Customer",
                id: id.to_string(),
            })
    }
}

// Blanket implementation for all EntityStore implementations
impl<T: EntityStore + ?Sized> EntityStoreExt for T {}
