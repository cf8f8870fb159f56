use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::{
    Customer, CustomerQuery, NewCustomer, NewOrder, NewProduct, Order, OrderQuery, Product,
    ProductQuery, Result, SortKey, StoreError, UniqueField,
    query::{SortField, compare_records},
    store::EntityStore,
    timestamp_now,
};

/// Order row as stored: references only, resolved on read.
#[derive(Debug, Clone)]
struct OrderRow {
    id: OrderId,
    customer_id: CustomerId,
    product_ids: Vec<ProductId>,
    order_date: DateTime<Utc>,
    total_amount: Decimal,
}

#[derive(Default)]
struct Tables {
    customers: HashMap<CustomerId, Customer>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, OrderRow>,
}

impl Tables {
    fn resolve(&self, row: &OrderRow) -> Option<Order> {
        let customer = self.customers.get(&row.customer_id)?.clone();
        let products = row
            .product_ids
            .iter()
            .filter_map(|id| self.products.get(id).cloned())
            .collect();

        Some(Order {
            id: row.id,
            customer,
            products,
            order_date: row.order_date,
            total_amount: row.total_amount,
        })
    }
}

/// In-memory entity store implementation for testing and local runs.
///
/// All tables sit behind one lock, so every write is atomic with respect to
/// concurrent readers. Provides the same interface as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }
}

fn window<F: SortField>(
    mut rows: Vec<F::Record>,
    order: &[SortKey<F>],
    offset: usize,
    limit: Option<usize>,
) -> Vec<F::Record> {
    rows.sort_by(|a, b| compare_records(order, a, b));
    let rows = rows.into_iter().skip(offset);
    match limit {
        Some(limit) => rows.take(limit).collect(),
        None => rows.collect(),
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn insert_customer(&self, customer: NewCustomer) -> Result<Customer> {
        let mut tables = self.tables.write().await;

        if tables.customers.values().any(|c| c.email == customer.email) {
            return Err(StoreError::DuplicateKey {
                field: UniqueField::Email,
                value: customer.email,
            });
        }

        let record = Customer {
            id: CustomerId::new(),
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
            created_at: timestamp_now(),
        };
        tables.customers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        let record = Product {
            id: ProductId::new(),
            name: product.name,
            price: product.price,
            stock: product.stock,
            created_at: timestamp_now(),
        };
        self.tables
            .write()
            .await
            .products
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        let mut tables = self.tables.write().await;

        // Referential checks happen under the same lock as the insert
        let customer_id = order.customer_id();
        if !tables.customers.contains_key(&customer_id) {
            return Err(StoreError::MissingReference {
                entity: "Customer",
                id: customer_id.to_string(),
            });
        }
        if let Some(missing) = order
            .product_ids()
            .into_iter()
            .find(|id| !tables.products.contains_key(id))
        {
            return Err(StoreError::MissingReference {
                entity: "Product",
                id: missing.to_string(),
            });
        }

        let row = OrderRow {
            id: OrderId::new(),
            customer_id,
            product_ids: order.product_ids(),
            order_date: timestamp_now(),
            total_amount: order.total_amount(),
        };
        let stored = tables
            .resolve(&row)
            .ok_or_else(|| StoreError::MissingReference {
                entity: "Customer",
                id: customer_id.to_string(),
            })?;
        tables.orders.insert(row.id, row);

        Ok(stored)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&id).and_then(|row| tables.resolve(row)))
    }

    async fn list_customers(&self, query: &CustomerQuery) -> Result<Vec<Customer>> {
        let tables = self.tables.read().await;
        let rows: Vec<Customer> = tables
            .customers
            .values()
            .filter(|c| query.filter.matches(c))
            .cloned()
            .collect();
        Ok(window(rows, &query.effective_order(), query.offset, query.limit))
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let rows: Vec<Product> = tables
            .products
            .values()
            .filter(|p| query.filter.matches(p))
            .cloned()
            .collect();
        Ok(window(rows, &query.effective_order(), query.offset, query.limit))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let rows: Vec<Order> = tables
            .orders
            .values()
            .filter_map(|row| tables.resolve(row))
            .filter(|o| query.filter.matches(o))
            .collect();
        Ok(window(rows, &query.effective_order(), query.offset, query.limit))
    }

    async fn count_customers(&self) -> Result<u64> {
        Ok(self.tables.read().await.customers.len() as u64)
    }

    async fn count_products(&self) -> Result<u64> {
        Ok(self.tables.read().await.products.len() as u64)
    }

    async fn count_orders(&self) -> Result<u64> {
        Ok(self.tables.read().await.orders.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OrderFilter, ProductFilter, ProductSortField};

    fn new_customer(email: &str) -> NewCustomer {
        NewCustomer {
            name: "Ada".to_string(),
            email: email.to_string(),
            phone: None,
        }
    }

    fn new_product(name: &str, cents: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price: Decimal::new(cents, 2),
            stock: 0,
        }
    }

    #[tokio::test]
    async fn insert_and_get_customer() {
        let store = InMemoryStore::new();
        let customer = store
            .insert_customer(new_customer("ada@x.com"))
            .await
            .unwrap();

        let loaded = store.get_customer(customer.id).await.unwrap();
        assert_eq!(loaded, Some(customer));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_without_overwrite() {
        let store = InMemoryStore::new();
        let first = store
            .insert_customer(new_customer("ada@x.com"))
            .await
            .unwrap();

        let mut second = new_customer("ada@x.com");
        second.name = "Impostor".to_string();
        let result = store.insert_customer(second).await;

        assert!(matches!(
            result,
            Err(StoreError::DuplicateKey {
                field: UniqueField::Email,
                ..
            })
        ));
        assert_eq!(store.count_customers().await.unwrap(), 1);
        let kept = store.get_customer(first.id).await.unwrap().unwrap();
        assert_eq!(kept.name, "Ada");
    }

    #[tokio::test]
    async fn insert_order_persists_association_and_total() {
        let store = InMemoryStore::new();
        let customer = store
            .insert_customer(new_customer("ada@x.com"))
            .await
            .unwrap();
        let widget = store
            .insert_product(new_product("Widget", 999))
            .await
            .unwrap();
        let gadget = store
            .insert_product(new_product("Gadget", 1500))
            .await
            .unwrap();

        let order = store
            .insert_order(NewOrder::new(customer.id, vec![widget.clone(), gadget.clone()]))
            .await
            .unwrap();

        assert_eq!(order.total_amount, Decimal::new(2499, 2));
        let loaded = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(loaded.products, vec![widget, gadget]);
        assert_eq!(loaded.customer, customer);
    }

    #[tokio::test]
    async fn insert_order_with_unknown_customer_writes_nothing() {
        let store = InMemoryStore::new();
        let widget = store
            .insert_product(new_product("Widget", 999))
            .await
            .unwrap();

        let result = store
            .insert_order(NewOrder::new(CustomerId::new(), vec![widget]))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::MissingReference {
                entity: "Customer",
                ..
            })
        ));
        assert_eq!(store.count_orders().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn insert_order_with_vanished_product_writes_nothing() {
        let store = InMemoryStore::new();
        let customer = store
            .insert_customer(new_customer("ada@x.com"))
            .await
            .unwrap();
        let ghost = Product {
            id: ProductId::new(),
            name: "Ghost".to_string(),
            price: Decimal::ONE,
            stock: 0,
            created_at: timestamp_now(),
        };

        let result = store
            .insert_order(NewOrder::new(customer.id, vec![ghost]))
            .await;

        assert!(matches!(
            result,
            Err(StoreError::MissingReference {
                entity: "Product",
                ..
            })
        ));
        assert_eq!(store.count_orders().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_products_filters_orders_and_windows() {
        let store = InMemoryStore::new();
        for (name, cents) in [("A", 500), ("B", 1000), ("C", 3000), ("D", 5000), ("E", 9000)] {
            store.insert_product(new_product(name, cents)).await.unwrap();
        }

        let query = ProductQuery::new()
            .filter(ProductFilter {
                price_gte: Some(Decimal::new(10, 0)),
                price_lte: Some(Decimal::new(50, 0)),
                ..Default::default()
            })
            .order_by(vec![SortKey::desc(ProductSortField::Price)]);
        let names: Vec<String> = store
            .list_products(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["D", "C", "B"]);

        let paged = store
            .list_products(&query.offset(1).limit(1))
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].name, "C");
    }

    #[tokio::test]
    async fn list_orders_by_product_name() {
        let store = InMemoryStore::new();
        let customer = store
            .insert_customer(new_customer("ada@x.com"))
            .await
            .unwrap();
        let widget = store
            .insert_product(new_product("Widget", 999))
            .await
            .unwrap();
        let gadget = store
            .insert_product(new_product("Gadget", 1500))
            .await
            .unwrap();
        store
            .insert_order(NewOrder::new(customer.id, vec![widget]))
            .await
            .unwrap();
        let with_gadget = store
            .insert_order(NewOrder::new(customer.id, vec![gadget]))
            .await
            .unwrap();

        let query = OrderQuery::new().filter(OrderFilter {
            product_name_icontains: Some("gadg".to_string()),
            ..Default::default()
        });
        let orders = store.list_orders(&query).await.unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, with_gadget.id);
    }

    #[tokio::test]
    async fn get_products_skips_missing_ids() {
        let store = InMemoryStore::new();
        let widget = store
            .insert_product(new_product("Widget", 999))
            .await
            .unwrap();

        let found = store
            .get_products(&[widget.id, ProductId::new()])
            .await
            .unwrap();
        assert_eq!(found, vec![widget]);
    }

    #[tokio::test]
    async fn clear_empties_all_tables() {
        let store = InMemoryStore::new();
        store
            .insert_customer(new_customer("ada@x.com"))
            .await
            .unwrap();
        store.insert_product(new_product("Widget", 999)).await.unwrap();

        store.clear().await;

        assert_eq!(store.count_customers().await.unwrap(), 0);
        assert_eq!(store.count_products().await.unwrap(), 0);
    }
}
