//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency and are
//! serialized because each one truncates the shared tables. Requires Docker.
//!
//! ```bash
//! cargo test -p entity-store --test postgres_integration
//! ```

use std::sync::Arc;

use entity_store::{
    CustomerFilter, CustomerId, CustomerQuery, CustomerSortField, EntityStore, EntityStoreExt,
    NewCustomer, NewOrder, NewProduct, OrderFilter, OrderQuery, OrderSortField, PostgresStore,
    ProductFilter, ProductId, ProductQuery, ProductSortField, SortKey, StoreError, UniqueField,
};
use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Migrate once through the store itself
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_products, orders, products, customers")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn new_customer(name: &str, email: &str) -> NewCustomer {
    NewCustomer {
        name: name.to_string(),
        email: email.to_string(),
        phone: None,
    }
}

fn new_product(name: &str, cents: i64, stock: i32) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        price: Decimal::new(cents, 2),
        stock,
    }
}

#[tokio::test]
#[serial]
async fn insert_and_get_customer() {
    let store = get_test_store().await;

    let mut input = new_customer("Ada", "ada@x.com");
    input.phone = Some("+1234567890".to_string());
    let customer = store.insert_customer(input).await.unwrap();

    let loaded = store.get_customer(customer.id).await.unwrap().unwrap();
    assert_eq!(loaded, customer);
    assert_eq!(loaded.phone.as_deref(), Some("+1234567890"));
}

#[tokio::test]
#[serial]
async fn duplicate_email_maps_to_duplicate_key() {
    let store = get_test_store().await;

    store
        .insert_customer(new_customer("Ada", "ada@x.com"))
        .await
        .unwrap();
    let result = store
        .insert_customer(new_customer("Other", "ada@x.com"))
        .await;

    assert!(matches!(
        result,
        Err(StoreError::DuplicateKey {
            field: UniqueField::Email,
            ..
        })
    ));
    assert_eq!(store.count_customers().await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn product_price_round_trips_exactly() {
    let store = get_test_store().await;

    let product = store
        .insert_product(new_product("Widget", 999, 5))
        .await
        .unwrap();
    let loaded = store.get_product(product.id).await.unwrap().unwrap();

    assert_eq!(loaded.price, Decimal::new(999, 2));
    assert_eq!(loaded.stock, 5);
}

#[tokio::test]
#[serial]
async fn insert_order_writes_total_and_association_together() {
    let store = get_test_store().await;

    let customer = store
        .insert_customer(new_customer("Ada", "ada@x.com"))
        .await
        .unwrap();
    let widget = store
        .insert_product(new_product("Widget", 999, 5))
        .await
        .unwrap();
    let gadget = store
        .insert_product(new_product("Gadget", 1500, 0))
        .await
        .unwrap();

    let order = store
        .insert_order(NewOrder::new(
            customer.id,
            vec![widget.clone(), gadget.clone()],
        ))
        .await
        .unwrap();
    assert_eq!(order.total_amount, Decimal::new(2499, 2));

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.total_amount, Decimal::new(2499, 2));
    assert_eq!(loaded.customer.id, customer.id);
    let product_ids: Vec<ProductId> = loaded.products.iter().map(|p| p.id).collect();
    assert_eq!(product_ids, vec![widget.id, gadget.id]);
}

#[tokio::test]
#[serial]
async fn insert_order_rolls_back_on_missing_product() {
    let store = get_test_store().await;

    let customer = store
        .insert_customer(new_customer("Ada", "ada@x.com"))
        .await
        .unwrap();
    let widget = store
        .insert_product(new_product("Widget", 999, 5))
        .await
        .unwrap();
    let mut ghost = widget.clone();
    ghost.id = ProductId::new();

    let result = store
        .insert_order(NewOrder::new(customer.id, vec![widget, ghost]))
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
#[serial]
async fn require_customer_reports_missing_reference() {
    let store = get_test_store().await;

    let result = store.require_customer(CustomerId::new()).await;
    assert!(matches!(
        result,
        Err(StoreError::MissingReference {
            entity: "Customer",
            ..
        })
    ));
}

#[tokio::test]
#[serial]
async fn list_products_by_inclusive_price_range() {
    let store = get_test_store().await;

    for (name, cents) in [("A", 999), ("B", 1000), ("C", 3000), ("D", 5000), ("E", 5001)] {
        store
            .insert_product(new_product(name, cents, 1))
            .await
            .unwrap();
    }

    let query = ProductQuery::new()
        .filter(ProductFilter {
            price_gte: Some(Decimal::new(10, 0)),
            price_lte: Some(Decimal::new(50, 0)),
            ..Default::default()
        })
        .order_by(vec![SortKey::asc(ProductSortField::Price)]);
    let names: Vec<String> = store
        .list_products(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();

    assert_eq!(names, vec!["B", "C", "D"]);
}

#[tokio::test]
#[serial]
async fn list_customers_with_literal_like_text() {
    let store = get_test_store().await;

    store
        .insert_customer(new_customer("100% Ada", "ada@x.com"))
        .await
        .unwrap();
    store
        .insert_customer(new_customer("1000 Bob", "bob@x.com"))
        .await
        .unwrap();

    let query = CustomerQuery::new()
        .filter(CustomerFilter {
            name_icontains: Some("0%".to_string()),
            ..Default::default()
        })
        .order_by(vec![SortKey::asc(CustomerSortField::Name)]);
    let customers = store.list_customers(&query).await.unwrap();

    assert_eq!(customers.len(), 1);
    assert_eq!(customers[0].name, "100% Ada");
}

#[tokio::test]
#[serial]
async fn list_orders_through_customer_and_product_joins() {
    let store = get_test_store().await;

    let ada = store
        .insert_customer(new_customer("Ada", "ada@x.com"))
        .await
        .unwrap();
    let bob = store
        .insert_customer(new_customer("Bob", "bob@x.com"))
        .await
        .unwrap();
    let widget = store
        .insert_product(new_product("Widget", 999, 5))
        .await
        .unwrap();
    let gadget = store
        .insert_product(new_product("Gadget", 1500, 0))
        .await
        .unwrap();

    store
        .insert_order(NewOrder::new(ada.id, vec![widget.clone()]))
        .await
        .unwrap();
    store
        .insert_order(NewOrder::new(ada.id, vec![widget.clone(), gadget.clone()]))
        .await
        .unwrap();
    store
        .insert_order(NewOrder::new(bob.id, vec![gadget.clone()]))
        .await
        .unwrap();

    let by_customer = OrderQuery::new().filter(OrderFilter {
        customer_name_icontains: Some("ada".to_string()),
        ..Default::default()
    });
    assert_eq!(store.list_orders(&by_customer).await.unwrap().len(), 2);

    let by_product = OrderQuery::new()
        .filter(OrderFilter {
            product_name_icontains: Some("GADGET".to_string()),
            ..Default::default()
        })
        .order_by(vec![SortKey::desc(OrderSortField::TotalAmount)]);
    let orders = store.list_orders(&by_product).await.unwrap();
    let totals: Vec<Decimal> = orders.iter().map(|o| o.total_amount).collect();
    assert_eq!(totals, vec![Decimal::new(2499, 2), Decimal::new(1500, 2)]);
    // Products of a matched order are all loaded, not only the matching one
    assert_eq!(orders[0].products.len(), 2);
}

#[tokio::test]
#[serial]
async fn list_windows_are_stable_across_pages() {
    let store = get_test_store().await;

    for i in 0..7 {
        store
            .insert_product(new_product("Same", 100, i))
            .await
            .unwrap();
    }

    let order = vec![SortKey::asc(ProductSortField::Name)];
    let mut seen = Vec::new();
    for page in 0..4 {
        let query = ProductQuery::new()
            .order_by(order.clone())
            .offset(page * 2)
            .limit(2);
        seen.extend(store.list_products(&query).await.unwrap().into_iter().map(|p| p.id));
    }

    let all = store
        .list_products(&ProductQuery::new().order_by(order))
        .await
        .unwrap();
    assert_eq!(seen, all.iter().map(|p| p.id).collect::<Vec<_>>());
}

#[tokio::test]
#[serial]
async fn list_ranges_include_both_bounds() {
    let store = get_test_store().await;
    let pause = || tokio::time::sleep(std::time::Duration::from_millis(2));

    let mut customers = Vec::new();
    let mut products = Vec::new();
    for (i, cents) in [999, 1500, 2499].into_iter().enumerate() {
        pause().await;
        customers.push(
            store
                .insert_customer(new_customer(&format!("C{i}"), &format!("c{i}@x.com")))
                .await
                .unwrap(),
        );
        products.push(
            store
                .insert_product(new_product(&format!("P{i}"), cents, 1))
                .await
                .unwrap(),
        );
    }

    // Exact stored timestamps work as bounds on both sides
    let query = CustomerQuery::new()
        .filter(CustomerFilter {
            created_at_gte: Some(customers[1].created_at),
            created_at_lte: Some(customers[2].created_at),
            ..Default::default()
        })
        .order_by(vec![SortKey::asc(CustomerSortField::CreatedAt)]);
    let names: Vec<String> = store
        .list_customers(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["C1", "C2"]);

    let query = ProductQuery::new().filter(ProductFilter {
        created_at_gte: Some(products[0].created_at),
        created_at_lte: Some(products[0].created_at),
        ..Default::default()
    });
    let found = store.list_products(&query).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, products[0].id);

    let mut orders = Vec::new();
    for product in &products {
        pause().await;
        orders.push(
            store
                .insert_order(NewOrder::new(customers[0].id, vec![product.clone()]))
                .await
                .unwrap(),
        );
    }

    let query = OrderQuery::new()
        .filter(OrderFilter {
            total_amount_gte: Some(Decimal::new(1500, 2)),
            total_amount_lte: Some(Decimal::new(2499, 2)),
            ..Default::default()
        })
        .order_by(vec![SortKey::asc(OrderSortField::TotalAmount)]);
    let totals: Vec<Decimal> = store
        .list_orders(&query)
        .await
        .unwrap()
        .iter()
        .map(|o| o.total_amount)
        .collect();
    assert_eq!(totals, vec![Decimal::new(1500, 2), Decimal::new(2499, 2)]);

    let query = OrderQuery::new()
        .filter(OrderFilter {
            order_date_gte: Some(orders[0].order_date),
            order_date_lte: Some(orders[1].order_date),
            ..Default::default()
        })
        .order_by(vec![SortKey::asc(OrderSortField::OrderDate)]);
    let ids: Vec<_> = store
        .list_orders(&query)
        .await
        .unwrap()
        .iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(ids, vec![orders[0].id, orders[1].id]);
}
