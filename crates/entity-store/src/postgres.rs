use std::collections::HashMap;

use async_trait::async_trait;
use common::{CustomerId, OrderId, ProductId};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Customer, CustomerQuery, NewCustomer, NewOrder, NewProduct, Order, OrderQuery, Product,
    ProductQuery, Result, SortKey, StoreError, UniqueField,
    query::SortField,
    store::EntityStore,
    timestamp_now,
};

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, created_at";
const PRODUCT_COLUMNS: &str = "id, name, price, stock, created_at";
const ORDER_SELECT: &str = r#"
    SELECT o.id, o.order_date, o.total_amount,
    c.id AS customer_id, c.name AS customer_name, c.email AS customer_email,
    c.phone AS customer_phone, c.created_at AS customer_created_at
    FROM orders o
    JOIN customers c ON c.id = o.customer_id
"#;

const EMAIL_UNIQUE_CONSTRAINT: &str = "customers_email_key";

/// Escapes `LIKE` metacharacters so user text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn contains_pattern(text: &str) -> String {
    format!("%{}%", escape_like(text))
}

fn push_order_by<F: SortField>(
    qb: &mut QueryBuilder<'_, Postgres>,
    keys: &[SortKey<F>],
    id: &str,
) {
    qb.push(" ORDER BY ");
    for key in keys {
        qb.push(key.field.sql())
            .push(" ")
            .push(key.direction.as_sql())
            .push(", ");
    }
    qb.push(id).push(" ASC");
}

fn push_window(qb: &mut QueryBuilder<'_, Postgres>, offset: usize, limit: Option<usize>) {
    if let Some(limit) = limit {
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if offset > 0 {
        qb.push(" OFFSET ")
            .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
    }
}

/// PostgreSQL-backed entity store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL entity store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_customer(row: &PgRow) -> Result<Customer> {
        Ok(Customer {
            id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer: Customer {
                id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
                name: row.try_get("customer_name")?,
                email: row.try_get("customer_email")?,
                phone: row.try_get("customer_phone")?,
                created_at: row.try_get("customer_created_at")?,
            },
            products: Vec::new(),
            order_date: row.try_get("order_date")?,
            total_amount: row.try_get("total_amount")?,
        })
    }

    /// Decodes order rows and attaches each order's products in request order.
    async fn assemble_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let product_rows = sqlx::query(
            r#"
            SELECT op.order_id, p.id, p.name, p.price, p.stock, p.created_at
            FROM order_products op
            JOIN products p ON p.id = op.product_id
            WHERE op.order_id = ANY($1)
            ORDER BY op.order_id, op.position
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<Uuid, Vec<Product>> = HashMap::new();
        for row in &product_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            by_order
                .entry(order_id)
                .or_default()
                .push(Self::row_to_product(row)?);
        }

        for order in &mut orders {
            order.products = by_order.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn insert_customer(&self, customer: NewCustomer) -> Result<Customer> {
        let record = Customer {
            id: CustomerId::new(),
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
            created_at: timestamp_now(),
        };

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.phone)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT)
            {
                return StoreError::DuplicateKey {
                    field: UniqueField::Email,
                    value: record.email.clone(),
                };
            }
            StoreError::Database(e)
        })?;

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

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price, stock, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.name)
        .bind(record.price)
        .bind(record.stock)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order> {
        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;

        let customer_row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 FOR SHARE"
        ))
        .bind(order.customer_id().as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let customer = match customer_row {
            Some(row) => Self::row_to_customer(&row)?,
            None => {
                return Err(StoreError::MissingReference {
                    entity: "Customer",
                    id: order.customer_id().to_string(),
                });
            }
        };

        let product_ids: Vec<Uuid> = order.product_ids().iter().map(|id| id.as_uuid()).collect();
        let existing: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM products WHERE id = ANY($1) FOR SHARE")
                .bind(&product_ids)
                .fetch_all(&mut *tx)
                .await?;
        if let Some(missing) = product_ids.iter().find(|id| !existing.contains(id)) {
            return Err(StoreError::MissingReference {
                entity: "Product",
                id: missing.to_string(),
            });
        }

        let order_id = OrderId::new();
        let order_date = timestamp_now();

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, order_date, total_amount)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(customer.id.as_uuid())
        .bind(order_date)
        .bind(order.total_amount())
        .execute(&mut *tx)
        .await?;

        for (position, product_id) in product_ids.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_products (order_id, product_id, position)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(order_id.as_uuid())
            .bind(product_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(%order_id, products = product_ids.len(), "order row committed");

        Ok(Order {
            id: order_id,
            customer,
            products: order.products().to_vec(),
            order_date,
            total_amount: order.total_amount(),
        })
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_customer).transpose()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("{ORDER_SELECT} WHERE o.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let orders = self.assemble_orders(row.into_iter().collect()).await?;
        Ok(orders.into_iter().next())
    }

    async fn list_customers(&self, query: &CustomerQuery) -> Result<Vec<Customer>> {
        let filter = &query.filter;
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE TRUE"
        ));

        if let Some(ref name) = filter.name_icontains {
            qb.push(" AND name ILIKE ").push_bind(contains_pattern(name));
        }
        if let Some(ref email) = filter.email_icontains {
            qb.push(" AND email ILIKE ").push_bind(contains_pattern(email));
        }
        if let Some(ref prefix) = filter.phone_starts_with {
            qb.push(" AND phone LIKE ")
                .push_bind(format!("{}%", escape_like(prefix)));
        }
        if let Some(from) = filter.created_at_gte {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.created_at_lte {
            qb.push(" AND created_at <= ").push_bind(to);
        }

        push_order_by(&mut qb, &query.effective_order(), "id");
        push_window(&mut qb, query.offset, query.limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_customer).collect()
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Vec<Product>> {
        let filter = &query.filter;
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"
        ));

        if let Some(ref name) = filter.name_icontains {
            qb.push(" AND name ILIKE ").push_bind(contains_pattern(name));
        }
        if let Some(min) = filter.price_gte {
            qb.push(" AND price >= ").push_bind(min);
        }
        if let Some(max) = filter.price_lte {
            qb.push(" AND price <= ").push_bind(max);
        }
        if let Some(min) = filter.stock_gte {
            qb.push(" AND stock >= ").push_bind(min);
        }
        if let Some(max) = filter.stock_lte {
            qb.push(" AND stock <= ").push_bind(max);
        }
        if let Some(from) = filter.created_at_gte {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.created_at_lte {
            qb.push(" AND created_at <= ").push_bind(to);
        }

        push_order_by(&mut qb, &query.effective_order(), "id");
        push_window(&mut qb, query.offset, query.limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_product).collect()
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let filter = &query.filter;
        let mut qb = QueryBuilder::<Postgres>::new(format!("{ORDER_SELECT} WHERE TRUE"));

        if let Some(id) = filter.customer_id {
            qb.push(" AND c.id = ").push_bind(id.as_uuid());
        }
        if let Some(ref name) = filter.customer_name_icontains {
            qb.push(" AND c.name ILIKE ").push_bind(contains_pattern(name));
        }
        if let Some(ref name) = filter.product_name_icontains {
            qb.push(
                " AND EXISTS (SELECT 1 FROM order_products op \
                 JOIN products p ON p.id = op.product_id \
                 WHERE op.order_id = o.id AND p.name ILIKE ",
            )
            .push_bind(contains_pattern(name))
            .push(")");
        }
        if let Some(id) = filter.product_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM order_products op \
                 WHERE op.order_id = o.id AND op.product_id = ",
            )
            .push_bind(id.as_uuid())
            .push(")");
        }
        if let Some(min) = filter.total_amount_gte {
            qb.push(" AND o.total_amount >= ").push_bind(min);
        }
        if let Some(max) = filter.total_amount_lte {
            qb.push(" AND o.total_amount <= ").push_bind(max);
        }
        if let Some(from) = filter.order_date_gte {
            qb.push(" AND o.order_date >= ").push_bind(from);
        }
        if let Some(to) = filter.order_date_lte {
            qb.push(" AND o.order_date <= ").push_bind(to);
        }

        push_order_by(&mut qb, &query.effective_order(), "o.id");
        push_window(&mut qb, query.offset, query.limit);

        let rows = qb.build().fetch_all(&self.pool).await?;
        self.assemble_orders(rows).await
    }

    async fn count_customers(&self) -> Result<u64> {
        self.count("customers").await
    }

    async fn count_products(&self) -> Result<u64> {
        self.count("products").await
    }

    async fn count_orders(&self) -> Result<u64> {
        self.count("orders").await
    }
}
