//! Read-only lookups and cursor-paginated listings.
//!
//! Listings run against a total ordering (the caller's keys followed by the
//! entity id), so a cursor is simply the base64-encoded position of a row
//! within that ordering.

use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use common::{CustomerId, OrderId, ProductId};
use entity_store::{
    Customer, CustomerFilter, CustomerQuery, EntityStore, ListQuery, Order, OrderFilter,
    OrderQuery, Product, ProductFilter, ProductQuery, SortField, parse_order_by,
};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

const CURSOR_PREFIX: &str = "arrayconnection:";

/// Greeting returned by the `hello` operation.
pub const HELLO: &str = "Hello, GraphQL!";

/// Encodes a row position as an opaque cursor.
pub fn encode_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{CURSOR_PREFIX}{offset}"))
}

/// Decodes a cursor produced by [`encode_cursor`].
pub fn decode_cursor(cursor: &str) -> Result<usize, DomainError> {
    let invalid = || DomainError::InvalidInput(format!("Invalid cursor: {cursor}"));

    let bytes = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(CURSOR_PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

/// Forward pagination arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    /// Page size; the service default when absent.
    pub first: Option<i64>,
    /// Cursor of the last row already seen.
    pub after: Option<String>,
}

impl PageRequest {
    pub fn first(first: i64) -> Self {
        Self {
            first: Some(first),
            after: None,
        }
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.after = Some(cursor.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// One window of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    fn from_window(rows: Vec<T>, offset: usize, limit: usize) -> Self {
        let has_next_page = rows.len() > limit;
        let edges: Vec<Edge<T>> = rows
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, node)| Edge {
                cursor: encode_cursor(offset + i),
                node,
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page: offset > 0,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };

        Self { edges, page_info }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }

    /// Converts every node, keeping cursors and page info.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            edges: self
                .edges
                .into_iter()
                .map(|e| Edge {
                    cursor: e.cursor,
                    node: f(e.node),
                })
                .collect(),
            page_info: self.page_info,
        }
    }
}

/// Service for lookups and listings.
#[derive(Clone)]
pub struct QueryService<S: EntityStore> {
    store: S,
    default_page_size: usize,
}

impl<S: EntityStore> QueryService<S> {
    /// Creates a new query service over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the page size used when a request gives no `first`.
    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn hello(&self) -> &'static str {
        HELLO
    }

    #[tracing::instrument(skip(self))]
    pub async fn customer(&self, id: &str) -> Result<Customer, DomainError> {
        let not_found = || DomainError::not_found("Customer", id);
        let customer_id = CustomerId::from_str(id).map_err(|_| not_found())?;
        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self))]
    pub async fn product(&self, id: &str) -> Result<Product, DomainError> {
        let not_found = || DomainError::not_found("Product", id);
        let product_id = ProductId::from_str(id).map_err(|_| not_found())?;
        self.store
            .get_product(product_id)
            .await?
            .ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self))]
    pub async fn order(&self, id: &str) -> Result<Order, DomainError> {
        let not_found = || DomainError::not_found("Order", id);
        let order_id = OrderId::from_str(id).map_err(|_| not_found())?;
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(not_found)
    }

    #[tracing::instrument(skip(self))]
    pub async fn all_customers(
        &self,
        filter: CustomerFilter,
        order_by: &[String],
        page: &PageRequest,
    ) -> Result<Page<Customer>, DomainError> {
        let (query, offset, limit): (CustomerQuery, _, _) =
            self.build_query(filter, order_by, page)?;
        let rows = self.store.list_customers(&query).await?;
        Ok(Page::from_window(rows, offset, limit))
    }

    #[tracing::instrument(skip(self))]
    pub async fn all_products(
        &self,
        filter: ProductFilter,
        order_by: &[String],
        page: &PageRequest,
    ) -> Result<Page<Product>, DomainError> {
        let (query, offset, limit): (ProductQuery, _, _) =
            self.build_query(filter, order_by, page)?;
        let rows = self.store.list_products(&query).await?;
        Ok(Page::from_window(rows, offset, limit))
    }

    #[tracing::instrument(skip(self))]
    pub async fn all_orders(
        &self,
        filter: OrderFilter,
        order_by: &[String],
        page: &PageRequest,
    ) -> Result<Page<Order>, DomainError> {
        let (query, offset, limit): (OrderQuery, _, _) =
            self.build_query(filter, order_by, page)?;
        let rows = self.store.list_orders(&query).await?;
        Ok(Page::from_window(rows, offset, limit))
    }

    /// Builds a store query that fetches one row past the page, so the
    /// caller can tell whether another page follows.
    fn build_query<F: Default, K: SortField>(
        &self,
        filter: F,
        order_by: &[String],
        page: &PageRequest,
    ) -> Result<(ListQuery<F, K>, usize, usize), DomainError> {
        let keys = parse_order_by::<K>(order_by)?;
        let limit = self.page_size(page.first)?;
        let offset = match page.after.as_deref() {
            Some(cursor) => decode_cursor(cursor)?.saturating_add(1),
            None => 0,
        };

        let query = ListQuery::new()
            .filter(filter)
            .order_by(keys)
            .offset(offset)
            .limit(limit + 1);
        Ok((query, offset, limit))
    }

    fn page_size(&self, first: Option<i64>) -> Result<usize, DomainError> {
        match first {
            None => Ok(self.default_page_size),
            Some(n) if n < 0 => Err(DomainError::InvalidInput(
                "Argument \"first\" must be a non-negative integer".to_string(),
            )),
            Some(n) if n > MAX_PAGE_SIZE as i64 => Err(DomainError::InvalidInput(format!(
                "Requesting {n} records exceeds the \"first\" limit of {MAX_PAGE_SIZE} records"
            ))),
            Some(n) => Ok(n as usize),
        }
    }
}
