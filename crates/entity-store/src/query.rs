//! Listing queries: filter predicates, ordering, and offset/limit windows.
//!
//! Filters are plain structs of optional predicates; every predicate that is
//! set must hold (logical AND). Text predicates are case-insensitive
//! substring matches, range predicates are inclusive on both ends.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::{CustomerId, ProductId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::{Customer, Order, Product};

/// Sort direction for a single ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// A field a listing can be ordered by.
pub trait SortField: Copy + std::fmt::Debug + PartialEq + Send + Sync + 'static {
    /// The record type this field belongs to.
    type Record;

    /// Ordering applied when the caller asks for none.
    const DEFAULT: Self;

    /// Resolves a client-facing field name (`"createdAt"` or `"created_at"`).
    fn from_name(name: &str) -> Option<Self>;

    /// SQL expression used in `ORDER BY`.
    fn sql(self) -> &'static str;

    /// Compares two records on this field alone.
    fn compare(self, a: &Self::Record, b: &Self::Record) -> Ordering;

    /// Final tie-break so the ordering is total.
    fn compare_ids(a: &Self::Record, b: &Self::Record) -> Ordering;
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey<F> {
    pub field: F,
    pub direction: SortDirection,
}

impl<F> SortKey<F> {
    /// Sorts by `field`, smallest first.
    pub fn asc(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    /// Sorts by `field`, largest first.
    pub fn desc(field: F) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Error returned for an `orderBy` entry that names no sortable field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot order by unknown field: {0}")]
pub struct UnknownSortField(pub String);

/// Parses a client ordering list such as `["-price", "name"]`.
///
/// A leading `-` sorts descending.
pub fn parse_order_by<F: SortField>(
    names: &[String],
) -> std::result::Result<Vec<SortKey<F>>, UnknownSortField> {
    names
        .iter()
        .map(|raw| {
            let raw = raw.trim();
            let (direction, name) = match raw.strip_prefix('-') {
                Some(rest) => (SortDirection::Desc, rest),
                None => (SortDirection::Asc, raw),
            };
            F::from_name(name)
                .map(|field| SortKey { field, direction })
                .ok_or_else(|| UnknownSortField(raw.to_string()))
        })
        .collect()
}

/// Compares two records under `keys`, falling back to id order.
pub fn compare_records<F: SortField>(
    keys: &[SortKey<F>],
    a: &F::Record,
    b: &F::Record,
) -> Ordering {
    keys.iter()
        .map(|key| key.direction.apply(key.field.compare(a, b)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| F::compare_ids(a, b))
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn icontains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn in_range<T: PartialOrd>(value: &T, gte: Option<&T>, lte: Option<&T>) -> bool {
    gte.is_none_or(|min| value >= min) && lte.is_none_or(|max| value <= max)
}

// -- Customers --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerSortField {
    Name,
    Email,
    CreatedAt,
}

impl SortField for CustomerSortField {
    type Record = Customer;

    const DEFAULT: Self = CustomerSortField::CreatedAt;

    fn from_name(name: &str) -> Option<Self> {
        match normalize(name).as_str() {
            "name" => Some(Self::Name),
            "email" => Some(Self::Email),
            "createdat" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Name => r#"name COLLATE "C""#,
            Self::Email => r#"email COLLATE "C""#,
            Self::CreatedAt => "created_at",
        }
    }

    fn compare(self, a: &Customer, b: &Customer) -> Ordering {
        match self {
            Self::Name => a.name.cmp(&b.name),
            Self::Email => a.email.cmp(&b.email),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }

    fn compare_ids(a: &Customer, b: &Customer) -> Ordering {
        a.id.cmp(&b.id)
    }
}

/// Customer listing predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFilter {
    pub name_icontains: Option<String>,
    pub email_icontains: Option<String>,
    /// Phone number prefix, e.g. `"+1"`.
    pub phone_starts_with: Option<String>,
    pub created_at_gte: Option<DateTime<Utc>>,
    pub created_at_lte: Option<DateTime<Utc>>,
}

impl CustomerFilter {
    /// In-memory evaluation of the filter; every set condition must hold.
    pub fn matches(&self, customer: &Customer) -> bool {
        if let Some(ref name) = self.name_icontains
            && !icontains(&customer.name, name)
        {
            return false;
        }
        if let Some(ref email) = self.email_icontains
            && !icontains(&customer.email, email)
        {
            return false;
        }
        if let Some(ref prefix) = self.phone_starts_with
            && !customer
                .phone
                .as_deref()
                .is_some_and(|phone| phone.starts_with(prefix.as_str()))
        {
            return false;
        }
        in_range(
            &customer.created_at,
            self.created_at_gte.as_ref(),
            self.created_at_lte.as_ref(),
        )
    }
}

// -- Products --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSortField {
    Name,
    Price,
    Stock,
    CreatedAt,
}

impl SortField for ProductSortField {
    type Record = Product;

    const DEFAULT: Self = ProductSortField::CreatedAt;

    fn from_name(name: &str) -> Option<Self> {
        match normalize(name).as_str() {
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            "stock" => Some(Self::Stock),
            "createdat" => Some(Self::CreatedAt),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Name => r#"name COLLATE "C""#,
            Self::Price => "price",
            Self::Stock => "stock",
            Self::CreatedAt => "created_at",
        }
    }

    fn compare(self, a: &Product, b: &Product) -> Ordering {
        match self {
            Self::Name => a.name.cmp(&b.name),
            Self::Price => a.price.cmp(&b.price),
            Self::Stock => a.stock.cmp(&b.stock),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }

    fn compare_ids(a: &Product, b: &Product) -> Ordering {
        a.id.cmp(&b.id)
    }
}

/// Product listing predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub name_icontains: Option<String>,
    pub price_gte: Option<Decimal>,
    pub price_lte: Option<Decimal>,
    pub stock_gte: Option<i32>,
    pub stock_lte: Option<i32>,
    pub created_at_gte: Option<DateTime<Utc>>,
    pub created_at_lte: Option<DateTime<Utc>>,
}

impl ProductFilter {
    /// In-memory evaluation of the filter; range bounds are inclusive.
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(ref name) = self.name_icontains
            && !icontains(&product.name, name)
        {
            return false;
        }
        in_range(&product.price, self.price_gte.as_ref(), self.price_lte.as_ref())
            && in_range(&product.stock, self.stock_gte.as_ref(), self.stock_lte.as_ref())
            && in_range(
                &product.created_at,
                self.created_at_gte.as_ref(),
                self.created_at_lte.as_ref(),
            )
    }
}

// -- Orders --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSortField {
    OrderDate,
    TotalAmount,
    CustomerName,
}

impl SortField for OrderSortField {
    type Record = Order;

    const DEFAULT: Self = OrderSortField::OrderDate;

    fn from_name(name: &str) -> Option<Self> {
        match normalize(name).as_str() {
            "orderdate" => Some(Self::OrderDate),
            "totalamount" => Some(Self::TotalAmount),
            "customername" => Some(Self::CustomerName),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::OrderDate => "o.order_date",
            Self::TotalAmount => "o.total_amount",
            Self::CustomerName => r#"c.name COLLATE "C""#,
        }
    }

    fn compare(self, a: &Order, b: &Order) -> Ordering {
        match self {
            Self::OrderDate => a.order_date.cmp(&b.order_date),
            Self::TotalAmount => a.total_amount.cmp(&b.total_amount),
            Self::CustomerName => a.customer.name.cmp(&b.customer.name),
        }
    }

    fn compare_ids(a: &Order, b: &Order) -> Ordering {
        a.id.cmp(&b.id)
    }
}

/// Order listing predicates, including join-through predicates on the
/// owning customer and the associated products.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub customer_id: Option<CustomerId>,
    pub customer_name_icontains: Option<String>,
    /// Matches when any associated product's name contains the text.
    pub product_name_icontains: Option<String>,
    /// Matches when the product is associated with the order.
    pub product_id: Option<ProductId>,
    pub total_amount_gte: Option<Decimal>,
    pub total_amount_lte: Option<Decimal>,
    pub order_date_gte: Option<DateTime<Utc>>,
    pub order_date_lte: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// In-memory evaluation of the filter against a resolved order.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(id) = self.customer_id
            && order.customer.id != id
        {
            return false;
        }
        if let Some(ref name) = self.customer_name_icontains
            && !icontains(&order.customer.name, name)
        {
            return false;
        }
        if let Some(ref name) = self.product_name_icontains
            && !order.products.iter().any(|p| icontains(&p.name, name))
        {
            return false;
        }
        if let Some(id) = self.product_id
            && !order.products.iter().any(|p| p.id == id)
        {
            return false;
        }
        in_range(
            &order.total_amount,
            self.total_amount_gte.as_ref(),
            self.total_amount_lte.as_ref(),
        ) && in_range(
            &order.order_date,
            self.order_date_gte.as_ref(),
            self.order_date_lte.as_ref(),
        )
    }
}

/// A filtered, ordered window over one entity table.
#[derive(Debug, Clone)]
pub struct ListQuery<F, S> {
    pub filter: F,
    pub order_by: Vec<SortKey<S>>,
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
}

impl<F: Default, S: SortField> ListQuery<F, S> {
    /// Creates an unfiltered query over the whole table.
    pub fn new() -> Self {
        Self {
            filter: F::default(),
            order_by: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    /// Restricts the query to rows matching `filter`.
    pub fn filter(mut self, filter: F) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the sort keys; the id tie-break is appended when executed.
    pub fn order_by(mut self, keys: Vec<SortKey<S>>) -> Self {
        self.order_by = keys;
        self
    }

    /// Skips the first `offset` rows of the ordered result.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns at most `limit` rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The ordering actually applied: the caller's keys, or the default.
    pub fn effective_order(&self) -> Vec<SortKey<S>> {
        if self.order_by.is_empty() {
            vec![SortKey::asc(S::DEFAULT)]
        } else {
            self.order_by.clone()
        }
    }
}

pub type CustomerQuery = ListQuery<CustomerFilter, CustomerSortField>;
pub type ProductQuery = ListQuery<ProductFilter, ProductSortField>;
pub type OrderQuery = ListQuery<OrderFilter, OrderSortField>;
