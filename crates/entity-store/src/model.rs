//! Persisted records and the write payloads that create them.

use std::collections::HashSet;

use chrono::{DateTime, SubsecRound, Utc};
use common::{CustomerId, OrderId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current time truncated to the microsecond precision PostgreSQL stores.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A stored customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A stored product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

/// A stored order with its customer and product set resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer: Customer,
    /// Associated products in the order they were first requested.
    pub products: Vec<Product>,
    pub order_date: DateTime<Utc>,
    /// Sum of `products[..].price`.
    pub total_amount: Decimal,
}

/// Fields for a customer insert. Produced by the validation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Fields for a product insert. Produced by the validation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

/// A fully assembled order ready to be written in one step.
///
/// The product set and the total are fixed at construction, so an order is
/// never persisted with a total that disagrees with its association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    customer_id: CustomerId,
    products: Vec<Product>,
    total_amount: Decimal,
}

impl NewOrder {
    /// Builds an order from resolved products.
    ///
    /// The association is a set: a product listed more than once is kept at
    /// its first position and counted once.
    pub fn new(customer_id: CustomerId, products: Vec<Product>) -> Self {
        let mut seen = HashSet::new();
        let products: Vec<Product> = products
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect();
        let total_amount = order_total(&products);

        Self {
            customer_id,
            products,
            total_amount,
        }
    }

    /// The ordering customer.
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    /// Distinct products, in first-requested order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Ids of [`NewOrder::products`].
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.products.iter().map(|p| p.id).collect()
    }

    /// Sum of the distinct products' prices.
    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }
}

/// Exact decimal sum of product prices.
pub fn order_total(products: &[Product]) -> Decimal {
    products.iter().map(|p| p.price).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: Decimal) -> Product {
        Product {
            id: ProductId::new(),
            name: "Widget".to_string(),
            price,
            stock: 0,
            created_at: timestamp_now(),
        }
    }

    #[test]
    fn total_is_exact_decimal_sum() {
        let products = vec![
            product(Decimal::new(999, 2)),
            product(Decimal::new(1500, 2)),
        ];
        assert_eq!(order_total(&products), Decimal::new(2499, 2));
    }

    #[test]
    fn total_has_no_drift_over_many_cents() {
        let products: Vec<_> = (0..1000).map(|_| product(Decimal::new(1, 2))).collect();
        assert_eq!(order_total(&products), Decimal::new(1000, 2));
    }

    #[test]
    fn new_order_collapses_repeated_products() {
        let widget = product(Decimal::new(999, 2));
        let gadget = product(Decimal::new(1500, 2));
        let order = NewOrder::new(
            CustomerId::new(),
            vec![widget.clone(), gadget.clone(), widget.clone()],
        );

        assert_eq!(order.product_ids(), vec![widget.id, gadget.id]);
        assert_eq!(order.total_amount(), Decimal::new(2499, 2));
    }

    #[test]
    fn empty_order_totals_zero() {
        let order = NewOrder::new(CustomerId::new(), vec![]);
        assert_eq!(order.total_amount(), Decimal::ZERO);
    }

    #[test]
    fn timestamps_have_microsecond_precision() {
        let now = timestamp_now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }
}
