//! Mutation service: creates customers, products, and orders.

use std::collections::HashMap;
use std::str::FromStr;

use common::{CustomerId, ProductId};
use entity_store::{Customer, EntityStore, EntityStoreExt, NewOrder, Order, Product};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::DomainError;
use crate::validation::{CustomerInput, ProductInput};

pub const CUSTOMER_CREATED_MESSAGE: &str = "Customer created successfully";

/// Order totals are stored as `NUMERIC(12, 2)`; this is the first value that
/// does not fit.
pub const ORDER_TOTAL_LIMIT: Decimal = Decimal::from_parts(1_410_065_408, 2, 0, false, 0);

/// Result of a single customer create.
///
/// Customer creation never fails the call: a rejected input comes back as
/// [`CustomerOutcome::Rejected`] carrying the reason.
#[derive(Debug)]
pub enum CustomerOutcome {
    Created(Customer),
    Rejected(DomainError),
}

impl CustomerOutcome {
    /// The created customer, if the input was accepted.
    pub fn customer(&self) -> Option<&Customer> {
        match self {
            CustomerOutcome::Created(customer) => Some(customer),
            CustomerOutcome::Rejected(_) => None,
        }
    }

    /// Caller-facing status line.
    pub fn message(&self) -> String {
        match self {
            CustomerOutcome::Created(_) => CUSTOMER_CREATED_MESSAGE.to_string(),
            CustomerOutcome::Rejected(err) => err.to_string(),
        }
    }

    /// Consumes the outcome, keeping only the created customer.
    pub fn into_customer(self) -> Option<Customer> {
        match self {
            CustomerOutcome::Created(customer) => Some(customer),
            CustomerOutcome::Rejected(_) => None,
        }
    }
}

/// Result of a bulk customer create.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    /// Created customers in input order.
    pub customers: Vec<Customer>,
    /// One `"Error for <email>: <message>"` line per rejected input.
    pub errors: Vec<String>,
}

/// Service for record creation.
///
/// Wraps an [`EntityStore`] and runs validation before every write.
#[derive(Clone)]
pub struct MutationService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> MutationService<S> {
    /// Creates a new mutation service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates and stores one customer.
    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_customer(&self, input: CustomerInput) -> CustomerOutcome {
        match self.try_create_customer(&input).await {
            Ok(customer) => {
                metrics::counter!("crm_customers_created_total").increment(1);
                tracing::info!(customer_id = %customer.id, "customer created");
                CustomerOutcome::Created(customer)
            }
            Err(err) => {
                metrics::counter!("crm_customer_rejections_total").increment(1);
                tracing::warn!(error = %err, "customer rejected");
                CustomerOutcome::Rejected(err)
            }
        }
    }

    /// Creates each customer independently, in input order.
    ///
    /// Successes are kept even when siblings fail, and a repeated email in
    /// the batch fails every occurrence after the first.
    #[tracing::instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn bulk_create_customers(&self, inputs: Vec<CustomerInput>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        for input in inputs {
            match self.create_customer(input.clone()).await {
                CustomerOutcome::Created(customer) => outcome.customers.push(customer),
                CustomerOutcome::Rejected(err) => outcome
                    .errors
                    .push(format!("Error for {}: {}", input.email, err)),
            }
        }

        tracing::info!(
            created = outcome.customers.len(),
            failed = outcome.errors.len(),
            "bulk customer create finished"
        );
        outcome
    }

    async fn try_create_customer(&self, input: &CustomerInput) -> Result<Customer, DomainError> {
        let customer = input.validate()?;
        Ok(self.store.insert_customer(customer).await?)
    }

    /// Validates and stores one product.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: ProductInput) -> Result<Product, DomainError> {
        let product = input.validate()?;
        let product = self.store.insert_product(product).await?;

        metrics::counter!("crm_products_created_total").increment(1);
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Creates an order for an existing customer over existing products.
    ///
    /// Identifiers are taken as supplied by the caller; one that does not
    /// parse is reported the same way as one that does not exist. The total
    /// is computed before the write, and the order, its products, and the
    /// total are stored in a single atomic write.
    #[tracing::instrument(skip(self, product_ids), fields(products = product_ids.len()))]
    pub async fn create_order(
        &self,
        customer_id: &str,
        product_ids: &[String],
    ) -> Result<Order, DomainError> {
        let result = self.try_create_order(customer_id, product_ids).await;

        match &result {
            Ok(order) => {
                metrics::counter!("crm_orders_created_total").increment(1);
                metrics::histogram!("crm_order_total_amount")
                    .record(order.total_amount.to_f64().unwrap_or_default());
                tracing::info!(
                    order_id = %order.id,
                    total_amount = %order.total_amount,
                    "order created"
                );
            }
            Err(err) => {
                metrics::counter!("crm_order_failures_total").increment(1);
                tracing::warn!(error = %err, "order rejected");
            }
        }

        result
    }

    async fn try_create_order(
        &self,
        customer_id: &str,
        product_ids: &[String],
    ) -> Result<Order, DomainError> {
        if product_ids.is_empty() {
            return Err(DomainError::InvalidInput(
                "At least one product is required".to_string(),
            ));
        }

        let customer_id = CustomerId::from_str(customer_id)
            .map_err(|_| DomainError::not_found("Customer", customer_id))?;
        let customer = self.store.require_customer(customer_id).await?;

        let products = self.resolve_products(product_ids).await?;

        let order = NewOrder::new(customer.id, products);
        if order.total_amount() >= ORDER_TOTAL_LIMIT {
            return Err(DomainError::InvalidInput(format!(
                "Order total {} exceeds the maximum of 9999999999.99",
                order.total_amount()
            )));
        }
        Ok(self.store.insert_order(order).await?)
    }

    /// Loads products in request order, failing on the first reference that
    /// does not resolve.
    async fn resolve_products(&self, raw_ids: &[String]) -> Result<Vec<Product>, DomainError> {
        let parsed: Vec<Option<ProductId>> = raw_ids
            .iter()
            .map(|raw| ProductId::from_str(raw).ok())
            .collect();
        let lookup: Vec<ProductId> = parsed.iter().flatten().copied().collect();

        let found: HashMap<ProductId, Product> = self
            .store
            .get_products(&lookup)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut products = Vec::with_capacity(raw_ids.len());
        for (raw, id) in raw_ids.iter().zip(parsed) {
            let product = id
                .and_then(|id| found.get(&id).cloned())
                .ok_or_else(|| DomainError::not_found("Product", raw))?;
            products.push(product);
        }

        Ok(products)
    }
}
