//! Named-operation endpoint at `POST /graphql`.
//!
//! A request names one operation and passes its arguments as `variables`:
//!
//! ```json
//! {"operation": "createProduct", "variables": {"input": {"name": "Widget", "price": "9.99"}}}
//! ```
//!
//! The reply is `{"data": {"<operation>": ...}}`. Field names are camelCase
//! and money is rendered as a string with two decimal places.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use domain::{CustomerInput, PageRequest, ProductInput};
use entity_store::{
    Customer, CustomerFilter, EntityStore, Order, OrderFilter, Product, ProductFilter,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GraphRequest {
    pub operation: String,
    #[serde(default)]
    pub variables: Value,
}

// -- Argument types --

#[derive(Debug, Deserialize)]
struct InputArg<T> {
    input: T,
}

#[derive(Debug, Deserialize)]
struct IdArg {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInput {
    customer_id: String,
    product_ids: Vec<String>,
}

/// `createOrder` takes either `{"input": {...}}` or the bare fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateOrderArgs {
    Wrapped { input: OrderInput },
    Flat(OrderInput),
}

impl CreateOrderArgs {
    fn into_input(self) -> OrderInput {
        match self {
            CreateOrderArgs::Wrapped { input } | CreateOrderArgs::Flat(input) => input,
        }
    }
}

/// `orderBy` as a list (`["-price", "name"]`) or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderByArg {
    One(String),
    Many(Vec<String>),
}

impl OrderByArg {
    fn into_fields(self) -> Vec<String> {
        let fields = match self {
            OrderByArg::One(joined) => joined.split(',').map(str::to_string).collect(),
            OrderByArg::Many(fields) => fields,
        };
        fields
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListArgs<F> {
    #[serde(default)]
    filter: Option<F>,
    #[serde(default)]
    order_by: Option<OrderByArg>,
    #[serde(default)]
    first: Option<i64>,
    #[serde(default)]
    after: Option<String>,
}

impl<F: Default> ListArgs<F> {
    fn into_parts<T: From<F>>(self) -> (T, Vec<String>, PageRequest) {
        let filter = T::from(self.filter.unwrap_or_default());
        let order_by = self
            .order_by
            .map(OrderByArg::into_fields)
            .unwrap_or_default();
        let page = PageRequest {
            first: self.first,
            after: self.after,
        };
        (filter, order_by, page)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomerFilterInput {
    #[serde(alias = "name")]
    pub name_icontains: Option<String>,
    #[serde(alias = "email")]
    pub email_icontains: Option<String>,
    pub phone_pattern: Option<String>,
    pub created_at_gte: Option<DateTime<Utc>>,
    pub created_at_lte: Option<DateTime<Utc>>,
}

impl From<CustomerFilterInput> for CustomerFilter {
    fn from(input: CustomerFilterInput) -> Self {
        CustomerFilter {
            name_icontains: input.name_icontains,
            email_icontains: input.email_icontains,
            phone_starts_with: input.phone_pattern,
            created_at_gte: input.created_at_gte,
            created_at_lte: input.created_at_lte,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProductFilterInput {
    #[serde(alias = "name")]
    pub name_icontains: Option<String>,
    pub price_gte: Option<Decimal>,
    pub price_lte: Option<Decimal>,
    pub stock_gte: Option<i32>,
    pub stock_lte: Option<i32>,
    pub created_at_gte: Option<DateTime<Utc>>,
    pub created_at_lte: Option<DateTime<Utc>>,
}

impl From<ProductFilterInput> for ProductFilter {
    fn from(input: ProductFilterInput) -> Self {
        ProductFilter {
            name_icontains: input.name_icontains,
            price_gte: input.price_gte,
            price_lte: input.price_lte,
            stock_gte: input.stock_gte,
            stock_lte: input.stock_lte,
            created_at_gte: input.created_at_gte,
            created_at_lte: input.created_at_lte,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderFilterInput {
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
    pub product_id: Option<ProductId>,
    pub total_amount_gte: Option<Decimal>,
    pub total_amount_lte: Option<Decimal>,
    pub order_date_gte: Option<DateTime<Utc>>,
    pub order_date_lte: Option<DateTime<Utc>>,
}

impl From<OrderFilterInput> for OrderFilter {
    fn from(input: OrderFilterInput) -> Self {
        OrderFilter {
            customer_id: input.customer_id,
            customer_name_icontains: input.customer_name,
            product_name_icontains: input.product_name,
            product_id: input.product_id,
            total_amount_gte: input.total_amount_gte,
            total_amount_lte: input.total_amount_lte,
            order_date_gte: input.order_date_gte,
            order_date_lte: input.order_date_lte,
        }
    }
}

// -- Response types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerNode {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Customer> for CustomerNode {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNode {
    pub id: ProductId,
    pub name: String,
    pub price: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Product> for ProductNode {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: money(p.price),
            stock: p.stock,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderNode {
    pub id: OrderId,
    pub customer: CustomerNode,
    pub products: Vec<ProductNode>,
    pub order_date: DateTime<Utc>,
    pub total_amount: String,
}

impl From<Order> for OrderNode {
    fn from(o: Order) -> Self {
        Self {
            id: o.id,
            customer: o.customer.into(),
            products: o.products.into_iter().map(ProductNode::from).collect(),
            order_date: o.order_date,
            total_amount: money(o.total_amount),
        }
    }
}

/// Renders an amount with exactly two decimal places.
fn money(mut amount: Decimal) -> String {
    amount.rescale(2);
    amount.to_string()
}

fn args<T: DeserializeOwned>(variables: Value) -> Result<T, ApiError> {
    let variables = match variables {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    Ok(serde_json::from_value(variables)?)
}

// -- Handler --

/// POST /graphql — runs one named operation.
#[tracing::instrument(skip_all, fields(operation = tracing::field::Empty))]
pub async fn execute<S: EntityStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<GraphRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    tracing::Span::current().record("operation", request.operation.as_str());

    let result = dispatch(&state, &request.operation, request.variables).await?;

    let mut data = Map::new();
    data.insert(request.operation, result);
    Ok(Json(json!({ "data": data })))
}

async fn dispatch<S: EntityStore>(
    state: &AppState<S>,
    operation: &str,
    variables: Value,
) -> Result<Value, ApiError> {
    let value = match operation {
        "hello" => json!(state.queries.hello()),

        "createCustomer" => {
            let InputArg { input } = args::<InputArg<CustomerInput>>(variables)?;
            let outcome = state.mutations.create_customer(input).await;
            let message = outcome.message();
            json!({
                "customer": outcome.into_customer().map(CustomerNode::from),
                "message": message,
            })
        }

        "bulkCreateCustomers" => {
            let InputArg { input } = args::<InputArg<Vec<CustomerInput>>>(variables)?;
            let outcome = state.mutations.bulk_create_customers(input).await;
            let customers: Vec<CustomerNode> =
                outcome.customers.into_iter().map(CustomerNode::from).collect();
            let errors = (!outcome.errors.is_empty()).then_some(outcome.errors);
            json!({ "customers": customers, "errors": errors })
        }

        "createProduct" => {
            let InputArg { input } = args::<InputArg<ProductInput>>(variables)?;
            let product = state.mutations.create_product(input).await?;
            json!({ "product": ProductNode::from(product) })
        }

        "createOrder" => {
            let input = args::<CreateOrderArgs>(variables)?.into_input();
            let order = state
                .mutations
                .create_order(&input.customer_id, &input.product_ids)
                .await?;
            json!({ "order": OrderNode::from(order) })
        }

        "customer" => {
            let IdArg { id } = args(variables)?;
            json!(CustomerNode::from(state.queries.customer(&id).await?))
        }

        "product" => {
            let IdArg { id } = args(variables)?;
            json!(ProductNode::from(state.queries.product(&id).await?))
        }

        "order" => {
            let IdArg { id } = args(variables)?;
            json!(OrderNode::from(state.queries.order(&id).await?))
        }

        "allCustomers" => {
            let (filter, order_by, page) =
                args::<ListArgs<CustomerFilterInput>>(variables)?.into_parts();
            let page = state.queries.all_customers(filter, &order_by, &page).await?;
            json!(page.map(CustomerNode::from))
        }

        "allProducts" => {
            let (filter, order_by, page) =
                args::<ListArgs<ProductFilterInput>>(variables)?.into_parts();
            let page = state.queries.all_products(filter, &order_by, &page).await?;
            json!(page.map(ProductNode::from))
        }

        "allOrders" => {
            let (filter, order_by, page) =
                args::<ListArgs<OrderFilterInput>>(variables)?.into_parts();
            let page = state.queries.all_orders(filter, &order_by, &page).await?;
            json!(page.map(OrderNode::from))
        }

        other => return Err(ApiError::UnknownOperation(other.to_string())),
    };

    Ok(value)
}
