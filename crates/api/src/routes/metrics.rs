//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for the CRM metrics with the installed recorder.
pub fn describe() {
    metrics::describe_counter!("crm_customers_created_total", "Customers created");
    metrics::describe_counter!(
        "crm_customer_rejections_total",
        "Customer creates rejected by validation or uniqueness"
    );
    metrics::describe_counter!("crm_products_created_total", "Products created");
    metrics::describe_counter!("crm_orders_created_total", "Orders created");
    metrics::describe_counter!("crm_order_failures_total", "Order creates that failed");
    metrics::describe_histogram!("crm_order_total_amount", "Order totals");
}

/// GET /metrics — returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
