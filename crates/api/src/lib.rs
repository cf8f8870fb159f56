//! HTTP API server with observability for the CRM data API.
//!
//! Exposes the named query and mutation operations at `POST /graphql`,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{MutationService, QueryService};
use entity_store::EntityStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EntityStore> {
    pub mutations: MutationService<S>,
    pub queries: QueryService<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EntityStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/graphql", post(routes::graph::execute::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with both services over one store.
pub fn create_state<S: EntityStore + Clone>(
    store: S,
    default_page_size: usize,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        mutations: MutationService::new(store.clone()),
        queries: QueryService::new(store).with_default_page_size(default_page_size),
    })
}
