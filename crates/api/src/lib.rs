//! HTTP API server for the ERP backend.
//!
//! Exposes the catalog, customers, stock ledger, orders, invoices and the
//! dashboard as JSON over REST. Every `/api` route except the health and
//! metrics endpoints requires a bearer token. Responses use the
//! `{success, data?, message}` envelope.

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{
        categories, customers, dashboard, invoices, orders, products, stock_movements, system,
    };

    let metrics_router = Router::new()
        .route("/metrics", get(system::metrics))
        .with_state(metrics_handle);

    let protected = Router::new()
        .route("/api/auth/me", get(routes::auth::me))
        .route(
            "/api/categories",
            get(categories::list::<S>).post(categories::create::<S>),
        )
        .route(
            "/api/categories/{id}",
            get(categories::get::<S>)
                .put(categories::update::<S>)
                .delete(categories::delete::<S>),
        )
        .route(
            "/api/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route(
            "/api/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route(
            "/api/customers",
            get(customers::list::<S>).post(customers::create::<S>),
        )
        .route(
            "/api/customers/{id}",
            get(customers::get::<S>)
                .put(customers::update::<S>)
                .delete(customers::delete::<S>),
        )
        .route(
            "/api/stock-movements",
            get(stock_movements::list::<S>).post(stock_movements::create::<S>),
        )
        .route(
            "/api/stock-movements/{id}",
            get(stock_movements::get::<S>)
                .put(stock_movements::update::<S>)
                .delete(stock_movements::delete::<S>),
        )
        .route(
            "/api/orders",
            get(orders::list::<S>).post(orders::create::<S>),
        )
        .route(
            "/api/orders/{id}",
            get(orders::get::<S>)
                .put(orders::update::<S>)
                .delete(orders::delete::<S>),
        )
        .route(
            "/api/invoices",
            get(invoices::list::<S>).post(invoices::create::<S>),
        )
        .route(
            "/api/invoices/{id}",
            get(invoices::get::<S>)
                .put(invoices::update::<S>)
                .delete(invoices::delete::<S>),
        )
        .route("/api/invoices/{id}/download", get(invoices::download::<S>))
        .route(
            "/api/invoices/{id}/payments",
            get(invoices::list_payments::<S>).post(invoices::record_payment::<S>),
        )
        .route("/api/dashboard/stats", get(dashboard::stats::<S>))
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            auth::require_bearer,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(system::health::<S>))
        .with_state(state)
        .merge(protected)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
