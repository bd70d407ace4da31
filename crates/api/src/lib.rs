//! HTTP API for order checkout and history.
//!
//! Exposes the checkout and history endpoints over the services of the
//! `checkout` crate, with structured logging (tracing) and Prometheus metrics.
//! The binary additionally runs the payment consumer and outbox dispatcher.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use bus::EventBus;
use checkout::{CheckoutService, EventPublisher, OrderHistoryService, ProductCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::CheckoutStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use identity::{Caller, USER_ID_HEADER};
pub use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, B>(state: Arc<AppState<S, B>>, metrics_handle: PrometheusHandle) -> Router
where
    S: CheckoutStore + 'static,
    B: EventBus + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/health", get(routes::health::check))
        .route("/api/v1/orders", post(routes::orders::create::<S, B>))
        .route(
            "/api/v1/orders/history",
            get(routes::orders::history::<S, B>),
        )
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

/// Wires the checkout and history services over one store and bus.
pub fn create_state<S, B>(
    store: Arc<S>,
    bus: Arc<B>,
    catalog: Option<Arc<dyn ProductCatalog>>,
) -> Arc<AppState<S, B>>
where
    S: CheckoutStore + 'static,
    B: EventBus + 'static,
{
    let mut checkout = CheckoutService::new(Arc::clone(&store), EventPublisher::new(bus));
    if let Some(catalog) = catalog {
        checkout = checkout.with_catalog(catalog);
    }
    let history = OrderHistoryService::new(store);

    Arc::new(AppState::new(checkout, history))
}
