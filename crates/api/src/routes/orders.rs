//! Checkout and order history endpoints.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use bus::EventBus;
use checkout::{CheckoutService, OrderHistoryService};
use common::OrderId;
use domain::{CheckoutItem, CheckoutRequest, OrderStatus};
use order_store::{CheckoutStore, OrderHistoryRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::identity::Caller;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CheckoutStore, B: EventBus> {
    pub checkout: CheckoutService<S, B>,
    pub history: OrderHistoryService<S>,
}

impl<S: CheckoutStore, B: EventBus> AppState<S, B> {
    pub fn new(checkout: CheckoutService<S, B>, history: OrderHistoryService<S>) -> Self {
        Self { checkout, history }
    }
}

// -- Request types --

/// Checkout body. The owning user comes from the caller identity.
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub items: Vec<CheckoutItem>,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Status label (`completed`) or numeric code (`2`).
    pub status: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    pub message: &'static str,
    pub order_id: OrderId,
}

// -- Handlers --

/// POST /api/v1/orders: check out the caller's cart.
#[tracing::instrument(skip_all, fields(user_id = %caller.0))]
pub async fn create<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    caller: Caller,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError>
where
    S: CheckoutStore + 'static,
    B: EventBus + 'static,
{
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut request = CheckoutRequest::new(
        caller.0,
        body.items,
        body.payment_method,
        body.shipping_address,
    );
    request.idempotency_token = body.idempotency_token;

    let order_id = state.checkout.checkout(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            message: "Order created successfully",
            order_id,
        }),
    ))
}

/// GET /api/v1/orders/history: the caller's orders, newest first.
#[tracing::instrument(skip_all, fields(user_id = %caller.0))]
pub async fn history<S, B>(
    State(state): State<Arc<AppState<S, B>>>,
    caller: Caller,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<OrderHistoryRecord>>, ApiError>
where
    S: CheckoutStore + 'static,
    B: EventBus + 'static,
{
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let status = parse_status(params.status.as_deref())?;

    let orders = state.history.list(caller.0, status).await?;
    Ok(Json(orders))
}

fn parse_status(raw: Option<&str>) -> Result<Option<OrderStatus>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<OrderStatus>()
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid status: {value}"))),
    }
}
