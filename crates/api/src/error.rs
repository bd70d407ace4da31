//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller identity header is missing or malformed.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout or history failure.
    Checkout(CheckoutError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": msg }),
            ),
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Checkout(err) => checkout_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, serde_json::Value) {
    let status = match &err {
        CheckoutError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CheckoutError::DuplicateRequest(_) => StatusCode::CONFLICT,
        CheckoutError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::PersistenceFailure(_)
        | CheckoutError::EventPublishFailed { .. }
        | CheckoutError::CorruptData(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }

    let body = match &err {
        // The order exists; the client must not retry with a fresh token.
        CheckoutError::EventPublishFailed { order_id, .. } => {
            serde_json::json!({ "error": err.to_string(), "order_id": order_id })
        }
        _ => serde_json::json!({ "error": err.to_string() }),
    };

    (status, body)
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use order_store::StoreError;

    fn status_of(err: CheckoutError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn checkout_errors_map_to_status_codes() {
        assert_eq!(
            status_of(CheckoutError::InvalidRequest("items are required".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CheckoutError::DuplicateRequest("tok".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::UpstreamUnavailable("catalog down".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CheckoutError::PersistenceFailure(StoreError::Unavailable(
                "db down".into()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(CheckoutError::CorruptData("bad blob".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let response = ApiError::Unauthorized("missing x-user-id header".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn publish_failure_body_carries_order_id() {
        let err = CheckoutError::EventPublishFailed {
            order_id: OrderId::new(42),
            source: checkout::PublishError::Transport(bus::BusError::Connection(
                "broker down".into(),
            )),
        };
        let (status, body) = checkout_error_to_response(err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["order_id"], 42);
        assert!(body["error"].as_str().unwrap().contains("Order 42"));
    }
}
