//! Caller identity forwarded by the upstream auth gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user's numeric id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller. Rejects the request with `401` when the header
/// is missing or not a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| {
                metrics::counter!("api_unauthorized_requests_total").increment(1);
                ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header"))
            })?;

        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(|id| Caller(UserId::new(id)))
            .ok_or_else(|| {
                metrics::counter!("api_unauthorized_requests_total").increment(1);
                tracing::warn!(uri = %parts.uri, "rejected malformed caller identity");
                ApiError::Unauthorized(format!("invalid {USER_ID_HEADER} header"))
            })
    }
}
