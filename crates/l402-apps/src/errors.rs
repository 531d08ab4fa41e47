//! HTTP error surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use l402_kit::rail::RailError;
use l402_lottery::engine::LotteryError;
use l402_lottery::store::StoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("L402 not configured")]
    PaymentsUnavailable,
    /// Upstream collaborator (node, LNURL endpoint) failed; retriable.
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PaymentsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::Internal(_) | ApiError::Upstream(_)) {
            tracing::error!("request failed: {self}");
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RailError> for ApiError {
    fn from(err: RailError) -> Self {
        match err {
            RailError::Unreachable(_) | RailError::Rejected(_) => {
                ApiError::Upstream(err.to_string())
            }
            RailError::Config(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<LotteryError> for ApiError {
    fn from(err: LotteryError) -> Self {
        match err {
            LotteryError::RoundNotActive => ApiError::Conflict(
                "Lottery round ended while you were paying. Your sats will carry over."
                    .to_string(),
            ),
            LotteryError::AmountOutOfRange { min, max } => {
                ApiError::BadRequest(format!("Amount must be between {min} and {max} sats."))
            }
            LotteryError::Store(err) => ApiError::Internal(err.to_string()),
            LotteryError::Rail(err) => ApiError::from(err),
        }
    }
}
