//! Gate status, QR rendering and settlement polling.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use l402_kit::challenge::qr_svg;
use l402_kit::rail::SettlementStatus;
use l402_kit::token::PaymentHash;
use serde_json::json;

use crate::config::{API_SUBMISSION_REWARD_SATS, APP_SUBMISSION_PRICE_SATS};
use crate::errors::ApiError;
use crate::state::SharedState;

pub async fn status(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let enabled = state.gate.is_some();
    Json(json!({
        "enabled": enabled,
        "appSubmissionCostSats": if enabled { APP_SUBMISSION_PRICE_SATS } else { 0 },
        "apiSubmissionRewardSats": API_SUBMISSION_REWARD_SATS,
    }))
}

/// Re-render the QR for a pending invoice. Instance-local: another instance
/// that did not issue the challenge will answer 404, and the client falls back
/// to the data URL embedded in the challenge body.
pub async fn qr(
    State(state): State<SharedState>,
    Path(payment_hash): Path<String>,
) -> Result<Response, ApiError> {
    let gate = state.gate.as_ref().ok_or(ApiError::PaymentsUnavailable)?;
    let payment_hash: PaymentHash = payment_hash
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid payment hash".to_string()))?;

    let invoice = gate
        .invoice_cache
        .get(&payment_hash)
        .ok_or_else(|| ApiError::NotFound("Invoice not found".to_string()))?;
    let svg = qr_svg(&invoice)
        .ok_or_else(|| ApiError::Internal("QR generation failed".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        svg,
    )
        .into_response())
}

/// Settlement poll target for browser clients waiting on a payment.
pub async fn check(
    State(state): State<SharedState>,
    Path(payment_hash): Path<String>,
) -> Result<Json<SettlementStatus>, ApiError> {
    let gate = state.gate.as_ref().ok_or(ApiError::PaymentsUnavailable)?;
    let payment_hash: PaymentHash = payment_hash
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid payment hash".to_string()))?;

    let status = gate.rail.settlement(&payment_hash).await?;
    Ok(Json(status))
}
