//! Paid listing boosts with dynamic pricing.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use l402_kit::pricing::boost_price;
use serde::Deserialize;
use serde_json::json;

use crate::boosts::{Boost, ItemType};
use crate::config::BASE_BOOST_SATS;
use crate::errors::ApiError;
use crate::state::SharedState;

pub async fn price(State(state): State<SharedState>) -> Result<Json<serde_json::Value>, ApiError> {
    let active = state.boosts.active_boosts().await?.len() as u64;
    let price_sats = boost_price(BASE_BOOST_SATS, active);
    Ok(Json(json!({
        "priceSats": price_sats,
        "activeBoosts": active,
        "basePrice": BASE_BOOST_SATS,
        "formula": format!("{BASE_BOOST_SATS} × (1 + {active})² = {price_sats}"),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostRequest {
    pub item_id: String,
    pub item_type: ItemType,
}

/// The price is computed at challenge time; the amount recorded on the boost
/// is re-read from the rail when the credential comes back, so a payer who
/// raced a price change gets credited what they actually paid.
pub async fn buy(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<BoostRequest>,
) -> Result<Response, ApiError> {
    let gate = state.gate.as_ref().ok_or(ApiError::PaymentsUnavailable)?;

    let active = state.boosts.active_boosts().await?.len() as u64;
    let price_sats = boost_price(BASE_BOOST_SATS, active);
    let paywall = gate.paywall(
        price_sats,
        format!("L402 Apps — Boost {} listing", request.item_type.as_str()),
    );

    let Some(authorization) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return Ok(paywall.challenge().await.into_response());
    };
    let proof = match paywall.verify(authorization) {
        Ok(proof) => proof,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let amount_sats = match gate.rail.lookup_invoice(&proof.payment_hash).await {
        Ok(invoice) if invoice.settled_amount() > 0 => invoice.settled_amount(),
        _ => price_sats,
    };

    let boost = Boost::new(
        request.item_id,
        request.item_type,
        amount_sats,
        proof.payment_hash,
        Utc::now(),
    );
    state.boosts.upsert_boost(&boost).await?;

    tracing::info!(
        item_id = %boost.item_id,
        item_type = boost.item_type.as_str(),
        amount_sats,
        "boost recorded"
    );

    Ok(Json(json!({ "success": true, "boost": boost })).into_response())
}
