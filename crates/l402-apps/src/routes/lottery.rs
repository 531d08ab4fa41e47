//! Lottery state, history and paid entry.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use l402_kit::rail::NodePubkey;
use l402_lottery::types::{PayoutDestination, SafeRound};
use serde::Deserialize;
use serde_json::json;

use crate::errors::ApiError;
use crate::state::SharedState;

const DEFAULT_ENTRY_SATS: u64 = 100;

pub async fn current(State(state): State<SharedState>) -> Result<Json<SafeRound>, ApiError> {
    let engine = state.lottery.as_ref().ok_or(ApiError::PaymentsUnavailable)?;
    let round = engine.ensure_active().await?;
    Ok(Json(SafeRound::from(&round)))
}

pub async fn history(State(state): State<SharedState>) -> Result<Json<Vec<SafeRound>>, ApiError> {
    let engine = state.lottery.as_ref().ok_or(ApiError::PaymentsUnavailable)?;
    // Reads advance the round; a finished round is drawn before history is
    // served.
    engine.ensure_active().await?;
    let rounds = engine.history().await?;
    Ok(Json(rounds.iter().map(SafeRound::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterRequest {
    pub amount_sats: Option<u64>,
    pub lightning_address: Option<String>,
    pub node_pubkey: Option<String>,
}

impl EnterRequest {
    /// A lightning address wins when both payout methods are supplied.
    fn destination(&self) -> Option<PayoutDestination> {
        if let Some(address) = self.lightning_address.as_ref().filter(|a| a.contains('@')) {
            return Some(PayoutDestination::LightningAddress(address.clone()));
        }
        self.node_pubkey
            .as_deref()
            .and_then(NodePubkey::parse)
            .map(PayoutDestination::NodePubkey)
    }
}

pub async fn enter(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<EnterRequest>,
) -> Result<Response, ApiError> {
    let engine = state.lottery.as_ref().ok_or(ApiError::PaymentsUnavailable)?;
    let gate = state.gate.as_ref().ok_or(ApiError::PaymentsUnavailable)?;

    let destination = request.destination().ok_or_else(|| {
        ApiError::BadRequest(
            "Provide either a Lightning Address (e.g. user@wallet.com) or a node pubkey \
             (66-char hex starting with 02/03)."
                .to_string(),
        )
    })?;

    let amount_sats = request.amount_sats.unwrap_or(DEFAULT_ENTRY_SATS);
    let (min, max) = (engine.config().min_sats, engine.config().max_sats);
    if amount_sats < min || amount_sats > max {
        return Err(ApiError::BadRequest(format!(
            "Amount must be between {min} and {max} sats."
        )));
    }

    let paywall = gate.paywall(
        amount_sats,
        format!("Lightning Lottery — {amount_sats} sat entry"),
    );

    let Some(authorization) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return Ok(paywall.challenge().await.into_response());
    };
    let proof = match paywall.verify(authorization) {
        Ok(proof) => proof,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let outcome = engine
        .enter(destination, amount_sats, proof.payment_hash)
        .await?;

    Ok(Json(json!({
        "success": true,
        "entry": {
            "amountSats": outcome.entry.amount_sats,
            "paidAt": outcome.entry.paid_at,
        },
        "lottery": SafeRound::from(&outcome.round),
    }))
    .into_response())
}
