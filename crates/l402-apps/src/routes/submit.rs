//! Listing submissions.
//!
//! Apps pay to get listed; API submitters get paid. The API reward flow
//! verifies the submitted endpoint actually speaks L402, requires an invoice
//! for exactly the reward amount, pays it, then checks the remaining channel
//! balance in the background.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use l402_kit::probe;
use serde::Deserialize;
use url::Url;

use crate::catalog::{ApiListing, AppListing, CostType, url_to_id};
use crate::config::{API_SUBMISSION_REWARD_SATS, APP_SUBMISSION_PRICE_SATS};
use crate::errors::ApiError;
use crate::state::SharedState;

fn normalize_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).ok()?;
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

fn provider_and_icon(url: &Url) -> (String, Option<String>) {
    let provider = url
        .host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_string();
    let icon = Some(format!("{}/favicon.ico", url.origin().ascii_serialization()));
    (provider, icon)
}

fn spawn_notification(state: &SharedState, subject: String, html: String) {
    if let Some(notifier) = state.notifier.clone() {
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(&subject, &html).await {
                tracing::warn!("submission notification failed: {err}");
            }
        });
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSubmission {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Paid app listing. Gated when payments are configured; free otherwise.
pub async fn submit_app(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(submission): Json<AppSubmission>,
) -> Result<Response, ApiError> {
    let name = submission.name.trim().to_string();
    let url = normalize_url(&submission.url);
    let (Some(url), false) = (url, name.is_empty()) else {
        return Err(ApiError::BadRequest("Name and URL are required.".to_string()));
    };

    if let Some(gate) = &state.gate {
        let paywall = gate.paywall(APP_SUBMISSION_PRICE_SATS, "L402 Apps — Submit an app");
        let Some(authorization) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
        else {
            return Ok(paywall.challenge().await.into_response());
        };
        if let Err(rejection) = paywall.verify(authorization) {
            return Ok(rejection.into_response());
        }
    }

    if state.catalog.has_app_url(url.as_str()).await? {
        return Err(ApiError::Conflict("This app is already listed.".to_string()));
    }

    let listing = AppListing {
        id: url_to_id(url.as_str()),
        name: name.clone(),
        url: url.to_string(),
        description: submission.description.filter(|d| !d.trim().is_empty()),
        icon: submission.icon.filter(|i| !i.trim().is_empty()),
        featured: false,
        submitted_at: Utc::now(),
        boost: None,
    };
    state.catalog.insert_app(&listing).await?;

    spawn_notification(
        &state,
        format!("New app submission: {name}"),
        format!("<p><strong>{name}</strong> — {}</p>", listing.url),
    );

    Ok(Json(listing).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSubmission {
    pub url: String,
    /// BOLT11 invoice for the reward, required when payments are configured.
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reward flow: the site pays the submitter for a verified L402 API listing.
pub async fn submit_api(
    State(state): State<SharedState>,
    Json(submission): Json<ApiSubmission>,
) -> Result<Response, ApiError> {
    let url = normalize_url(&submission.url).ok_or_else(|| {
        ApiError::BadRequest("A valid API endpoint URL is required.".to_string())
    })?;

    if state.catalog.has_api_endpoint(url.as_str()).await? {
        return Err(ApiError::Conflict(
            "This API endpoint is already listed.".to_string(),
        ));
    }

    let verification = probe::verify_l402_endpoint(&state.http, &url)
        .await
        .map_err(|err| ApiError::BadRequest(format!("Not a valid L402 endpoint: {err}")))?;

    // Decode the challenge invoice for cost and description, best effort.
    let mut cost = None;
    let mut cost_type = CostType::Variable;
    let mut description = String::new();
    if let (Some(gate), Some(invoice)) = (&state.gate, &verification.invoice) {
        match gate.rail.decode_payment_request(invoice).await {
            Ok(decoded) => {
                if decoded.num_satoshis > 0 {
                    cost = Some(decoded.num_satoshis);
                    cost_type = CostType::Fixed;
                }
                description = decoded.description;
            }
            Err(err) => tracing::warn!("challenge invoice decode failed: {err}"),
        }
    }
    if let Some(user_description) = submission.description.as_deref() {
        if !user_description.trim().is_empty() {
            description = user_description.trim().to_string();
        }
    }

    if let Some(gate) = &state.gate {
        let reward_invoice = submission
            .invoice
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "A Lightning invoice for {API_SUBMISSION_REWARD_SATS} sats is required \
                     to receive your reward."
                ))
            })?;

        let decoded = gate
            .rail
            .decode_payment_request(reward_invoice)
            .await
            .map_err(|_| {
                ApiError::BadRequest(
                    "Could not decode your Lightning invoice. Please provide a valid \
                     bolt11 invoice."
                        .to_string(),
                )
            })?;
        if decoded.num_satoshis != API_SUBMISSION_REWARD_SATS {
            return Err(ApiError::BadRequest(format!(
                "Invoice must be for exactly {API_SUBMISSION_REWARD_SATS} sats (got {} sats).",
                decoded.num_satoshis
            )));
        }

        gate.rail.pay_invoice(reward_invoice).await.map_err(|err| {
            ApiError::Upstream(format!(
                "Payment failed. Please check your invoice and try again. {err}"
            ))
        })?;

        if let Some(monitor) = &state.monitor {
            monitor.spawn_check();
        }
    }

    let (provider, icon) = provider_and_icon(&url);
    let listing = ApiListing {
        id: url_to_id(url.as_str()),
        name: if description.is_empty() {
            format!("{provider} API")
        } else {
            description.clone()
        },
        provider,
        method: Some(verification.method.to_string()),
        endpoint: url.to_string(),
        description: (!description.is_empty()).then_some(description),
        cost,
        cost_type,
        icon,
        verified: true,
        verified_at: Some(Utc::now()),
        submitted_at: Utc::now(),
        featured: false,
        boost: None,
    };
    state.catalog.insert_api(&listing).await?;

    spawn_notification(
        &state,
        format!("New API submission: {}", listing.name),
        format!("<p><strong>{}</strong> — {}</p>", listing.name, listing.endpoint),
    );

    Ok(Json(listing).into_response())
}
