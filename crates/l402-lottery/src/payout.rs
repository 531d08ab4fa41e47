//! Winner payout dispatch.
//!
//! Lightning addresses go through LNURL-pay resolution: fetch the payout
//! descriptor from the address's well-known endpoint, validate the amount
//! against its advertised bounds, request an invoice from its callback, then
//! pay it on the rail. Node pubkeys get a direct keysend.

use std::time::Duration;

use l402_kit::rail::{LightningRail, RailError};
use serde::Deserialize;

use crate::types::PayoutDestination;

const LNURL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("invalid lightning address: {0}")]
    InvalidAddress(String),
    #[error("lnurl-pay endpoint error: {0}")]
    Lnurl(String),
    #[error("lnurl request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Rail(#[from] RailError),
}

/// LNURL-pay descriptor, from `https://{domain}/.well-known/lnurlp/{user}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayDescriptor {
    tag: String,
    callback: String,
    /// Millisats.
    min_sendable: u64,
    /// Millisats.
    max_sendable: u64,
}

#[derive(Debug, Deserialize)]
struct CallbackResponse {
    /// BOLT11 payment request.
    pr: Option<String>,
}

/// Pay `amount_sats` to the destination over the rail.
pub async fn dispatch(
    rail: &dyn LightningRail,
    http: &reqwest::Client,
    destination: &PayoutDestination,
    amount_sats: u64,
) -> Result<(), PayoutError> {
    match destination {
        PayoutDestination::LightningAddress(address) => {
            pay_lightning_address(rail, http, address, amount_sats).await
        }
        PayoutDestination::NodePubkey(pubkey) => {
            rail.keysend(pubkey, amount_sats).await?;
            Ok(())
        }
    }
}

async fn pay_lightning_address(
    rail: &dyn LightningRail,
    http: &reqwest::Client,
    address: &str,
    amount_sats: u64,
) -> Result<(), PayoutError> {
    let (user, domain) = address
        .split_once('@')
        .filter(|(user, domain)| !user.is_empty() && !domain.is_empty())
        .ok_or_else(|| PayoutError::InvalidAddress(address.to_string()))?;

    let descriptor_url = format!("https://{domain}/.well-known/lnurlp/{user}");
    let response = http
        .get(&descriptor_url)
        .timeout(LNURL_TIMEOUT)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(PayoutError::Lnurl(format!(
            "descriptor fetch failed: {}",
            response.status()
        )));
    }
    let descriptor: PayDescriptor = response.json().await?;

    if descriptor.tag != "payRequest" {
        return Err(PayoutError::Lnurl(format!(
            "not an lnurl-pay endpoint (tag {})",
            descriptor.tag
        )));
    }

    let millisats = amount_sats * 1000;
    if millisats < descriptor.min_sendable || millisats > descriptor.max_sendable {
        return Err(PayoutError::Lnurl(format!(
            "{amount_sats} sats outside sendable range [{}, {}] msat",
            descriptor.min_sendable, descriptor.max_sendable
        )));
    }

    let mut callback = url::Url::parse(&descriptor.callback)
        .map_err(|err| PayoutError::Lnurl(format!("bad callback url: {err}")))?;
    callback
        .query_pairs_mut()
        .append_pair("amount", &millisats.to_string());

    let response = http.get(callback).timeout(LNURL_TIMEOUT).send().await?;
    if !response.status().is_success() {
        return Err(PayoutError::Lnurl(format!(
            "invoice request failed: {}",
            response.status()
        )));
    }
    let invoice: CallbackResponse = response.json().await?;
    let pr = invoice
        .pr
        .filter(|pr| !pr.is_empty())
        .ok_or_else(|| PayoutError::Lnurl("no invoice returned from callback".to_string()))?;

    rail.pay_invoice(&pr).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_lud06_shape() {
        let descriptor: PayDescriptor = serde_json::from_value(serde_json::json!({
            "tag": "payRequest",
            "callback": "https://wallet.com/lnurlp/brian/callback",
            "minSendable": 1000,
            "maxSendable": 100_000_000,
            "metadata": "[[\"text/plain\",\"payout\"]]"
        }))
        .unwrap();
        assert_eq!(descriptor.tag, "payRequest");
        assert_eq!(descriptor.min_sendable, 1000);
    }
}
