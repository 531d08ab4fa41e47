//! Client-side settlement polling.
//!
//! After a 402 challenge the client holds a `(macaroon, payment_hash)` pair.
//! It polls the settlement-check endpoint until the invoice settles, then
//! retries the original request with `Authorization: L402 <macaroon>:<preimage>`.
//! There is no server-side push and no server-enforced timeout; bound the
//! polling yourself (or via `max_attempts`) against the invoice's own expiry.

use std::time::Duration;

use bon::Builder;
use url::Url;

use crate::rail::SettlementStatus;
use crate::token::PaymentHash;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("settlement check request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("settlement check returned {0}")]
    Status(http::StatusCode),
    #[error("invoice not settled after {0} checks")]
    Exhausted(u32),
}

/// Poll-until-settled client for the `GET …/check/{paymentHash}` contract.
#[derive(Builder, Debug, Clone)]
pub struct SettlementPoller {
    /// Base URL of the check endpoint, e.g. `https://host/api/l402/check/`.
    pub check_url: Url,
    #[builder(default = reqwest::Client::new())]
    pub client: reqwest::Client,
    /// Recommended 2.5–3s.
    #[builder(default = Duration::from_millis(2800))]
    pub interval: Duration,
    /// `None` polls until settled.
    pub max_attempts: Option<u32>,
}

impl SettlementPoller {
    /// Check the settlement state once.
    pub async fn check(&self, payment_hash: &PaymentHash) -> Result<SettlementStatus, PollError> {
        let url = self
            .check_url
            .join(&payment_hash.to_hex())
            .map_err(|_| PollError::Status(http::StatusCode::BAD_REQUEST))?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }
        Ok(response.json().await?)
    }

    /// Poll until the invoice settles, returning the hex preimage.
    pub async fn wait_for_settlement(
        &self,
        payment_hash: &PaymentHash,
    ) -> Result<String, PollError> {
        let mut attempts = 0u32;
        loop {
            let status = self.check(payment_hash).await?;
            if status.paid {
                if let Some(preimage) = status.preimage {
                    return Ok(preimage);
                }
            }

            attempts += 1;
            if let Some(max) = self.max_attempts
                && attempts >= max
            {
                return Err(PollError::Exhausted(attempts));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
