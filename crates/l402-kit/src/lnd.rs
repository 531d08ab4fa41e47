//! LND REST implementation of the payment rail adapter.
//!
//! A thin client over the LND REST API: macaroon header auth, 8s request
//! timeout, and optional TLS-verification bypass for the self-signed
//! certificates LND nodes typically serve.

use std::time::Duration;

use async_trait::async_trait;
use base64::{
    Engine,
    prelude::{BASE64_STANDARD, BASE64_URL_SAFE},
};
use bon::Builder;
use rand::RngCore;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::rail::{
    DecodedPaymentRequest, Invoice, InvoiceState, LightningRail, NodePubkey, RailError,
};
use crate::token::{PaymentHash, hash_preimage};

/// Invoice expiry requested on creation, in seconds.
const INVOICE_EXPIRY_SECS: u64 = 3600;
/// Flat fee limit for outgoing payments, in sats.
const FEE_LIMIT_SATS: u64 = 10;
/// TLV record carrying the keysend preimage.
const KEYSEND_PREIMAGE_RECORD: &str = "5482373484";

/// LND REST connection settings.
#[derive(Builder, Debug, Clone)]
pub struct LndConfig {
    /// Base URL of the LND REST endpoint, e.g. `https://node:8080`.
    pub rest_host: Url,
    /// Hex-encoded admin (or invoice+offchain) macaroon.
    #[builder(into)]
    pub macaroon_hex: String,
    /// Accept self-signed TLS certificates.
    #[builder(default = true)]
    pub accept_invalid_certs: bool,
    /// Per-request timeout.
    #[builder(default = Duration::from_secs(8))]
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LndRestClient {
    base_url: Url,
    macaroon_hex: String,
    client: reqwest::Client,
}

impl LndRestClient {
    pub fn new(config: LndConfig) -> Result<Self, RailError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|err| RailError::Config(err.to_string()))?;

        Ok(LndRestClient {
            base_url: config.rest_host,
            macaroon_hex: config.macaroon_hex,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RailError> {
        self.base_url
            .join(path)
            .map_err(|err| RailError::Config(format!("bad LND path {path}: {err}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RailError> {
        let response = self
            .client
            .get(self.endpoint(path)?)
            .header("Grpc-Metadata-macaroon", &self.macaroon_hex)
            .send()
            .await
            .map_err(|err| RailError::Unreachable(err.to_string()))?;
        Self::decode(path, response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, RailError> {
        let response = self
            .client
            .post(self.endpoint(path)?)
            .header("Grpc-Metadata-macaroon", &self.macaroon_hex)
            .json(body)
            .send()
            .await
            .map_err(|err| RailError::Unreachable(err.to_string()))?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, RailError> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RailError::Rejected(format!("{path}: {status} — {text}")));
        }
        response
            .json()
            .await
            .map_err(|err| RailError::Rejected(format!("{path}: invalid response: {err}")))
    }
}

/* ── LND wire types (numeric fields are decimal strings) ── */

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
    /// Payment hash, standard base64.
    r_hash: String,
    payment_request: String,
}

#[derive(Debug, Default, Deserialize)]
struct LndInvoice {
    #[serde(default)]
    settled: bool,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    r_preimage: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    amt_paid_sat: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PayReq {
    #[serde(default)]
    num_satoshis: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    payment_error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelBalanceResponse {
    #[serde(default)]
    balance: Option<String>,
}

fn parse_sats(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

impl TryFrom<LndInvoice> for InvoiceState {
    type Error = RailError;

    fn try_from(invoice: LndInvoice) -> Result<Self, RailError> {
        let settled = invoice.settled || invoice.state.as_deref() == Some("SETTLED");
        let preimage = match (&settled, invoice.r_preimage.as_deref()) {
            (true, Some(b64)) if !b64.is_empty() => Some(hex::encode(
                BASE64_STANDARD
                    .decode(b64)
                    .map_err(|err| RailError::Rejected(format!("bad preimage encoding: {err}")))?,
            )),
            _ => None,
        };
        Ok(InvoiceState {
            settled,
            preimage,
            amount_sats: parse_sats(invoice.value.as_deref()),
            amount_paid_sats: parse_sats(invoice.amt_paid_sat.as_deref()),
        })
    }
}

#[async_trait]
impl LightningRail for LndRestClient {
    async fn create_invoice(&self, amount_sats: u64, memo: &str) -> Result<Invoice, RailError> {
        let body = json!({
            "value": amount_sats.to_string(),
            "memo": memo,
            "expiry": INVOICE_EXPIRY_SECS.to_string(),
        });
        let response: AddInvoiceResponse = self.post_json("/v1/invoices", &body).await?;

        let hash_bytes = BASE64_STANDARD
            .decode(&response.r_hash)
            .map_err(|err| RailError::Rejected(format!("bad r_hash encoding: {err}")))?;
        let payment_hash: PaymentHash = hex::encode(hash_bytes)
            .parse()
            .map_err(|err| RailError::Rejected(format!("bad r_hash: {err}")))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%payment_hash, amount_sats, "created invoice");

        Ok(Invoice {
            payment_hash,
            payment_request: response.payment_request,
        })
    }

    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceState, RailError> {
        // Prefer the v2 lookup; older nodes only expose the v1 route.
        let encoded = BASE64_URL_SAFE.encode(payment_hash.as_bytes());
        let v2 = self
            .get_json::<LndInvoice>(&format!("/v2/invoices/lookup?payment_hash={encoded}"))
            .await;
        let invoice = match v2 {
            Ok(invoice) => invoice,
            Err(_) => {
                self.get_json::<LndInvoice>(&format!("/v1/invoice/{}", payment_hash.to_hex()))
                    .await?
            }
        };
        invoice.try_into()
    }

    async fn decode_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<DecodedPaymentRequest, RailError> {
        let decoded: PayReq = self.get_json(&format!("/v1/payreq/{payment_request}")).await?;
        Ok(DecodedPaymentRequest {
            num_satoshis: parse_sats(decoded.num_satoshis.as_deref()),
            description: decoded.description.unwrap_or_default(),
        })
    }

    async fn pay_invoice(&self, payment_request: &str) -> Result<(), RailError> {
        let body = json!({
            "payment_request": payment_request,
            "fee_limit": { "fixed": FEE_LIMIT_SATS.to_string() },
        });
        let response: SendResponse = self.post_json("/v1/channels/transactions", &body).await?;
        match response.payment_error.as_deref() {
            Some(err) if !err.is_empty() => Err(RailError::Rejected(format!(
                "payment failed: {err}"
            ))),
            _ => Ok(()),
        }
    }

    async fn keysend(&self, dest: &NodePubkey, amount_sats: u64) -> Result<(), RailError> {
        let mut preimage = [0u8; 32];
        rand::rng().fill_bytes(&mut preimage);
        let payment_hash = hash_preimage(&preimage);

        let dest_bytes = hex::decode(dest.as_hex())
            .map_err(|err| RailError::Config(format!("bad destination pubkey: {err}")))?;

        let body = json!({
            "dest": BASE64_STANDARD.encode(dest_bytes),
            "amt": amount_sats.to_string(),
            "payment_hash": BASE64_STANDARD.encode(payment_hash.as_bytes()),
            "final_cltv_delta": 40,
            "dest_custom_records": {
                KEYSEND_PREIMAGE_RECORD: BASE64_STANDARD.encode(preimage),
            },
            "fee_limit": { "fixed": FEE_LIMIT_SATS.to_string() },
        });
        let response: SendResponse = self.post_json("/v1/channels/transactions", &body).await?;
        match response.payment_error.as_deref() {
            Some(err) if !err.is_empty() => Err(RailError::Rejected(format!(
                "keysend failed: {err}"
            ))),
            _ => Ok(()),
        }
    }

    async fn channel_balance(&self) -> Result<u64, RailError> {
        let response: ChannelBalanceResponse = self.get_json("/v1/balance/channels").await?;
        Ok(parse_sats(response.balance.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_invoice_decodes_preimage() {
        let raw: LndInvoice = serde_json::from_value(json!({
            "state": "SETTLED",
            "r_preimage": BASE64_STANDARD.encode([7u8; 32]),
            "value": "100",
            "amt_paid_sat": "105"
        }))
        .unwrap();
        let state: InvoiceState = raw.try_into().unwrap();
        assert!(state.settled);
        assert_eq!(state.preimage.as_deref(), Some(hex::encode([7u8; 32]).as_str()));
        assert_eq!(state.settled_amount(), 105);
    }

    #[test]
    fn open_invoice_has_no_preimage() {
        let raw: LndInvoice = serde_json::from_value(json!({
            "settled": false,
            "state": "OPEN",
            "value": "100"
        }))
        .unwrap();
        let state: InvoiceState = raw.try_into().unwrap();
        assert!(!state.settled);
        assert_eq!(state.preimage, None);
        assert_eq!(state.settled_amount(), 100);
    }

    #[test]
    fn missing_numeric_fields_parse_as_zero() {
        assert_eq!(parse_sats(None), 0);
        assert_eq!(parse_sats(Some("")), 0);
        assert_eq!(parse_sats(Some("42")), 42);
    }
}
