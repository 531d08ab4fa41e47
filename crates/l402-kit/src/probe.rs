//! Remote L402 endpoint verification.
//!
//! Probes a URL with GET then POST and checks that it answers HTTP 402 with an
//! invoice, either in the `WWW-Authenticate` header or in a JSON body.

use std::time::Duration;

use http::Method;
use serde::Deserialize;
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "l402-kit/0.1";

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("endpoint is not payment gated: {0}")]
    NotPaymentGated(String),
    #[error("probe request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result of a successful probe.
#[derive(Debug, Clone)]
pub struct VerifiedEndpoint {
    /// The method that produced the 402.
    pub method: Method,
    /// Invoice extracted from the challenge, if any was present.
    pub invoice: Option<String>,
    pub www_authenticate: String,
}

#[derive(Debug, Deserialize)]
struct ChallengeBody {
    invoice: Option<String>,
}

/// Extract the quoted `invoice` parameter from a `WWW-Authenticate` value.
pub fn invoice_from_www_authenticate(value: &str) -> Option<String> {
    let start = value.find("invoice=\"")? + "invoice=\"".len();
    let end = value[start..].find('"')?;
    Some(value[start..start + end].to_string())
}

/// Verify that `url` speaks L402.
///
/// Tries GET first, then POST with an empty JSON body. The last failure reason
/// is reported when neither method yields a 402.
pub async fn verify_l402_endpoint(
    client: &reqwest::Client,
    url: &Url,
) -> Result<VerifiedEndpoint, ProbeError> {
    let mut last_error = String::new();

    for method in [Method::GET, Method::POST] {
        let mut request = client
            .request(method.clone(), url.clone())
            .timeout(PROBE_TIMEOUT)
            .header("user-agent", USER_AGENT);
        if method == Method::POST {
            request = request.json(&serde_json::json!({}));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                last_error = format!("{method} failed: {err}");
                continue;
            }
        };

        let status = response.status();
        if status != http::StatusCode::PAYMENT_REQUIRED {
            last_error = format!("{method} returned {status} (expected 402)");
            continue;
        }

        let www_authenticate = response
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let invoice = match invoice_from_www_authenticate(&www_authenticate) {
            Some(invoice) => Some(invoice),
            // Some gates only carry the invoice in the JSON body.
            None => response
                .json::<ChallengeBody>()
                .await
                .ok()
                .and_then(|body| body.invoice),
        };

        return Ok(VerifiedEndpoint {
            method,
            invoice,
            www_authenticate,
        });
    }

    Err(ProbeError::NotPaymentGated(if last_error.is_empty() {
        "endpoint did not return HTTP 402".to_string()
    } else {
        last_error
    }))
}
