//! Payment-challenge body and the instance-local invoice cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::token::{Macaroon, PaymentHash};

/// JSON body of a 402 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub error: String,
    pub macaroon: Macaroon,
    /// BOLT11 payment request.
    pub invoice: String,
    pub payment_hash: PaymentHash,
    pub amount_sats: u64,
    /// Rendered QR data URL, best-effort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
}

/// Short-lived cache of recently issued invoices, keyed by payment hash.
///
/// Purely a convenience for re-rendering QR images on the same instance; it is
/// never authoritative and other instances will simply miss.
#[derive(Debug, Clone)]
pub struct InvoiceCache {
    ttl: Duration,
    inner: Arc<Mutex<HashMap<PaymentHash, CachedInvoice>>>,
}

#[derive(Debug, Clone)]
struct CachedInvoice {
    payment_request: String,
    inserted_at: Instant,
}

impl Default for InvoiceCache {
    fn default() -> Self {
        // Matches the invoice expiry the LND client requests.
        InvoiceCache::new(Duration::from_secs(3600))
    }
}

impl InvoiceCache {
    pub fn new(ttl: Duration) -> Self {
        InvoiceCache {
            ttl,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn insert(&self, payment_hash: PaymentHash, payment_request: String) {
        let mut map = self.inner.lock().expect("invoice cache lock poisoned");
        map.retain(|_, v| v.inserted_at.elapsed() < self.ttl);
        map.insert(
            payment_hash,
            CachedInvoice {
                payment_request,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, payment_hash: &PaymentHash) -> Option<String> {
        let map = self.inner.lock().expect("invoice cache lock poisoned");
        map.get(payment_hash)
            .filter(|v| v.inserted_at.elapsed() < self.ttl)
            .map(|v| v.payment_request.clone())
    }
}

/// Render a payment request as an SVG QR code.
///
/// BOLT11 strings are uppercased first so the QR encoder can use the denser
/// alphanumeric mode. Returns `None` if encoding fails; challenges are still
/// valid without a QR image.
#[cfg(feature = "qr")]
pub fn qr_svg(payment_request: &str) -> Option<String> {
    use qrcode::QrCode;
    use qrcode::render::svg;

    let code = QrCode::new(payment_request.to_uppercase().as_bytes()).ok()?;
    Some(
        code.render::<svg::Color>()
            .min_dimensions(220, 220)
            .dark_color(svg::Color("#e5e9f2"))
            .light_color(svg::Color("#0d111a"))
            .build(),
    )
}

/// [`qr_svg`] packaged as a data URL for embedding in the challenge body.
#[cfg(feature = "qr")]
pub fn qr_data_url(payment_request: &str) -> Option<String> {
    use base64::{Engine, prelude::BASE64_STANDARD};

    let svg = qr_svg(payment_request)?;
    Some(format!(
        "data:image/svg+xml;base64,{}",
        BASE64_STANDARD.encode(svg)
    ))
}
