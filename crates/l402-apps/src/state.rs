//! Shared application state.

use std::sync::Arc;

use l402_kit::challenge::InvoiceCache;
use l402_kit::rail::LightningRail;
use l402_kit::token::TokenCodec;
use l402_lottery::engine::LotteryEngine;
use l402_paywall::paywall::PayWall;

use crate::balance::{BalanceMonitor, Notifier};
use crate::boosts::BoostStore;
use crate::catalog::CatalogStore;

/// Everything needed to run an L402 gate. Absent when the node or token
/// secret is unconfigured, in which case gated routes pass through and
/// payment-only operations answer 503.
#[derive(Clone)]
pub struct Gate {
    pub rail: Arc<dyn LightningRail>,
    pub codec: TokenCodec,
    /// Shared across every paywall so the QR endpoint can re-render any
    /// challenge issued by this instance.
    pub invoice_cache: InvoiceCache,
}

impl Gate {
    /// A gate over one priced resource. Paywalls are cheap to assemble, so
    /// dynamically priced endpoints build one per request.
    pub fn paywall(
        &self,
        amount_sats: u64,
        memo: impl Into<String>,
    ) -> PayWall<Arc<dyn LightningRail>> {
        PayWall::builder()
            .rail(self.rail.clone())
            .codec(self.codec.clone())
            .amount_sats(amount_sats)
            .memo(memo)
            .invoice_cache(self.invoice_cache.clone())
            .build()
    }
}

pub struct AppState {
    pub gate: Option<Gate>,
    pub lottery: Option<Arc<LotteryEngine>>,
    pub boosts: Arc<dyn BoostStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub monitor: Option<Arc<BalanceMonitor>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    /// Outbound client for endpoint probes.
    pub http: reqwest::Client,
}

pub type SharedState = Arc<AppState>;
