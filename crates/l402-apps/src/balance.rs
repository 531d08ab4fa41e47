//! Low-balance watchdog and notification emails.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use l402_kit::rail::LightningRail;
use serde::Serialize;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const NOTIFY_COOLDOWN: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, html: &str) -> Result<(), NotifyError>;
}

/// Resend REST adapter.
pub struct ResendNotifier {
    http: reqwest::Client,
    api_key: String,
    from: String,
    to: String,
}

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl ResendNotifier {
    pub fn new(api_key: String, from: String, to: String) -> Self {
        ResendNotifier {
            http: reqwest::Client::new(),
            api_key,
            from,
            to,
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn notify(&self, subject: &str, html: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&ResendEmail {
                from: &self.from,
                to: [&self.to],
                subject,
                html,
            })
            .send()
            .await
            .map_err(|err| NotifyError(err.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError(format!("resend answered {}", response.status())));
        }
        Ok(())
    }
}

/// Checks the channel balance after outgoing payments and alerts when it drops
/// below the threshold, at most once per hour.
pub struct BalanceMonitor {
    rail: Arc<dyn LightningRail>,
    notifier: Option<Arc<dyn Notifier>>,
    threshold_sats: u64,
    last_notified: Mutex<Option<Instant>>,
}

impl BalanceMonitor {
    pub fn new(
        rail: Arc<dyn LightningRail>,
        notifier: Option<Arc<dyn Notifier>>,
        threshold_sats: u64,
    ) -> Self {
        BalanceMonitor {
            rail,
            notifier,
            threshold_sats,
            last_notified: Mutex::new(None),
        }
    }

    /// Fire-and-forget: the caller's response never waits on this.
    pub fn spawn_check(self: &Arc<Self>) {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = monitor.check().await {
                tracing::warn!("balance check failed: {err}");
            }
        });
    }

    async fn check(&self) -> Result<(), NotifyError> {
        let balance = self
            .rail
            .channel_balance()
            .await
            .map_err(|err| NotifyError(err.to_string()))?;
        if balance >= self.threshold_sats {
            return Ok(());
        }

        tracing::warn!(balance, threshold = self.threshold_sats, "low lightning balance");

        {
            let mut last = self
                .last_notified
                .lock()
                .map_err(|_| NotifyError("cooldown lock poisoned".to_string()))?;
            if last.map(|t| t.elapsed() < NOTIFY_COOLDOWN).unwrap_or(false) {
                return Ok(());
            }
            *last = Some(Instant::now());
        }

        if let Some(notifier) = &self.notifier {
            let html = format!(
                "<h2>Low Lightning Balance Warning</h2>\
                 <p>Your Lightning node balance is <strong>{balance} sats</strong>, \
                 which is below the {} sat threshold.</p>\
                 <p>Please add funds to continue paying API submission rewards.</p>",
                self.threshold_sats
            );
            notifier.notify("Low Lightning Balance", &html).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l402_kit::rail::{
        DecodedPaymentRequest, Invoice, InvoiceState, NodePubkey, RailError,
    };
    use l402_kit::token::PaymentHash;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBalanceRail(u64);

    #[async_trait]
    impl LightningRail for FixedBalanceRail {
        async fn create_invoice(&self, _: u64, _: &str) -> Result<Invoice, RailError> {
            Err(RailError::Rejected("unused".into()))
        }
        async fn lookup_invoice(&self, _: &PaymentHash) -> Result<InvoiceState, RailError> {
            Err(RailError::Rejected("unused".into()))
        }
        async fn decode_payment_request(
            &self,
            _: &str,
        ) -> Result<DecodedPaymentRequest, RailError> {
            Err(RailError::Rejected("unused".into()))
        }
        async fn pay_invoice(&self, _: &str) -> Result<(), RailError> {
            Ok(())
        }
        async fn keysend(&self, _: &NodePubkey, _: u64) -> Result<(), RailError> {
            Ok(())
        }
        async fn channel_balance(&self) -> Result<u64, RailError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct CountingNotifier(AtomicUsize);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _: &str, _: &str) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn healthy_balance_stays_quiet() {
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = BalanceMonitor::new(
            Arc::new(FixedBalanceRail(5000)),
            Some(notifier.clone()),
            1000,
        );
        monitor.check().await.unwrap();
        assert_eq!(notifier.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_balance_notifies_once_per_cooldown() {
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = BalanceMonitor::new(
            Arc::new(FixedBalanceRail(500)),
            Some(notifier.clone()),
            1000,
        );
        monitor.check().await.unwrap();
        monitor.check().await.unwrap();
        assert_eq!(notifier.0.load(Ordering::SeqCst), 1);
    }
}
