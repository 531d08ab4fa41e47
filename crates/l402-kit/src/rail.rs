//! Payment rail adapter interface.
//!
//! The core consumes a Lightning node through this narrow seam; the LND REST
//! implementation lives in [`crate::lnd`], and tests substitute their own.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::token::PaymentHash;

/// A freshly created invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub payment_hash: PaymentHash,
    /// BOLT11 payment request, opaque to the core.
    pub payment_request: String,
}

/// Settlement state of an invoice as reported by the rail.
#[derive(Debug, Clone, Default)]
pub struct InvoiceState {
    pub settled: bool,
    /// Hex preimage, present once settled.
    pub preimage: Option<String>,
    /// Amount the invoice was created for.
    pub amount_sats: u64,
    /// Amount actually paid; may exceed `amount_sats` on overpayment.
    pub amount_paid_sats: u64,
}

impl InvoiceState {
    /// Amount to credit the payer with: the paid amount when the rail reports
    /// one, the invoiced amount otherwise.
    pub fn settled_amount(&self) -> u64 {
        if self.amount_paid_sats > 0 {
            self.amount_paid_sats
        } else {
            self.amount_sats
        }
    }
}

/// Poll response for the settlement-check endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementStatus {
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
}

/// Decoded BOLT11 payment request.
#[derive(Debug, Clone, Default)]
pub struct DecodedPaymentRequest {
    pub num_satoshis: u64,
    pub description: String,
}

/// A 33-byte compressed node public key, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePubkey(String);

impl NodePubkey {
    /// Accepts only `02`/`03`-prefixed 66-char hex.
    pub fn parse(hex_str: &str) -> Option<NodePubkey> {
        let valid = hex_str.len() == 66
            && (hex_str.starts_with("02") || hex_str.starts_with("03"))
            && hex_str.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| NodePubkey(hex_str.to_ascii_lowercase()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

/// Rail failures. Neither variant is fatal to the process; both are safe for
/// the caller to retry.
#[derive(Debug, thiserror::Error)]
pub enum RailError {
    /// Transport-level failure reaching the node.
    #[error("lightning rail unreachable: {0}")]
    Unreachable(String),
    /// The node answered and refused the request.
    #[error("lightning rail rejected request: {0}")]
    Rejected(String),
    /// The adapter itself is misconfigured.
    #[error("invalid rail configuration: {0}")]
    Config(String),
}

/// The payment-settlement network client consumed (never implemented) by the
/// access gate and the lottery engine.
#[async_trait]
pub trait LightningRail: Send + Sync {
    async fn create_invoice(&self, amount_sats: u64, memo: &str) -> Result<Invoice, RailError>;

    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceState, RailError>;

    async fn decode_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<DecodedPaymentRequest, RailError>;

    /// Pay a BOLT11 invoice.
    async fn pay_invoice(&self, payment_request: &str) -> Result<(), RailError>;

    /// Keyed spontaneous payment straight to a node.
    async fn keysend(&self, dest: &NodePubkey, amount_sats: u64) -> Result<(), RailError>;

    /// Total local channel balance, in sats.
    async fn channel_balance(&self) -> Result<u64, RailError>;

    /// Settlement status of an invoice, shaped for the polling contract.
    async fn settlement(&self, payment_hash: &PaymentHash) -> Result<SettlementStatus, RailError> {
        let state = self.lookup_invoice(payment_hash).await?;
        Ok(SettlementStatus {
            paid: state.settled,
            preimage: state.preimage,
        })
    }
}

#[async_trait]
impl<T: LightningRail + ?Sized> LightningRail for Arc<T> {
    async fn create_invoice(&self, amount_sats: u64, memo: &str) -> Result<Invoice, RailError> {
        (**self).create_invoice(amount_sats, memo).await
    }

    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceState, RailError> {
        (**self).lookup_invoice(payment_hash).await
    }

    async fn decode_payment_request(
        &self,
        payment_request: &str,
    ) -> Result<DecodedPaymentRequest, RailError> {
        (**self).decode_payment_request(payment_request).await
    }

    async fn pay_invoice(&self, payment_request: &str) -> Result<(), RailError> {
        (**self).pay_invoice(payment_request).await
    }

    async fn keysend(&self, dest: &NodePubkey, amount_sats: u64) -> Result<(), RailError> {
        (**self).keysend(dest, amount_sats).await
    }

    async fn channel_balance(&self) -> Result<u64, RailError> {
        (**self).channel_balance().await
    }
}

#[cfg(test)]
mod tests {
    use super::NodePubkey;

    #[test]
    fn pubkey_validation() {
        let valid = format!("02{}", "ab".repeat(32));
        assert!(NodePubkey::parse(&valid).is_some());
        assert!(NodePubkey::parse(&format!("03{}", "CD".repeat(32))).is_some());

        assert!(NodePubkey::parse(&format!("04{}", "ab".repeat(32))).is_none());
        assert!(NodePubkey::parse("02abcd").is_none());
        assert!(NodePubkey::parse(&format!("02{}", "zz".repeat(32))).is_none());
    }

    #[test]
    fn settled_amount_prefers_paid() {
        let state = super::InvoiceState {
            settled: true,
            preimage: None,
            amount_sats: 100,
            amount_paid_sats: 105,
        };
        assert_eq!(state.settled_amount(), 105);

        let unpaid_field = super::InvoiceState {
            amount_sats: 100,
            ..Default::default()
        };
        assert_eq!(unpaid_field.settled_amount(), 100);
    }
}
