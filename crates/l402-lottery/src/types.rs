//! Lottery data model and its externally-safe projection.

use chrono::{DateTime, Utc};
use l402_kit::{rail::NodePubkey, token::PaymentHash};
use serde::{Deserialize, Serialize};

use crate::round::RoundBounds;

/// Where a winner gets paid. Exactly one payout method per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutDestination {
    /// LNURL-pay address, `user@domain`.
    LightningAddress(String),
    /// Direct keysend target.
    NodePubkey(NodePubkey),
}

impl PayoutDestination {
    /// Redacted rendering, safe to expose.
    pub fn masked(&self) -> String {
        match self {
            PayoutDestination::LightningAddress(address) => mask_lightning_address(address),
            PayoutDestination::NodePubkey(pubkey) => truncate_pubkey(pubkey.as_hex()),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            PayoutDestination::LightningAddress(_) => "lightning_address",
            PayoutDestination::NodePubkey(_) => "keysend",
        }
    }
}

/// Partially redact a lightning address: `brian@wallet.com` → `br***@wa***.com`.
pub fn mask_lightning_address(address: &str) -> String {
    let Some((user, domain)) = address.split_once('@') else {
        return "***@***.com".to_string();
    };
    if user.is_empty() || domain.is_empty() {
        return "***@***.com".to_string();
    }
    let masked_user = format!("{}***", truncated(user, 2));
    let (name, tld) = match domain.rsplit_once('.') {
        Some((name, tld)) => (name, tld),
        None => (domain, "com"),
    };
    format!("{masked_user}@{}***.{tld}", truncated(name, 2))
}

/// Truncate a pubkey to `02abcdef...beef`.
pub fn truncate_pubkey(hex_str: &str) -> String {
    if hex_str.len() < 12 {
        return "unknown".to_string();
    }
    format!("{}...{}", &hex_str[..8], &hex_str[hex_str.len() - 4..])
}

fn truncated(s: &str, n: usize) -> &str {
    let end = s
        .char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Active,
    Drawing,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Paid,
    Failed,
}

/// One paid entry. `amount_sats` is the amount actually settled on the rail,
/// never the amount the client asked for.
#[derive(Debug, Clone)]
pub struct Entry {
    pub destination: PayoutDestination,
    pub amount_sats: u64,
    pub paid_at: DateTime<Utc>,
    /// Idempotency key: at most one entry per payment hash within a round.
    pub payment_hash: PaymentHash,
}

/// Draw outcome. Never rolled back: a failed payout leaves the round completed
/// with the error on record.
#[derive(Debug, Clone)]
pub struct Winner {
    pub destination: PayoutDestination,
    pub amount_contributed: u64,
    pub payout: u64,
    pub house_cut: u64,
    pub payout_status: PayoutStatus,
    pub payout_error: Option<String>,
}

/// One lottery round. The id is derived from wall-clock time, so concurrent
/// instances converge on the same round without coordination.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub entries: Vec<Entry>,
    pub total_pot: u64,
    pub status: RoundStatus,
    pub winner: Option<Winner>,
}

impl Round {
    pub fn new(bounds: &RoundBounds) -> Self {
        Round {
            id: bounds.id.clone(),
            started_at: bounds.started_at,
            ends_at: bounds.ends_at,
            entries: Vec::new(),
            total_pot: 0,
            status: RoundStatus::Active,
            winner: None,
        }
    }

    /// Rounds are half-open: the instant `ends_at` already belongs to the
    /// next round.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ends_at
    }

    pub fn find_entry(&self, payment_hash: &PaymentHash) -> Option<&Entry> {
        self.entries.iter().find(|e| &e.payment_hash == payment_hash)
    }
}

/* ── Externally-visible projection ── */

/// Round state safe to expose: entry destinations are dropped entirely and the
/// winner's destination is masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeRound {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub total_pot: u64,
    pub entry_count: usize,
    pub status: RoundStatus,
    pub entries: Vec<SafeEntry>,
    pub winner: Option<SafeWinner>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeEntry {
    pub amount_sats: u64,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeWinner {
    pub masked_address: String,
    pub payout_method: &'static str,
    pub amount_contributed: u64,
    pub payout: u64,
    pub payout_status: PayoutStatus,
}

impl From<&Round> for SafeRound {
    fn from(round: &Round) -> Self {
        SafeRound {
            id: round.id.clone(),
            started_at: round.started_at,
            ends_at: round.ends_at,
            total_pot: round.total_pot,
            entry_count: round.entries.len(),
            status: round.status,
            entries: round
                .entries
                .iter()
                .map(|e| SafeEntry {
                    amount_sats: e.amount_sats,
                    paid_at: e.paid_at,
                })
                .collect(),
            winner: round.winner.as_ref().map(|w| SafeWinner {
                masked_address: w.destination.masked(),
                payout_method: w.destination.method(),
                amount_contributed: w.amount_contributed,
                payout: w.payout,
                payout_status: w.payout_status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_lightning_addresses() {
        assert_eq!(mask_lightning_address("brian@wallet.com"), "br***@wa***.com");
        assert_eq!(mask_lightning_address("al@strike.me"), "al***@st***.me");
        assert_eq!(mask_lightning_address("x@sub.domain.io"), "x***@su***.io");
        assert_eq!(mask_lightning_address("not-an-address"), "***@***.com");
        assert_eq!(mask_lightning_address("@nobody"), "***@***.com");
    }

    #[test]
    fn truncates_pubkeys() {
        let hex = format!("02{}", "ab".repeat(32));
        let truncated = truncate_pubkey(&hex);
        assert_eq!(truncated, "02ababab...abab");
        assert!(truncated.len() < hex.len());
    }

    #[test]
    fn safe_round_never_leaks_destinations() {
        let address = "satoshi@bitcoin.org".to_string();
        let bounds = crate::round::RoundClock::default().bounds(chrono::Utc::now());
        let mut round = Round::new(&bounds);
        round.entries.push(Entry {
            destination: PayoutDestination::LightningAddress(address.clone()),
            amount_sats: 100,
            paid_at: chrono::Utc::now(),
            payment_hash: l402_kit::token::PaymentHash([1u8; 32]),
        });
        round.total_pot = 100;
        round.winner = Some(Winner {
            destination: PayoutDestination::LightningAddress(address.clone()),
            amount_contributed: 100,
            payout: 100,
            house_cut: 0,
            payout_status: PayoutStatus::Paid,
            payout_error: None,
        });

        let safe = SafeRound::from(&round);
        let json = serde_json::to_string(&safe).unwrap();
        assert!(!json.contains(&address));
        assert!(json.contains("sa***@bi***.org"));
        assert_eq!(safe.entry_count, 1);
    }
}
