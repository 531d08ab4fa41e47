//! Supabase PostgREST storage adapter.
//!
//! One HTTP client serves all three storage seams: lottery rounds and entries,
//! boosts, and the app/API catalog. Upserts go through `Prefer:
//! resolution=merge-duplicates` keyed on the row id, which is what lets
//! concurrent stateless instances write the same round or boost without
//! conflict errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use l402_kit::rail::NodePubkey;
use l402_kit::token::PaymentHash;
use l402_lottery::store::{LotteryStore, StoreError};
use l402_lottery::types::{
    Entry, PayoutDestination, PayoutStatus, Round, RoundStatus, Winner,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::boosts::{Boost, BoostStore, ItemType};
use crate::catalog::{ApiListing, AppListing, CatalogStore, CostType};

pub struct PostgrestStore {
    http: reqwest::Client,
    base: String,
    key: String,
}

impl PostgrestStore {
    /// `base_url` is the Supabase project URL; the REST prefix is appended.
    pub fn new(base_url: &str, service_role_key: &str) -> Self {
        PostgrestStore {
            http: reqwest::Client::new(),
            base: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            key: service_role_key.to_string(),
        }
    }

    async fn select<T: DeserializeOwned>(&self, query: &str) -> Result<Vec<T>, StoreError> {
        let response = self
            .http
            .get(format!("{}/{query}", self.base))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .send()
            .await
            .map_err(|err| StoreError(format!("postgrest select: {err}")))?;
        if !response.status().is_success() {
            return Err(StoreError(format!(
                "postgrest select {query}: {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| StoreError(format!("postgrest decode: {err}")))
    }

    async fn write<T: Serialize>(
        &self,
        query: &str,
        row: &T,
        resolution: &str,
    ) -> Result<(), StoreError> {
        let response = self
            .http
            .post(format!("{}/{query}", self.base))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", format!("resolution={resolution}"))
            .json(row)
            .send()
            .await
            .map_err(|err| StoreError(format!("postgrest write: {err}")))?;
        if !response.status().is_success() {
            return Err(StoreError(format!(
                "postgrest write {query}: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/* ── Lottery rows ── */

#[derive(Debug, Serialize, Deserialize)]
struct RoundRow {
    id: String,
    started_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    total_pot: u64,
    status: RoundStatus,
    winner_address: Option<String>,
    winner_pubkey: Option<String>,
    winner_amount_contributed: Option<u64>,
    winner_payout: Option<u64>,
    winner_house_cut: Option<u64>,
    winner_payout_status: Option<PayoutStatus>,
    winner_payout_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryRow {
    round_id: String,
    lightning_address: Option<String>,
    node_pubkey: Option<String>,
    amount_sats: u64,
    payment_hash: Option<String>,
    paid_at: DateTime<Utc>,
}

fn destination_from(
    address: Option<String>,
    pubkey: Option<String>,
) -> Option<PayoutDestination> {
    if let Some(address) = address.filter(|a| a.contains('@')) {
        return Some(PayoutDestination::LightningAddress(address));
    }
    pubkey
        .as_deref()
        .and_then(NodePubkey::parse)
        .map(PayoutDestination::NodePubkey)
}

fn destination_columns(destination: &PayoutDestination) -> (Option<String>, Option<String>) {
    match destination {
        PayoutDestination::LightningAddress(address) => (Some(address.clone()), None),
        PayoutDestination::NodePubkey(pubkey) => (None, Some(pubkey.as_hex().to_string())),
    }
}

impl RoundRow {
    fn from_round(round: &Round) -> Self {
        let winner = round.winner.as_ref();
        let (winner_address, winner_pubkey) = winner
            .map(|w| destination_columns(&w.destination))
            .unwrap_or((None, None));
        RoundRow {
            id: round.id.clone(),
            started_at: round.started_at,
            ends_at: round.ends_at,
            total_pot: round.total_pot,
            status: round.status,
            winner_address,
            winner_pubkey,
            winner_amount_contributed: winner.map(|w| w.amount_contributed),
            winner_payout: winner.map(|w| w.payout),
            winner_house_cut: winner.map(|w| w.house_cut),
            winner_payout_status: winner.map(|w| w.payout_status),
            winner_payout_error: winner.and_then(|w| w.payout_error.clone()),
        }
    }

    fn into_round(self, entries: Vec<Entry>) -> Round {
        let winner = self.winner_payout_status.and_then(|payout_status| {
            let destination = destination_from(self.winner_address, self.winner_pubkey)?;
            Some(Winner {
                destination,
                amount_contributed: self.winner_amount_contributed.unwrap_or(0),
                payout: self.winner_payout.unwrap_or(0),
                house_cut: self.winner_house_cut.unwrap_or(0),
                payout_status,
                payout_error: self.winner_payout_error,
            })
        });
        Round {
            id: self.id,
            started_at: self.started_at,
            ends_at: self.ends_at,
            entries,
            total_pot: self.total_pot,
            status: self.status,
            winner,
        }
    }
}

impl EntryRow {
    fn from_entry(round_id: &str, entry: &Entry) -> Self {
        let (lightning_address, node_pubkey) = destination_columns(&entry.destination);
        EntryRow {
            round_id: round_id.to_string(),
            lightning_address,
            node_pubkey,
            amount_sats: entry.amount_sats,
            payment_hash: Some(entry.payment_hash.to_hex()),
            paid_at: entry.paid_at,
        }
    }

    fn into_entry(self) -> Option<Entry> {
        let destination = destination_from(self.lightning_address, self.node_pubkey)?;
        let payment_hash = self.payment_hash?.parse().ok()?;
        Some(Entry {
            destination,
            amount_sats: self.amount_sats,
            paid_at: self.paid_at,
            payment_hash,
        })
    }
}

#[async_trait]
impl LotteryStore for PostgrestStore {
    async fn upsert_round(&self, round: &Round) -> Result<(), StoreError> {
        self.write(
            "lottery_rounds?on_conflict=id",
            &RoundRow::from_round(round),
            "merge-duplicates",
        )
        .await
    }

    async fn insert_entry(&self, round_id: &str, entry: &Entry) -> Result<(), StoreError> {
        // Duplicate payment hashes are silently dropped, not errors.
        self.write(
            "lottery_entries?on_conflict=payment_hash",
            &EntryRow::from_entry(round_id, entry),
            "ignore-duplicates",
        )
        .await
    }

    async fn load_round(&self, round_id: &str) -> Result<Option<Round>, StoreError> {
        let mut rows: Vec<RoundRow> = self
            .select(&format!("lottery_rounds?id=eq.{round_id}&select=*"))
            .await?;
        let Some(row) = rows.pop() else {
            return Ok(None);
        };
        let entries: Vec<EntryRow> = self
            .select(&format!(
                "lottery_entries?round_id=eq.{round_id}&select=*&order=paid_at.asc"
            ))
            .await?;
        let entries = entries.into_iter().filter_map(EntryRow::into_entry).collect();
        Ok(Some(row.into_round(entries)))
    }

    async fn recent_completed(&self, limit: usize) -> Result<Vec<Round>, StoreError> {
        let rows: Vec<RoundRow> = self
            .select(&format!(
                "lottery_rounds?status=eq.completed&select=*&order=ends_at.desc&limit={limit}"
            ))
            .await?;
        Ok(rows.into_iter().map(|r| r.into_round(Vec::new())).collect())
    }
}

/* ── Boost rows ── */

#[derive(Debug, Serialize, Deserialize)]
struct BoostRow {
    id: String,
    item_id: String,
    item_type: ItemType,
    amount_sats: u64,
    payment_hash: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[async_trait]
impl BoostStore for PostgrestStore {
    async fn upsert_boost(&self, boost: &Boost) -> Result<(), StoreError> {
        self.write(
            "boosts?on_conflict=id",
            &BoostRow {
                id: boost.id.clone(),
                item_id: boost.item_id.clone(),
                item_type: boost.item_type,
                amount_sats: boost.amount_sats,
                payment_hash: boost.payment_hash.to_hex(),
                created_at: boost.created_at,
                expires_at: boost.expires_at,
            },
            "merge-duplicates",
        )
        .await
    }

    async fn active_boosts(&self) -> Result<Vec<Boost>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<BoostRow> = self
            .select(&format!("boosts?select=*&expires_at=gt.{now}"))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let payment_hash: PaymentHash = row.payment_hash.parse().ok()?;
                Some(Boost {
                    id: row.id,
                    item_id: row.item_id,
                    item_type: row.item_type,
                    amount_sats: row.amount_sats,
                    payment_hash,
                    created_at: row.created_at,
                    expires_at: row.expires_at,
                })
            })
            .collect())
    }
}

/* ── Catalog rows ── */

#[derive(Debug, Serialize, Deserialize)]
struct AppRow {
    id: String,
    name: String,
    url: String,
    description: Option<String>,
    icon: Option<String>,
    #[serde(default)]
    featured: bool,
    #[serde(default = "Utc::now")]
    submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiRow {
    id: String,
    provider: String,
    name: String,
    method: Option<String>,
    endpoint: String,
    description: Option<String>,
    cost: Option<u64>,
    cost_type: CostType,
    icon: Option<String>,
    #[serde(default)]
    verified: bool,
    verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    featured: bool,
    #[serde(default = "Utc::now")]
    submitted_at: DateTime<Utc>,
}

impl AppRow {
    fn into_listing(self) -> AppListing {
        AppListing {
            id: self.id,
            name: self.name,
            url: self.url,
            description: self.description,
            icon: self.icon,
            featured: self.featured,
            submitted_at: self.submitted_at,
            boost: None,
        }
    }
}

impl ApiRow {
    fn into_listing(self) -> ApiListing {
        ApiListing {
            id: self.id,
            provider: self.provider,
            name: self.name,
            method: self.method,
            endpoint: self.endpoint,
            description: self.description,
            cost: self.cost,
            cost_type: self.cost_type,
            icon: self.icon,
            verified: self.verified,
            verified_at: self.verified_at,
            submitted_at: self.submitted_at,
            featured: self.featured,
            boost: None,
        }
    }
}

#[async_trait]
impl CatalogStore for PostgrestStore {
    async fn list_apps(&self) -> Result<Vec<AppListing>, StoreError> {
        // Curated catalog plus paid submissions.
        let curated: Vec<AppRow> = self.select("apps?select=*&order=sort_order.asc").await?;
        let submitted: Vec<AppRow> = self
            .select("app_submissions?select=*&order=submitted_at.desc")
            .await?;
        Ok(curated
            .into_iter()
            .chain(submitted)
            .map(AppRow::into_listing)
            .collect())
    }

    async fn list_apis(&self) -> Result<Vec<ApiListing>, StoreError> {
        let curated: Vec<ApiRow> = self.select("apis?select=*&order=created_at.asc").await?;
        let submitted: Vec<ApiRow> = self
            .select("api_submissions?select=*&order=submitted_at.desc")
            .await?;
        Ok(curated
            .into_iter()
            .chain(submitted)
            .map(ApiRow::into_listing)
            .collect())
    }

    async fn insert_app(&self, app: &AppListing) -> Result<(), StoreError> {
        self.write(
            "app_submissions?on_conflict=id",
            &AppRow {
                id: app.id.clone(),
                name: app.name.clone(),
                url: app.url.clone(),
                description: app.description.clone(),
                icon: app.icon.clone(),
                featured: app.featured,
                submitted_at: app.submitted_at,
            },
            "merge-duplicates",
        )
        .await
    }

    async fn insert_api(&self, api: &ApiListing) -> Result<(), StoreError> {
        self.write(
            "api_submissions?on_conflict=id",
            &ApiRow {
                id: api.id.clone(),
                provider: api.provider.clone(),
                name: api.name.clone(),
                method: api.method.clone(),
                endpoint: api.endpoint.clone(),
                description: api.description.clone(),
                cost: api.cost,
                cost_type: api.cost_type,
                icon: api.icon.clone(),
                verified: api.verified,
                verified_at: api.verified_at,
                featured: api.featured,
                submitted_at: api.submitted_at,
            },
            "merge-duplicates",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_row_roundtrips_winner_columns() {
        let bounds = l402_lottery::round::RoundClock::default().bounds(Utc::now());
        let mut round = Round::new(&bounds);
        round.total_pot = 400;
        round.status = RoundStatus::Completed;
        round.winner = Some(Winner {
            destination: PayoutDestination::LightningAddress("w@x.io".to_string()),
            amount_contributed: 400,
            payout: 400,
            house_cut: 0,
            payout_status: PayoutStatus::Paid,
            payout_error: None,
        });

        let row = RoundRow::from_round(&round);
        assert_eq!(row.winner_address.as_deref(), Some("w@x.io"));
        assert_eq!(row.winner_payout, Some(400));

        let restored = row.into_round(Vec::new());
        let winner = restored.winner.unwrap();
        assert_eq!(winner.payout_status, PayoutStatus::Paid);
        assert!(matches!(
            winner.destination,
            PayoutDestination::LightningAddress(ref a) if a == "w@x.io"
        ));
    }

    #[test]
    fn entry_row_without_hash_is_dropped() {
        let row = EntryRow {
            round_id: "round-1".to_string(),
            lightning_address: Some("a@b.io".to_string()),
            node_pubkey: None,
            amount_sats: 100,
            payment_hash: None,
            paid_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap(),
        };
        assert!(row.into_entry().is_none());
    }

    #[test]
    fn status_columns_use_lowercase() {
        let json = serde_json::to_value(RoundStatus::Completed).unwrap();
        assert_eq!(json, "completed");
        let json = serde_json::to_value(PayoutStatus::Failed).unwrap();
        assert_eq!(json, "failed");
    }
}
