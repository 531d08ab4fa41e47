//! Paid listing boosts.
//!
//! A boost is a one-off payment that ranks a listing for 24 hours. Only the
//! highest-amount active boost per item counts, and boosts are keyed by the
//! payment hash of the settlement that bought them, so a replayed credential
//! cannot multiply one payment into several boosts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use l402_kit::token::PaymentHash;
use l402_lottery::store::StoreError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::BOOST_DURATION_HOURS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    App,
    Api,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::App => "app",
            ItemType::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boost {
    /// Payment hash hex doubles as the id, which is what dedupes replays.
    pub id: String,
    pub item_id: String,
    pub item_type: ItemType,
    pub amount_sats: u64,
    pub payment_hash: PaymentHash,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Boost {
    pub fn new(
        item_id: String,
        item_type: ItemType,
        amount_sats: u64,
        payment_hash: PaymentHash,
        now: DateTime<Utc>,
    ) -> Self {
        Boost {
            id: payment_hash.to_hex(),
            item_id,
            item_type,
            amount_sats,
            payment_hash,
            created_at: now,
            expires_at: now + Duration::hours(BOOST_DURATION_HOURS),
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[async_trait]
pub trait BoostStore: Send + Sync {
    /// Insert or replace, keyed by the boost id (payment hash hex).
    async fn upsert_boost(&self, boost: &Boost) -> Result<(), StoreError>;

    /// All boosts that have not yet expired.
    async fn active_boosts(&self) -> Result<Vec<Boost>, StoreError>;
}

/// Items that can carry a boost in directory listings.
pub trait Boosted {
    fn item_id(&self) -> &str;
    fn featured(&self) -> bool;
    fn boost_amount(&self) -> u64;
    fn attach(&mut self, boost: Boost);
}

/// Attach the highest active boost per item and order the directory: featured
/// listings first, then by boost amount.
pub fn apply_boosts<T: Boosted>(items: &mut [T], boosts: &[Boost], item_type: ItemType) {
    let mut best: HashMap<&str, &Boost> = HashMap::new();
    for boost in boosts.iter().filter(|b| b.item_type == item_type) {
        match best.get(boost.item_id.as_str()) {
            Some(current) if current.amount_sats >= boost.amount_sats => {}
            _ => {
                best.insert(boost.item_id.as_str(), boost);
            }
        }
    }

    for item in items.iter_mut() {
        if let Some(boost) = best.get(item.item_id()) {
            item.attach((*boost).clone());
        }
    }

    items.sort_by(|a, b| {
        b.featured()
            .cmp(&a.featured())
            .then(b.boost_amount().cmp(&a.boost_amount()))
    });
}

/// In-memory fallback when no durable backend is configured.
#[derive(Debug, Default)]
pub struct MemoryBoostStore {
    boosts: RwLock<HashMap<String, Boost>>,
}

impl MemoryBoostStore {
    pub fn new() -> Self {
        MemoryBoostStore::default()
    }
}

#[async_trait]
impl BoostStore for MemoryBoostStore {
    async fn upsert_boost(&self, boost: &Boost) -> Result<(), StoreError> {
        self.boosts
            .write()
            .await
            .insert(boost.id.clone(), boost.clone());
        Ok(())
    }

    async fn active_boosts(&self) -> Result<Vec<Boost>, StoreError> {
        let now = Utc::now();
        Ok(self
            .boosts
            .read()
            .await
            .values()
            .filter(|b| b.is_active(now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Item {
        id: &'static str,
        featured: bool,
        boost: Option<Boost>,
    }

    impl Boosted for Item {
        fn item_id(&self) -> &str {
            self.id
        }
        fn featured(&self) -> bool {
            self.featured
        }
        fn boost_amount(&self) -> u64 {
            self.boost.as_ref().map(|b| b.amount_sats).unwrap_or(0)
        }
        fn attach(&mut self, boost: Boost) {
            self.boost = Some(boost);
        }
    }

    fn boost(item_id: &str, amount: u64, hash_byte: u8) -> Boost {
        Boost::new(
            item_id.to_string(),
            ItemType::App,
            amount,
            PaymentHash([hash_byte; 32]),
            Utc::now(),
        )
    }

    #[test]
    fn featured_items_outrank_any_boost() {
        let mut items = vec![
            Item { id: "a", featured: false, boost: None },
            Item { id: "b", featured: true, boost: None },
            Item { id: "c", featured: false, boost: None },
        ];
        let boosts = vec![boost("c", 500, 1)];
        apply_boosts(&mut items, &boosts, ItemType::App);
        assert_eq!(items[0].id, "b");
        assert_eq!(items[1].id, "c");
        assert_eq!(items[2].id, "a");
    }

    #[test]
    fn only_the_highest_boost_per_item_counts() {
        let mut items = vec![
            Item { id: "a", featured: false, boost: None },
            Item { id: "b", featured: false, boost: None },
        ];
        let boosts = vec![boost("a", 100, 1), boost("a", 300, 2), boost("b", 200, 3)];
        apply_boosts(&mut items, &boosts, ItemType::App);
        assert_eq!(items[0].id, "a");
        assert_eq!(items[0].boost_amount(), 300);
        assert_eq!(items[1].boost_amount(), 200);
    }

    #[test]
    fn boosts_of_the_other_kind_are_ignored() {
        let mut items = vec![Item { id: "a", featured: false, boost: None }];
        let mut api_boost = boost("a", 900, 1);
        api_boost.item_type = ItemType::Api;
        apply_boosts(&mut items, &[api_boost], ItemType::App);
        assert_eq!(items[0].boost_amount(), 0);
    }

    #[tokio::test]
    async fn replayed_payment_hash_upserts_one_boost() {
        let store = MemoryBoostStore::new();
        store.upsert_boost(&boost("a", 84, 7)).await.unwrap();
        store.upsert_boost(&boost("a", 84, 7)).await.unwrap();
        assert_eq!(store.active_boosts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn expired_boosts_are_not_active() {
        let store = MemoryBoostStore::new();
        let mut stale = boost("a", 84, 7);
        stale.expires_at = Utc::now() - Duration::hours(1);
        store.upsert_boost(&stale).await.unwrap();
        assert!(store.active_boosts().await.unwrap().is_empty());
    }
}
