//! App and API directory listings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use l402_lottery::store::StoreError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::boosts::{Boost, Boosted};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppListing {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub featured: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub boost: Option<Boost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListing {
    pub id: String,
    pub provider: String,
    pub name: String,
    /// HTTP method the 402 probe succeeded with.
    #[serde(default)]
    pub method: Option<String>,
    pub endpoint: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Fixed price decoded from the challenge invoice, when there was one.
    #[serde(default)]
    pub cost: Option<u64>,
    pub cost_type: CostType,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub featured: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub boost: Option<Boost>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostType {
    Fixed,
    Variable,
}

impl Boosted for AppListing {
    fn item_id(&self) -> &str {
        &self.id
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

impl Boosted for ApiListing {
    fn item_id(&self) -> &str {
        &self.id
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

/// Stable listing id derived from the URL, so resubmissions of the same URL
/// collide instead of multiplying.
pub fn url_to_id(url: &str) -> String {
    let stripped = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_ascii_lowercase();
    stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_apps(&self) -> Result<Vec<AppListing>, StoreError>;
    async fn list_apis(&self) -> Result<Vec<ApiListing>, StoreError>;
    async fn insert_app(&self, app: &AppListing) -> Result<(), StoreError>;
    async fn insert_api(&self, api: &ApiListing) -> Result<(), StoreError>;

    async fn has_app_url(&self, url: &str) -> Result<bool, StoreError> {
        let id = url_to_id(url);
        Ok(self.list_apps().await?.iter().any(|a| a.id == id))
    }

    async fn has_api_endpoint(&self, endpoint: &str) -> Result<bool, StoreError> {
        let id = url_to_id(endpoint);
        Ok(self.list_apis().await?.iter().any(|a| a.id == id))
    }
}

/// In-memory fallback when no durable backend is configured.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    apps: RwLock<Vec<AppListing>>,
    apis: RwLock<Vec<ApiListing>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        MemoryCatalog::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn list_apps(&self) -> Result<Vec<AppListing>, StoreError> {
        Ok(self.apps.read().await.clone())
    }

    async fn list_apis(&self) -> Result<Vec<ApiListing>, StoreError> {
        Ok(self.apis.read().await.clone())
    }

    async fn insert_app(&self, app: &AppListing) -> Result<(), StoreError> {
        self.apps.write().await.push(app.clone());
        Ok(())
    }

    async fn insert_api(&self, api: &ApiListing) -> Result<(), StoreError> {
        self.apis.write().await.push(api.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_ids_are_stable_across_variants() {
        assert_eq!(
            url_to_id("https://www.Example.com/path/"),
            url_to_id("http://example.com/path")
        );
        assert_eq!(url_to_id("https://api.acme.io/v1"), "api-acme-io-v1");
    }

    #[tokio::test]
    async fn duplicate_detection_uses_url_ids() {
        let catalog = MemoryCatalog::new();
        catalog
            .insert_app(&AppListing {
                id: url_to_id("https://example.com"),
                name: "Example".to_string(),
                url: "https://example.com".to_string(),
                description: None,
                icon: None,
                featured: false,
                submitted_at: Utc::now(),
                boost: None,
            })
            .await
            .unwrap();

        assert!(catalog.has_app_url("http://www.example.com/").await.unwrap());
        assert!(!catalog.has_app_url("https://other.com").await.unwrap());
    }
}
