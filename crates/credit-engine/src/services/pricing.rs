//! Pricing catalog with a read-through TTL cache
//!
//! The cache is an explicit object owned by [`PricingCatalog`]; admin writes
//! invalidate the affected code so activation changes are visible on the
//! next read.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::{CreditError, CreditResult};
use crate::models::{PricingEntry, ServiceCode};
use crate::store::CreditStore;

#[derive(Debug, Clone)]
struct CachedPrice {
    /// None records a confirmed miss
    entry: Option<PricingEntry>,
    fetched_at: Instant,
}

/// Service code → catalog row, each entry valid for `ttl`
pub struct PricingCache {
    entries: DashMap<String, CachedPrice>,
    ttl: Duration,
}

impl PricingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Fresh cached lookup; the outer None means "not cached"
    fn get(&self, code: &str) -> Option<Option<PricingEntry>> {
        let cached = self.entries.get(code)?;
        if cached.fetched_at.elapsed() > self.ttl {
            drop(cached);
            self.entries.remove(code);
            return None;
        }
        Some(cached.entry.clone())
    }

    fn put(&self, code: &str, entry: Option<PricingEntry>) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            code.to_string(),
            CachedPrice {
                entry,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, code: &str) {
        self.entries.remove(code);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct PricingCatalog {
    store: Arc<dyn CreditStore>,
    cache: PricingCache,
    fallback_credits: i64,
}

impl PricingCatalog {
    pub fn new(store: Arc<dyn CreditStore>, cache_ttl: Duration, fallback_credits: i64) -> Self {
        Self {
            store,
            cache: PricingCache::new(cache_ttl),
            fallback_credits,
        }
    }

    pub fn cache(&self) -> &PricingCache {
        &self.cache
    }

    async fn lookup(&self, code: &str) -> CreditResult<Option<PricingEntry>> {
        if let Some(entry) = self.cache.get(code) {
            return Ok(entry);
        }
        let entry = self.store.find_price(code).await?;
        self.cache.put(code, entry.clone());
        Ok(entry)
    }

    /// Credit cost of an active service; None when missing or inactive
    pub async fn get_cost(&self, code: &str) -> CreditResult<Option<i64>> {
        Ok(self
            .lookup(code)
            .await?
            .filter(|entry| entry.is_active)
            .map(|entry| entry.credits))
    }

    /// Credit cost that never blocks the caller on a catalog problem
    pub async fn cost_or_fallback(&self, code: ServiceCode) -> i64 {
        match self.get_cost(code.as_str()).await {
            Ok(Some(credits)) => credits,
            Ok(None) => {
                warn!(
                    service_code = %code,
                    fallback = self.fallback_credits,
                    "Pricing entry missing or inactive, using fallback cost"
                );
                metrics::counter!("credits.pricing.fallback", "reason" => "missing").increment(1);
                self.fallback_credits
            }
            Err(e) => {
                warn!(
                    service_code = %code,
                    fallback = self.fallback_credits,
                    error = %e,
                    "Pricing catalog unavailable, using fallback cost"
                );
                metrics::counter!("credits.pricing.fallback", "reason" => "error").increment(1);
                self.fallback_credits
            }
        }
    }

    pub async fn list_prices(&self, include_inactive: bool) -> CreditResult<Vec<PricingEntry>> {
        self.store.list_prices(include_inactive).await
    }

    /// Create or update a service cost
    pub async fn upsert_price(&self, code: &str, credits: i64) -> CreditResult<PricingEntry> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CreditError::validation("Service code is required"));
        }
        if credits < 0 {
            return Err(CreditError::validation("Credits must be non-negative"));
        }

        let entry = self.store.upsert_price(code, credits).await?;
        self.cache.invalidate(code);
        info!(service_code = %code, credits, "Pricing entry updated");
        Ok(entry)
    }

    /// Activate or deactivate a service (entries are never deleted)
    pub async fn set_active(&self, code: &str, is_active: bool) -> CreditResult<PricingEntry> {
        let entry = self
            .store
            .set_price_active(code, is_active)
            .await?
            .ok_or_else(|| CreditError::not_found("Pricing entry", code))?;
        self.cache.invalidate(code);
        info!(service_code = %code, is_active, "Pricing entry activation changed");
        Ok(entry)
    }

    pub fn invalidate_all(&self) {
        debug!(cached = self.cache.len(), "Clearing pricing cache");
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::FailurePoint;
    use crate::store::{MemoryStore, PricingStore};

    fn catalog(store: Arc<MemoryStore>, ttl_secs: u64) -> PricingCatalog {
        PricingCatalog::new(store, Duration::from_secs(ttl_secs), 1)
    }

    #[tokio::test]
    async fn test_get_cost_from_seeded_catalog() {
        let catalog = catalog(Arc::new(MemoryStore::with_default_prices()), 300);
        assert_eq!(catalog.get_cost("text_edit").await.unwrap(), Some(1));
        assert_eq!(catalog.get_cost("image_edit").await.unwrap(), Some(2));
        assert_eq!(catalog.get_cost("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fallback_on_missing_entry() {
        let catalog = PricingCatalog::new(Arc::new(MemoryStore::new()), Duration::from_secs(60), 3);
        assert_eq!(catalog.cost_or_fallback(ServiceCode::TextEdit).await, 3);
    }

    #[tokio::test]
    async fn test_fallback_on_catalog_error() {
        let store = Arc::new(MemoryStore::with_default_prices());
        store.fail_on(FailurePoint::PricingLookup).await;
        let catalog = catalog(store, 60);

        assert!(catalog.get_cost("text_edit").await.is_err());
        assert_eq!(catalog.cost_or_fallback(ServiceCode::ImageEdit).await, 1);
    }

    #[tokio::test]
    async fn test_cache_serves_reads_until_invalidated() {
        let store = Arc::new(MemoryStore::with_default_prices());
        let catalog = catalog(store.clone(), 300);

        assert_eq!(catalog.get_cost("text_edit").await.unwrap(), Some(1));
        // Direct store write bypasses the catalog, so the cache still holds 1
        store.upsert_price("text_edit", 7).await.unwrap();
        assert_eq!(catalog.get_cost("text_edit").await.unwrap(), Some(1));

        catalog.cache().invalidate("text_edit");
        assert_eq!(catalog.get_cost("text_edit").await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_deactivation_is_visible_immediately() {
        let catalog = catalog(Arc::new(MemoryStore::with_default_prices()), 300);
        assert_eq!(catalog.get_cost("self_print").await.unwrap(), Some(20));

        catalog.set_active("self_print", false).await.unwrap();
        assert_eq!(catalog.get_cost("self_print").await.unwrap(), None);

        catalog.set_active("self_print", true).await.unwrap();
        assert_eq!(catalog.get_cost("self_print").await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let store = Arc::new(MemoryStore::with_default_prices());
        let catalog = catalog(store.clone(), 0);

        catalog.get_cost("text_edit").await.unwrap();
        assert!(catalog.cache().is_empty());
        store.upsert_price("text_edit", 4).await.unwrap();
        assert_eq!(catalog.get_cost("text_edit").await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_upsert_validation() {
        let catalog = catalog(Arc::new(MemoryStore::new()), 60);
        assert!(matches!(
            catalog.upsert_price("text_edit", -1).await,
            Err(CreditError::Validation(_))
        ));
        assert!(matches!(
            catalog.upsert_price(" ", 1).await,
            Err(CreditError::Validation(_))
        ));
        assert!(matches!(
            catalog.set_active("missing", false).await,
            Err(CreditError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_prices_respects_active_flag() {
        let catalog = catalog(Arc::new(MemoryStore::with_default_prices()), 60);
        catalog.set_active("audio_generation", false).await.unwrap();

        assert_eq!(catalog.list_prices(false).await.unwrap().len(), 5);
        assert_eq!(catalog.list_prices(true).await.unwrap().len(), 6);
    }
}
