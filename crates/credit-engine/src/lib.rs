//! Credit accounting and payment settlement engine
//!
//! Accounts spend credits on features and buy them through a payment
//! provider. Every credit movement is an immutable ledger entry; the
//! per-account balance is a projection maintained in the same atomic unit
//! as the entry that changes it.
//!
//! - [`services::LedgerService`]: append, balance, history, grants, refunds
//! - [`services::PricingCatalog`]: cached per-service credit costs
//! - [`services::EditChargeService`]: quota-aware charging for edits
//! - [`services::PromotionService`]: capped promotion code redemption
//! - [`services::PaymentOrderService`]: orders, webhooks and settlement

use std::sync::Arc;
use std::time::Duration;

use shared::{Config, DbPool};

pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod store;

pub use error::{CreditError, CreditResult};
pub use services::{
    EditChargeService, LedgerService, MerchantApiClient, PaymentOrderService, PaymentProvider,
    PricingCatalog, PromotionService, WebhookVerifier,
};
pub use store::{CreditStore, MemoryStore, PgStore};

/// Engine settings derived from the process configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_grant_credits: i64,
    pub pricing_cache_ttl: Duration,
    pub fallback_credits: i64,
    pub currency: String,
    pub provider_timeout: Duration,
    pub webhook_secret: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_grant_credits: 0,
            pricing_cache_ttl: Duration::from_secs(300),
            fallback_credits: 1,
            currency: "EUR".to_string(),
            provider_timeout: Duration::from_secs(15),
            webhook_secret: None,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            initial_grant_credits: config.initial_grant_credits,
            pricing_cache_ttl: Duration::from_secs(config.pricing.cache_ttl_secs),
            fallback_credits: config.pricing.fallback_credits,
            currency: config.payments.currency.clone(),
            provider_timeout: Duration::from_secs(config.payments.request_timeout_secs),
            webhook_secret: config.payments.webhook_secret.clone(),
        }
    }
}

/// All engine services wired to one store
#[derive(Clone)]
pub struct CreditEngine {
    pub ledger: LedgerService,
    pub pricing: Arc<PricingCatalog>,
    pub edits: EditChargeService,
    pub promotions: PromotionService,
    pub payments: PaymentOrderService,
}

impl CreditEngine {
    pub fn new(
        store: Arc<dyn CreditStore>,
        provider: Arc<dyn PaymentProvider>,
        config: &EngineConfig,
    ) -> Self {
        let ledger = LedgerService::new(store.clone(), config.initial_grant_credits);
        let pricing = Arc::new(PricingCatalog::new(
            store.clone(),
            config.pricing_cache_ttl,
            config.fallback_credits,
        ));
        let edits = EditChargeService::new(store.clone(), ledger.clone(), pricing.clone());
        let promotions = PromotionService::new(store.clone());
        let payments = PaymentOrderService::new(
            store,
            provider,
            WebhookVerifier::new(config.webhook_secret.clone()),
            config.currency.clone(),
            config.provider_timeout,
        );

        Self {
            ledger,
            pricing,
            edits,
            promotions,
            payments,
        }
    }

    /// Postgres-backed engine talking to the configured merchant API
    pub fn from_config(pool: DbPool, config: &Config) -> CreditResult<Self> {
        let engine_config = EngineConfig::from(config);
        let provider = MerchantApiClient::new(
            &config.payments.api_base_url,
            config.payments.secret_key.clone(),
            engine_config.provider_timeout,
        )?;
        if !provider.is_configured() {
            tracing::warn!("PAYMENT_API_SECRET_KEY not set - order creation will fail");
        }

        Ok(Self::new(
            Arc::new(PgStore::new(pool)),
            Arc::new(provider),
            &engine_config,
        ))
    }
}
