//! Business services of the credit engine

pub mod ledger;
pub mod payments;
pub mod pricing;
pub mod promotions;
pub mod provider;
pub mod quota;
pub mod signature;

pub use ledger::LedgerService;
pub use payments::PaymentOrderService;
pub use pricing::{PricingCache, PricingCatalog};
pub use promotions::{PromotionService, PromotionSpec};
pub use provider::{MerchantApiClient, PaymentProvider, ProviderOrder, ProviderOrderRequest};
pub use quota::EditChargeService;
pub use signature::WebhookVerifier;
