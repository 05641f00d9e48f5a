//! Repository layer for database access

pub mod edits;
pub mod ledger;
pub mod payments;
pub mod pricing;
pub mod promotions;

// Re-exports
pub use edits::EditRepository;
pub use ledger::{BalanceRepository, LedgerRepository};
pub use payments::{PaymentEventRepository, PaymentMethodRepository, PaymentOrderRepository};
pub use pricing::PricingRepository;
pub use promotions::{PromotionRepository, RedemptionRepository};
