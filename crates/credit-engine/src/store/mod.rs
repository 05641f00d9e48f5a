//! Storage traits for the credit engine
//!
//! Services talk to storage only through these traits. Each method is one
//! atomic unit: an implementation must make every write a method performs
//! visible together or not at all.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CreditResult;
use crate::models::{
    AccountBalance, EditKind, EditRecord, HistoryQuery, LedgerEntry, NewEditRecord,
    NewLedgerEntry, NewPaymentEvent, NewPaymentOrder, NewPromotionCode, OrderCompletion,
    OrderStatus, PaymentEvent, PaymentMethodDetails, PaymentOrder, PricingEntry, PromotionCode,
    RedemptionOutcome, SavedPaymentMethod,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Append-only ledger plus its balance projection
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert the entry and apply it to the balance in one atomic unit
    ///
    /// Debits are checked against the balance at write time and fail with
    /// `InsufficientCredits` without touching state.
    async fn append_entry(&self, entry: NewLedgerEntry) -> CreditResult<LedgerEntry>;

    /// Like `append_entry`, but returns None when a uniqueness rule (one
    /// initial grant per account, one purchase per reference) already holds
    async fn append_unique(&self, entry: NewLedgerEntry) -> CreditResult<Option<LedgerEntry>>;

    async fn balance(&self, account_id: &str) -> CreditResult<Option<AccountBalance>>;

    async fn history(
        &self,
        account_id: &str,
        query: &HistoryQuery,
    ) -> CreditResult<Vec<LedgerEntry>>;

    /// Sum of every ledger amount for the account
    async fn ledger_sum(&self, account_id: &str) -> CreditResult<i64>;
}

#[async_trait]
pub trait PricingStore: Send + Sync {
    async fn find_price(&self, service_code: &str) -> CreditResult<Option<PricingEntry>>;

    async fn list_prices(&self, include_inactive: bool) -> CreditResult<Vec<PricingEntry>>;

    async fn upsert_price(&self, service_code: &str, credits: i64) -> CreditResult<PricingEntry>;

    async fn set_price_active(
        &self,
        service_code: &str,
        is_active: bool,
    ) -> CreditResult<Option<PricingEntry>>;
}

/// Permanent audit log of edits, the source of quota counts
#[async_trait]
pub trait EditLogStore: Send + Sync {
    async fn count_edits(&self, account_id: &str, kind: EditKind) -> CreditResult<i64>;

    async fn record_edit(&self, record: NewEditRecord) -> CreditResult<EditRecord>;
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn find_promotion(&self, code: &str) -> CreditResult<Option<PromotionCode>>;

    async fn insert_promotion(&self, promotion: NewPromotionCode) -> CreditResult<PromotionCode>;

    async fn set_promotion_active(
        &self,
        code: &str,
        is_active: bool,
    ) -> CreditResult<Option<PromotionCode>>;

    async fn count_redemptions(
        &self,
        promotion_id: Uuid,
        account_id: Option<&str>,
    ) -> CreditResult<i64>;

    /// Re-check both caps, append the voucher credit and record the
    /// redemption in one atomic unit
    async fn redeem(
        &self,
        promotion: &PromotionCode,
        account_id: &str,
    ) -> CreditResult<RedemptionOutcome>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a pending order together with its creation event
    async fn insert_order(
        &self,
        order: NewPaymentOrder,
        event: NewPaymentEvent,
    ) -> CreditResult<PaymentOrder>;

    async fn find_order(&self, id: Uuid) -> CreditResult<Option<PaymentOrder>>;

    async fn find_order_by_provider_ref(
        &self,
        provider_order_id: &str,
    ) -> CreditResult<Option<PaymentOrder>>;

    async fn list_orders(&self, account_id: &str, limit: i64) -> CreditResult<Vec<PaymentOrder>>;

    /// Record a raw webhook delivery, linked to the order when the provider
    /// reference matches one and kept unlinked otherwise
    async fn record_webhook(
        &self,
        provider_order_id: &str,
        payload: serde_json::Value,
    ) -> CreditResult<PaymentEvent>;

    /// Append an event that accompanies no status change
    async fn record_event(
        &self,
        order_id: Uuid,
        event: NewPaymentEvent,
    ) -> CreditResult<PaymentEvent>;

    async fn list_events(&self, order_id: Uuid) -> CreditResult<Vec<PaymentEvent>>;

    /// Guarded status change written together with its event
    ///
    /// None when the order is not in one of `from`; the event is then not
    /// written either.
    async fn transition_status(
        &self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        event: NewPaymentEvent,
    ) -> CreditResult<Option<PaymentOrder>>;

    /// Mark a pending/processing order completed, credit its bundle and
    /// record the `order_completed` event in one atomic unit. None when the
    /// guard did not match.
    async fn complete_order(&self, order_id: Uuid) -> CreditResult<Option<OrderCompletion>>;

    async fn save_payment_method(
        &self,
        account_id: &str,
        method: &PaymentMethodDetails,
    ) -> CreditResult<SavedPaymentMethod>;
}

/// Everything the engine needs from storage
pub trait CreditStore: LedgerStore + PricingStore + EditLogStore + PromotionStore + PaymentStore {}

impl<T> CreditStore for T where
    T: LedgerStore + PricingStore + EditLogStore + PromotionStore + PaymentStore
{
}
