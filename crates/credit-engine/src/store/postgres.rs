//! PostgreSQL-backed storage
//!
//! Thin adapter from the storage traits to the repositories. Multi-step
//! operations open a transaction here and hand the connection to the
//! repositories so every write in the step commits together.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use shared::DbPool;
use uuid::Uuid;

use super::{EditLogStore, LedgerStore, PaymentStore, PricingStore, PromotionStore};
use crate::error::{CreditError, CreditResult};
use crate::models::{
    AccountBalance, EditKind, EditRecord, EventKind, HistoryQuery, LedgerEntry, LedgerRefs,
    NewEditRecord, NewLedgerEntry, NewPaymentEvent, NewPaymentOrder, NewPromotionCode,
    OrderCompletion, OrderStatus, PaymentEvent, PaymentMethodDetails, PaymentOrder,
    PricingEntry, PromotionCode, RedemptionOutcome, SavedPaymentMethod,
};
use crate::repositories::{
    BalanceRepository, EditRepository, LedgerRepository, PaymentEventRepository,
    PaymentMethodRepository, PaymentOrderRepository, PricingRepository, PromotionRepository,
    RedemptionRepository,
};

/// Storage backed by a Postgres pool
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn available(&self, account_id: &str) -> CreditResult<i64> {
        Ok(BalanceRepository::find(&self.pool, account_id)
            .await?
            .map_or(0, |b| b.total))
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn append_entry(&self, entry: NewLedgerEntry) -> CreditResult<LedgerEntry> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        match LedgerRepository::append(&mut tx, &entry).await? {
            Some(row) => {
                tx.commit().await.context("Failed to commit transaction")?;
                Ok(row)
            }
            None => {
                tx.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                Err(CreditError::InsufficientCredits {
                    required: -entry.amount,
                    available: self.available(&entry.account_id).await?,
                })
            }
        }
    }

    async fn append_unique(&self, entry: NewLedgerEntry) -> CreditResult<Option<LedgerEntry>> {
        if entry.is_debit() {
            return Err(CreditError::validation(
                "Unique ledger entries must be credits",
            ));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let total = BalanceRepository::increment(&mut *tx, &entry.account_id, entry.amount).await?;
        match LedgerRepository::insert_unique(&mut *tx, &entry, total).await? {
            Some(row) => {
                tx.commit().await.context("Failed to commit transaction")?;
                Ok(Some(row))
            }
            None => {
                // Undo the projection made for the duplicate
                tx.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                Ok(None)
            }
        }
    }

    async fn balance(&self, account_id: &str) -> CreditResult<Option<AccountBalance>> {
        Ok(BalanceRepository::find(&self.pool, account_id).await?)
    }

    async fn history(
        &self,
        account_id: &str,
        query: &HistoryQuery,
    ) -> CreditResult<Vec<LedgerEntry>> {
        Ok(LedgerRepository::list(&self.pool, account_id, query).await?)
    }

    async fn ledger_sum(&self, account_id: &str) -> CreditResult<i64> {
        Ok(LedgerRepository::sum_for_account(&self.pool, account_id).await?)
    }
}

#[async_trait]
impl PricingStore for PgStore {
    async fn find_price(&self, service_code: &str) -> CreditResult<Option<PricingEntry>> {
        Ok(PricingRepository::find(&self.pool, service_code).await?)
    }

    async fn list_prices(&self, include_inactive: bool) -> CreditResult<Vec<PricingEntry>> {
        Ok(PricingRepository::list(&self.pool, include_inactive).await?)
    }

    async fn upsert_price(&self, service_code: &str, credits: i64) -> CreditResult<PricingEntry> {
        Ok(PricingRepository::upsert(&self.pool, service_code, credits).await?)
    }

    async fn set_price_active(
        &self,
        service_code: &str,
        is_active: bool,
    ) -> CreditResult<Option<PricingEntry>> {
        Ok(PricingRepository::set_active(&self.pool, service_code, is_active).await?)
    }
}

#[async_trait]
impl EditLogStore for PgStore {
    async fn count_edits(&self, account_id: &str, kind: EditKind) -> CreditResult<i64> {
        Ok(EditRepository::count(&self.pool, account_id, kind).await?)
    }

    async fn record_edit(&self, record: NewEditRecord) -> CreditResult<EditRecord> {
        Ok(EditRepository::insert(&self.pool, &record).await?)
    }
}

#[async_trait]
impl PromotionStore for PgStore {
    async fn find_promotion(&self, code: &str) -> CreditResult<Option<PromotionCode>> {
        Ok(PromotionRepository::find_by_code(&self.pool, code).await?)
    }

    async fn insert_promotion(&self, promotion: NewPromotionCode) -> CreditResult<PromotionCode> {
        Ok(PromotionRepository::insert(&self.pool, &promotion).await?)
    }

    async fn set_promotion_active(
        &self,
        code: &str,
        is_active: bool,
    ) -> CreditResult<Option<PromotionCode>> {
        Ok(PromotionRepository::set_active(&self.pool, code, is_active).await?)
    }

    async fn count_redemptions(
        &self,
        promotion_id: Uuid,
        account_id: Option<&str>,
    ) -> CreditResult<i64> {
        Ok(RedemptionRepository::count(&self.pool, promotion_id, account_id).await?)
    }

    async fn redeem(
        &self,
        promotion: &PromotionCode,
        account_id: &str,
    ) -> CreditResult<RedemptionOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let locked = PromotionRepository::lock(&mut tx, promotion.id)
            .await?
            .ok_or_else(|| CreditError::not_found("Promotion code", &promotion.code))?;

        if !locked.is_active || !locked.is_within_window(chrono::Utc::now()) {
            tx.rollback()
                .await
                .context("Failed to rollback transaction")?;
            return Ok(RedemptionOutcome::Unavailable);
        }

        let by_account =
            RedemptionRepository::count(&mut *tx, locked.id, Some(account_id)).await?;
        if by_account >= locked.per_account_cap() {
            tx.rollback()
                .await
                .context("Failed to rollback transaction")?;
            return Ok(RedemptionOutcome::AccountCapReached);
        }

        if let Some(cap) = locked.global_cap() {
            let total = RedemptionRepository::count(&mut *tx, locked.id, None).await?;
            if total >= cap {
                tx.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                return Ok(RedemptionOutcome::GlobalCapReached);
            }
        }

        let entry = NewLedgerEntry::new(
            account_id,
            locked.credits,
            EventKind::Voucher,
            LedgerRefs::default().with_description(format!("Promotion code {}", locked.code)),
        );
        let entry = LedgerRepository::append(&mut tx, &entry)
            .await?
            .ok_or_else(|| anyhow!("Promotion credit was treated as a debit"))?;

        let redemption =
            RedemptionRepository::insert(&mut *tx, locked.id, account_id, locked.credits, entry.id)
                .await?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(RedemptionOutcome::Redeemed { redemption, entry })
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_order(
        &self,
        order: NewPaymentOrder,
        event: NewPaymentEvent,
    ) -> CreditResult<PaymentOrder> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let row = PaymentOrderRepository::insert(&mut *tx, &order).await?;
        PaymentEventRepository::insert(&mut *tx, row.id, &event).await?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(row)
    }

    async fn find_order(&self, id: Uuid) -> CreditResult<Option<PaymentOrder>> {
        Ok(PaymentOrderRepository::find_by_id(&self.pool, id).await?)
    }

    async fn find_order_by_provider_ref(
        &self,
        provider_order_id: &str,
    ) -> CreditResult<Option<PaymentOrder>> {
        Ok(PaymentOrderRepository::find_by_provider_ref(&self.pool, provider_order_id).await?)
    }

    async fn list_orders(&self, account_id: &str, limit: i64) -> CreditResult<Vec<PaymentOrder>> {
        Ok(PaymentOrderRepository::list_for_account(&self.pool, account_id, limit).await?)
    }

    async fn record_webhook(
        &self,
        provider_order_id: &str,
        payload: serde_json::Value,
    ) -> CreditResult<PaymentEvent> {
        Ok(PaymentEventRepository::insert_webhook(&self.pool, provider_order_id, &payload).await?)
    }

    async fn record_event(
        &self,
        order_id: Uuid,
        event: NewPaymentEvent,
    ) -> CreditResult<PaymentEvent> {
        Ok(PaymentEventRepository::insert(&self.pool, order_id, &event).await?)
    }

    async fn list_events(&self, order_id: Uuid) -> CreditResult<Vec<PaymentEvent>> {
        Ok(PaymentEventRepository::list_for_order(&self.pool, order_id).await?)
    }

    async fn transition_status(
        &self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        event: NewPaymentEvent,
    ) -> CreditResult<Option<PaymentOrder>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let order = match PaymentOrderRepository::transition(&mut *tx, order_id, from, to).await? {
            Some(order) => order,
            None => {
                tx.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                return Ok(None);
            }
        };
        PaymentEventRepository::insert(&mut *tx, order.id, &event).await?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(Some(order))
    }

    async fn complete_order(&self, order_id: Uuid) -> CreditResult<Option<OrderCompletion>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        // The status guard is the idempotency check: only one caller can
        // move the row out of pending/processing.
        let order = match PaymentOrderRepository::transition(
            &mut *tx,
            order_id,
            OrderStatus::sources_for(OrderStatus::Completed),
            OrderStatus::Completed,
        )
        .await?
        {
            Some(order) => order,
            None => {
                tx.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                return Ok(None);
            }
        };

        let entry = NewLedgerEntry::new(
            order.account_id.clone(),
            order.credits,
            EventKind::Purchase,
            LedgerRefs::purchase(order.id.to_string())
                .with_description(format!("Credit purchase ({} credits)", order.credits)),
        );
        let total = BalanceRepository::increment(&mut *tx, &order.account_id, order.credits).await?;
        let entry = match LedgerRepository::insert_unique(&mut *tx, &entry, total).await? {
            Some(entry) => entry,
            None => {
                tx.rollback()
                    .await
                    .context("Failed to rollback transaction")?;
                return Err(anyhow!(
                    "Purchase credit already exists for order {} that was not completed",
                    order.id
                )
                .into());
            }
        };
        PaymentEventRepository::insert(&mut *tx, order.id, &OrderCompletion::event(&entry)).await?;

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(Some(OrderCompletion { order, entry }))
    }

    async fn save_payment_method(
        &self,
        account_id: &str,
        method: &PaymentMethodDetails,
    ) -> CreditResult<SavedPaymentMethod> {
        Ok(PaymentMethodRepository::upsert(&self.pool, account_id, method).await?)
    }
}
