//! In-memory storage for tests and local development
//!
//! All tables sit behind one async mutex, so each trait method observes and
//! mutates a consistent snapshot exactly like a serializable transaction.
//! Failure points can be armed to exercise the engine's error paths.

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EditLogStore, LedgerStore, PaymentStore, PricingStore, PromotionStore};
use crate::error::{CreditError, CreditResult};
use crate::models::{
    event_types, AccountBalance, EditKind, EditRecord, EventKind, HistoryQuery, LedgerEntry,
    LedgerRefs, NewEditRecord, NewLedgerEntry, NewPaymentEvent, NewPaymentOrder,
    NewPromotionCode, OrderCompletion, OrderStatus, PaymentEvent, PaymentMethodDetails,
    PaymentOrder, PricingEntry, PromotionCode, PromotionRedemption, RedemptionOutcome,
    SavedPaymentMethod, ServiceCode,
};

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    AppendEntry,
    RecordEdit,
    SavePaymentMethod,
    PricingLookup,
    /// Any event written for a known order, including those that ride
    /// along with a status change
    OrderEvent,
    WebhookDelivery,
}

#[derive(Default)]
struct Tables {
    ledger: Vec<LedgerEntry>,
    balances: HashMap<String, AccountBalance>,
    prices: HashMap<String, PricingEntry>,
    edits: Vec<EditRecord>,
    promotions: HashMap<String, PromotionCode>,
    redemptions: Vec<PromotionRedemption>,
    orders: HashMap<Uuid, PaymentOrder>,
    events: Vec<PaymentEvent>,
    methods: Vec<SavedPaymentMethod>,
    failures: HashSet<FailurePoint>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, point: FailurePoint) -> CreditResult<()> {
        if self.failures.contains(&point) {
            return Err(anyhow!("injected failure at {:?}", point).into());
        }
        Ok(())
    }

    fn push_event(
        &mut self,
        order_id: Option<Uuid>,
        provider_order_id: Option<String>,
        event: NewPaymentEvent,
    ) -> PaymentEvent {
        let row = PaymentEvent {
            id: self.next_id(),
            order_id,
            provider_order_id,
            event_type: event.event_type.to_string(),
            payload: event.payload,
            created_at: Utc::now(),
        };
        self.events.push(row.clone());
        row
    }

    fn total(&self, account_id: &str) -> i64 {
        self.balances.get(account_id).map_or(0, |b| b.total)
    }

    fn violates_unique(&self, entry: &NewLedgerEntry) -> bool {
        match entry.event_kind {
            EventKind::InitialGrant => self
                .ledger
                .iter()
                .any(|e| e.event_kind == EventKind::InitialGrant && e.account_id == entry.account_id),
            EventKind::Purchase => entry.refs.purchase_ref.as_ref().is_some_and(|r| {
                self.ledger.iter().any(|e| {
                    e.event_kind == EventKind::Purchase && e.purchase_ref.as_ref() == Some(r)
                })
            }),
            _ => false,
        }
    }

    /// Ledger insert plus projection; None when a debit is not covered
    fn append(&mut self, entry: NewLedgerEntry) -> CreditResult<Option<LedgerEntry>> {
        self.check(FailurePoint::AppendEntry)?;
        if entry.amount == 0 {
            return Err(anyhow!("ledger amounts must be non-zero").into());
        }

        let current = self.total(&entry.account_id);
        if entry.is_debit() && current + entry.amount < 0 {
            return Ok(None);
        }

        let now = Utc::now();
        let balance_after = current + entry.amount;
        self.balances.insert(
            entry.account_id.clone(),
            AccountBalance {
                account_id: entry.account_id.clone(),
                total: balance_after,
                updated_at: now,
            },
        );

        let row = LedgerEntry {
            id: self.next_id(),
            account_id: entry.account_id,
            amount: entry.amount,
            event_kind: entry.event_kind,
            story_ref: entry.refs.story_ref,
            purchase_ref: entry.refs.purchase_ref,
            description: entry.refs.description,
            balance_after,
            created_at: now,
        };
        self.ledger.push(row.clone());
        Ok(Some(row))
    }
}

/// Storage that lives entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the default cost of every service
    pub fn with_default_prices() -> Self {
        let now = Utc::now();
        let prices = ServiceCode::ALL
            .into_iter()
            .map(|code| {
                (
                    code.as_str().to_string(),
                    PricingEntry {
                        service_code: code.as_str().to_string(),
                        credits: code.default_credits(),
                        is_active: true,
                        created_at: now,
                        updated_at: now,
                    },
                )
            })
            .collect();

        Self {
            tables: Mutex::new(Tables {
                prices,
                ..Default::default()
            }),
        }
    }

    /// Make every later call at `point` fail with a storage error
    pub async fn fail_on(&self, point: FailurePoint) {
        self.tables.lock().await.failures.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.tables.lock().await.failures.clear();
    }

    /// Number of redemption rows without a backing ledger entry
    pub async fn orphaned_redemptions(&self) -> usize {
        let tables = self.tables.lock().await;
        tables
            .redemptions
            .iter()
            .filter(|r| !tables.ledger.iter().any(|e| e.id == r.ledger_entry_id))
            .count()
    }

    /// Webhook deliveries that matched no order
    pub async fn unmatched_webhooks(&self) -> Vec<PaymentEvent> {
        let tables = self.tables.lock().await;
        tables
            .events
            .iter()
            .filter(|e| e.order_id.is_none())
            .cloned()
            .collect()
    }

    pub async fn saved_payment_methods(&self, account_id: &str) -> Vec<SavedPaymentMethod> {
        let tables = self.tables.lock().await;
        tables
            .methods
            .iter()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_entry(&self, entry: NewLedgerEntry) -> CreditResult<LedgerEntry> {
        let mut tables = self.tables.lock().await;
        let required = -entry.amount;
        let account_id = entry.account_id.clone();
        match tables.append(entry)? {
            Some(row) => Ok(row),
            None => Err(CreditError::InsufficientCredits {
                required,
                available: tables.total(&account_id),
            }),
        }
    }

    async fn append_unique(&self, entry: NewLedgerEntry) -> CreditResult<Option<LedgerEntry>> {
        if entry.is_debit() {
            return Err(CreditError::validation(
                "Unique ledger entries must be credits",
            ));
        }
        let mut tables = self.tables.lock().await;
        if tables.violates_unique(&entry) {
            return Ok(None);
        }
        tables.append(entry)
    }

    async fn balance(&self, account_id: &str) -> CreditResult<Option<AccountBalance>> {
        Ok(self.tables.lock().await.balances.get(account_id).cloned())
    }

    async fn history(
        &self,
        account_id: &str,
        query: &HistoryQuery,
    ) -> CreditResult<Vec<LedgerEntry>> {
        let query = query.normalized();
        let tables = self.tables.lock().await;
        Ok(tables
            .ledger
            .iter()
            .rev()
            .filter(|e| e.account_id == account_id)
            .filter(|e| query.event_kind.map_or(true, |k| e.event_kind == k))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn ledger_sum(&self, account_id: &str) -> CreditResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.account_id == account_id)
            .map(|e| e.amount)
            .sum())
    }
}

#[async_trait]
impl PricingStore for MemoryStore {
    async fn find_price(&self, service_code: &str) -> CreditResult<Option<PricingEntry>> {
        let tables = self.tables.lock().await;
        tables.check(FailurePoint::PricingLookup)?;
        Ok(tables.prices.get(service_code).cloned())
    }

    async fn list_prices(&self, include_inactive: bool) -> CreditResult<Vec<PricingEntry>> {
        let tables = self.tables.lock().await;
        let mut prices: Vec<_> = tables
            .prices
            .values()
            .filter(|p| include_inactive || p.is_active)
            .cloned()
            .collect();
        prices.sort_by(|a, b| a.service_code.cmp(&b.service_code));
        Ok(prices)
    }

    async fn upsert_price(&self, service_code: &str, credits: i64) -> CreditResult<PricingEntry> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        let entry = tables
            .prices
            .entry(service_code.to_string())
            .and_modify(|p| {
                p.credits = credits;
                p.is_active = true;
                p.updated_at = now;
            })
            .or_insert_with(|| PricingEntry {
                service_code: service_code.to_string(),
                credits,
                is_active: true,
                created_at: now,
                updated_at: now,
            });
        Ok(entry.clone())
    }

    async fn set_price_active(
        &self,
        service_code: &str,
        is_active: bool,
    ) -> CreditResult<Option<PricingEntry>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.prices.get_mut(service_code).map(|p| {
            p.is_active = is_active;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }
}

#[async_trait]
impl EditLogStore for MemoryStore {
    async fn count_edits(&self, account_id: &str, kind: EditKind) -> CreditResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .edits
            .iter()
            .filter(|e| e.account_id == account_id && e.kind == kind)
            .count() as i64)
    }

    async fn record_edit(&self, record: NewEditRecord) -> CreditResult<EditRecord> {
        let mut tables = self.tables.lock().await;
        tables.check(FailurePoint::RecordEdit)?;
        let row = EditRecord {
            id: tables.next_id(),
            account_id: record.account_id,
            kind: record.kind,
            story_ref: record.story_ref,
            credits_charged: record.credits_charged,
            ledger_entry_id: record.ledger_entry_id,
            metadata: record.metadata,
            created_at: Utc::now(),
        };
        tables.edits.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl PromotionStore for MemoryStore {
    async fn find_promotion(&self, code: &str) -> CreditResult<Option<PromotionCode>> {
        Ok(self.tables.lock().await.promotions.get(code).cloned())
    }

    async fn insert_promotion(&self, promotion: NewPromotionCode) -> CreditResult<PromotionCode> {
        let mut tables = self.tables.lock().await;
        if tables.promotions.contains_key(&promotion.code) {
            return Err(anyhow!("promotion code {} already exists", promotion.code).into());
        }
        let now = Utc::now();
        let row = PromotionCode {
            id: Uuid::new_v4(),
            code: promotion.code,
            credits: promotion.credits,
            is_active: true,
            valid_from: promotion.valid_from,
            valid_until: promotion.valid_until,
            max_redemptions_per_account: promotion.max_redemptions_per_account,
            max_redemptions_total: promotion.max_redemptions_total,
            created_at: now,
            updated_at: now,
        };
        tables.promotions.insert(row.code.clone(), row.clone());
        Ok(row)
    }

    async fn set_promotion_active(
        &self,
        code: &str,
        is_active: bool,
    ) -> CreditResult<Option<PromotionCode>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.promotions.get_mut(code).map(|p| {
            p.is_active = is_active;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }

    async fn count_redemptions(
        &self,
        promotion_id: Uuid,
        account_id: Option<&str>,
    ) -> CreditResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .redemptions
            .iter()
            .filter(|r| r.promotion_id == promotion_id)
            .filter(|r| account_id.map_or(true, |a| r.account_id == a))
            .count() as i64)
    }

    async fn redeem(
        &self,
        promotion: &PromotionCode,
        account_id: &str,
    ) -> CreditResult<RedemptionOutcome> {
        let mut tables = self.tables.lock().await;
        let locked = tables
            .promotions
            .get(&promotion.code)
            .cloned()
            .ok_or_else(|| CreditError::not_found("Promotion code", &promotion.code))?;

        if !locked.is_active || !locked.is_within_window(Utc::now()) {
            return Ok(RedemptionOutcome::Unavailable);
        }

        let redemptions: Vec<_> = tables
            .redemptions
            .iter()
            .filter(|r| r.promotion_id == locked.id)
            .collect();
        let by_account = redemptions
            .iter()
            .filter(|r| r.account_id == account_id)
            .count() as i64;
        if by_account >= locked.per_account_cap() {
            return Ok(RedemptionOutcome::AccountCapReached);
        }
        if locked
            .global_cap()
            .is_some_and(|cap| redemptions.len() as i64 >= cap)
        {
            return Ok(RedemptionOutcome::GlobalCapReached);
        }

        let entry = tables
            .append(NewLedgerEntry::new(
                account_id,
                locked.credits,
                EventKind::Voucher,
                LedgerRefs::default().with_description(format!("Promotion code {}", locked.code)),
            ))?
            .ok_or_else(|| anyhow!("Promotion credit was treated as a debit"))?;

        let redemption = PromotionRedemption {
            id: tables.next_id(),
            promotion_id: locked.id,
            account_id: account_id.to_string(),
            credits_granted: locked.credits,
            ledger_entry_id: entry.id,
            created_at: Utc::now(),
        };
        tables.redemptions.push(redemption.clone());
        Ok(RedemptionOutcome::Redeemed { redemption, entry })
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_order(
        &self,
        order: NewPaymentOrder,
        event: NewPaymentEvent,
    ) -> CreditResult<PaymentOrder> {
        let mut tables = self.tables.lock().await;
        if tables
            .orders
            .values()
            .any(|o| o.provider_order_id == order.provider_order_id)
        {
            return Err(anyhow!(
                "provider order {} already recorded",
                order.provider_order_id
            )
            .into());
        }
        tables.check(FailurePoint::OrderEvent)?;

        let now = Utc::now();
        let row = PaymentOrder {
            id: order.id,
            account_id: order.account_id,
            amount_minor: order.amount_minor,
            currency: order.currency,
            status: OrderStatus::Pending,
            provider_order_id: order.provider_order_id,
            provider_token: order.provider_token,
            credits: order.credits,
            bundle: Json(order.bundle),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        tables.orders.insert(row.id, row.clone());
        tables.push_event(Some(row.id), None, event);
        Ok(row)
    }

    async fn find_order(&self, id: Uuid) -> CreditResult<Option<PaymentOrder>> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn find_order_by_provider_ref(
        &self,
        provider_order_id: &str,
    ) -> CreditResult<Option<PaymentOrder>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.provider_order_id == provider_order_id)
            .cloned())
    }

    async fn list_orders(&self, account_id: &str, limit: i64) -> CreditResult<Vec<PaymentOrder>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| o.account_id == account_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit.max(0) as usize);
        Ok(orders)
    }

    async fn record_webhook(
        &self,
        provider_order_id: &str,
        payload: serde_json::Value,
    ) -> CreditResult<PaymentEvent> {
        let mut tables = self.tables.lock().await;
        tables.check(FailurePoint::WebhookDelivery)?;
        let order_id = tables
            .orders
            .values()
            .find(|o| o.provider_order_id == provider_order_id)
            .map(|o| o.id);
        Ok(tables.push_event(
            order_id,
            Some(provider_order_id.to_string()),
            NewPaymentEvent::new(event_types::WEBHOOK_RECEIVED, Some(payload)),
        ))
    }

    async fn record_event(
        &self,
        order_id: Uuid,
        event: NewPaymentEvent,
    ) -> CreditResult<PaymentEvent> {
        let mut tables = self.tables.lock().await;
        if !tables.orders.contains_key(&order_id) {
            return Err(anyhow!("payment event references unknown order {}", order_id).into());
        }
        tables.check(FailurePoint::OrderEvent)?;
        Ok(tables.push_event(Some(order_id), None, event))
    }

    async fn list_events(&self, order_id: Uuid) -> CreditResult<Vec<PaymentEvent>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.order_id == Some(order_id))
            .cloned()
            .collect())
    }

    async fn transition_status(
        &self,
        order_id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        event: NewPaymentEvent,
    ) -> CreditResult<Option<PaymentOrder>> {
        let mut tables = self.tables.lock().await;
        let matches = tables
            .orders
            .get(&order_id)
            .is_some_and(|o| from.contains(&o.status));
        if !matches {
            return Ok(None);
        }
        // Fail before touching the row so a failed event leaves the status as is
        tables.check(FailurePoint::OrderEvent)?;

        let now = Utc::now();
        let order = match tables.orders.get_mut(&order_id) {
            Some(row) => {
                row.status = to;
                row.updated_at = now;
                if to == OrderStatus::Completed {
                    row.completed_at = Some(now);
                }
                row.clone()
            }
            None => return Err(anyhow!("payment order {} vanished", order_id).into()),
        };
        tables.push_event(Some(order_id), None, event);
        Ok(Some(order))
    }

    async fn complete_order(&self, order_id: Uuid) -> CreditResult<Option<OrderCompletion>> {
        let mut tables = self.tables.lock().await;
        let sources = OrderStatus::sources_for(OrderStatus::Completed);
        let order = match tables.orders.get(&order_id) {
            Some(order) if sources.contains(&order.status) => order.clone(),
            _ => return Ok(None),
        };

        let entry = NewLedgerEntry::new(
            order.account_id.clone(),
            order.credits,
            EventKind::Purchase,
            LedgerRefs::purchase(order.id.to_string())
                .with_description(format!("Credit purchase ({} credits)", order.credits)),
        );
        if tables.violates_unique(&entry) {
            return Err(anyhow!(
                "Purchase credit already exists for order {} that was not completed",
                order.id
            )
            .into());
        }
        tables.check(FailurePoint::OrderEvent)?;
        // Append first: a failure leaves the order untouched
        let entry = tables
            .append(entry)?
            .ok_or_else(|| anyhow!("Purchase credit was treated as a debit"))?;

        let now = Utc::now();
        let order = match tables.orders.get_mut(&order_id) {
            Some(row) => {
                row.status = OrderStatus::Completed;
                row.updated_at = now;
                row.completed_at = Some(now);
                row.clone()
            }
            None => return Err(anyhow!("payment order {} vanished", order_id).into()),
        };
        tables.push_event(Some(order_id), None, OrderCompletion::event(&entry));
        Ok(Some(OrderCompletion { order, entry }))
    }

    async fn save_payment_method(
        &self,
        account_id: &str,
        method: &PaymentMethodDetails,
    ) -> CreditResult<SavedPaymentMethod> {
        let mut tables = self.tables.lock().await;
        tables.check(FailurePoint::SavePaymentMethod)?;
        let now = Utc::now();
        if let Some(existing) = tables
            .methods
            .iter_mut()
            .find(|m| m.account_id == account_id && m.provider_method_id == method.id)
        {
            existing.method_type = method.method_type.clone();
            existing.card_brand = method.card_brand.clone();
            existing.card_last_four = method.card_last_four.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let row = SavedPaymentMethod {
            id: tables.next_id(),
            account_id: account_id.to_string(),
            provider_method_id: method.id.clone(),
            method_type: method.method_type.clone(),
            card_brand: method.card_brand.clone(),
            card_last_four: method.card_last_four.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.methods.push(row.clone());
        Ok(row)
    }
}
