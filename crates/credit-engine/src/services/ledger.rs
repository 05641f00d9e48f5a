//! Ledger service: balance reads, guarded debits and credits
//!
//! The only path that changes an account balance. Every mutation is a
//! single `LedgerStore::append_entry`, which writes the immutable entry and
//! the projection together.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{CreditError, CreditResult};
use crate::models::{BalanceCheck, EventKind, HistoryQuery, LedgerEntry, LedgerRefs, NewLedgerEntry};
use crate::store::CreditStore;

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn CreditStore>,
    initial_grant_credits: i64,
}

impl LedgerService {
    pub fn new(store: Arc<dyn CreditStore>, initial_grant_credits: i64) -> Self {
        Self {
            store,
            initial_grant_credits,
        }
    }

    /// Append a signed entry and project it onto the balance
    pub async fn append_entry(
        &self,
        account_id: &str,
        amount: i64,
        event_kind: EventKind,
        refs: LedgerRefs,
    ) -> CreditResult<LedgerEntry> {
        validate_account(account_id)?;
        if amount == 0 {
            return Err(CreditError::validation("Amount must be non-zero"));
        }

        let result = self
            .store
            .append_entry(NewLedgerEntry::new(account_id, amount, event_kind, refs))
            .await;

        match &result {
            Ok(entry) => {
                metrics::counter!("credits.ledger.appends", "kind" => event_kind.as_str())
                    .increment(1);
                debug!(
                    account_id = %account_id,
                    entry_id = entry.id,
                    amount,
                    kind = %event_kind,
                    balance = entry.balance_after,
                    "Ledger entry appended"
                );
            }
            Err(CreditError::InsufficientCredits {
                required,
                available,
            }) => {
                metrics::counter!("credits.debits.rejected", "kind" => event_kind.as_str())
                    .increment(1);
                info!(
                    account_id = %account_id,
                    required,
                    available,
                    kind = %event_kind,
                    "Debit rejected: insufficient credits"
                );
            }
            Err(e) => {
                error!(account_id = %account_id, error = %e, "Ledger append failed");
            }
        }

        result
    }

    /// Current projected balance, 0 for unknown accounts
    pub async fn get_balance(&self, account_id: &str) -> CreditResult<i64> {
        validate_account(account_id)?;
        Ok(self
            .store
            .balance(account_id)
            .await?
            .map_or(0, |b| b.total))
    }

    /// Ledger entries, newest first
    pub async fn get_history(
        &self,
        account_id: &str,
        query: &HistoryQuery,
    ) -> CreditResult<Vec<LedgerEntry>> {
        validate_account(account_id)?;
        self.store.history(account_id, &query.normalized()).await
    }

    /// Spend credits on a feature; fails without side effects if not affordable
    pub async fn deduct_credits(
        &self,
        account_id: &str,
        amount: i64,
        event_kind: EventKind,
        refs: LedgerRefs,
    ) -> CreditResult<LedgerEntry> {
        if amount <= 0 {
            return Err(CreditError::validation("Deduction amount must be positive"));
        }
        if !event_kind.is_feature_charge() {
            return Err(CreditError::validation(format!(
                "{} is not a chargeable event kind",
                event_kind
            )));
        }
        self.append_entry(account_id, -amount, event_kind, refs).await
    }

    /// Add credits to an account
    pub async fn grant_credits(
        &self,
        account_id: &str,
        amount: i64,
        event_kind: EventKind,
        refs: LedgerRefs,
    ) -> CreditResult<LedgerEntry> {
        if amount <= 0 {
            return Err(CreditError::validation("Grant amount must be positive"));
        }
        self.append_entry(account_id, amount, event_kind, refs).await
    }

    /// Advisory affordability check; the debit itself re-checks atomically
    pub async fn can_afford(&self, account_id: &str, amount: i64) -> CreditResult<bool> {
        if amount <= 0 {
            return Ok(true);
        }
        Ok(self.get_balance(account_id).await? >= amount)
    }

    /// One-time signup grant. Returns None when disabled or already granted.
    pub async fn grant_initial_credits(&self, account_id: &str) -> CreditResult<Option<LedgerEntry>> {
        validate_account(account_id)?;
        if self.initial_grant_credits <= 0 {
            return Ok(None);
        }

        let entry = self
            .store
            .append_unique(NewLedgerEntry::new(
                account_id,
                self.initial_grant_credits,
                EventKind::InitialGrant,
                LedgerRefs::default().with_description("Welcome credits"),
            ))
            .await?;

        match &entry {
            Some(entry) => {
                metrics::counter!("credits.ledger.appends", "kind" => "initial_grant").increment(1);
                info!(
                    account_id = %account_id,
                    credits = entry.amount,
                    "Initial credits granted"
                );
            }
            None => debug!(account_id = %account_id, "Initial credits already granted"),
        }
        Ok(entry)
    }

    /// Return credits for a failed or reversed feature
    pub async fn refund(
        &self,
        account_id: &str,
        amount: i64,
        story_ref: Option<String>,
        purchase_ref: Option<String>,
    ) -> CreditResult<LedgerEntry> {
        let refs = LedgerRefs {
            story_ref,
            purchase_ref,
            description: Some("Refund".to_string()),
        };
        self.grant_credits(account_id, amount, EventKind::Refund, refs)
            .await
    }

    /// Compare the projection against the ledger sum. Never repairs.
    pub async fn verify_balance(&self, account_id: &str) -> CreditResult<BalanceCheck> {
        let projected = self.get_balance(account_id).await?;
        let ledger_sum = self.store.ledger_sum(account_id).await?;
        let check = BalanceCheck {
            projected,
            ledger_sum,
            consistent: projected == ledger_sum,
        };
        if !check.consistent {
            error!(
                account_id = %account_id,
                projected,
                ledger_sum,
                "Balance projection diverged from ledger"
            );
        }
        Ok(check)
    }
}

pub(crate) fn validate_account(account_id: &str) -> CreditResult<()> {
    if account_id.trim().is_empty() {
        warn!("Rejected request with empty account id");
        return Err(CreditError::validation("Account id is required"));
    }
    Ok(())
}
