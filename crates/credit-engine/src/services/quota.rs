//! Quota-aware charging for repeated edit actions
//!
//! Whether an edit is free depends only on how many edits of that kind the
//! account has already recorded in the edit audit log. Text edits: the
//! first five are free, then every fifth edit (6th, 11th, 16th, ...) is
//! charged. Image edits: the first is free, every later one is charged.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::ledger::{validate_account, LedgerService};
use super::pricing::PricingCatalog;
use crate::error::{CreditError, CreditResult};
use crate::models::{
    EditCostItem, EditCostPreview, EditKind, EditPermission, EditReceipt, EditUsage, LedgerRefs,
    NewEditRecord,
};
use crate::store::CreditStore;

/// Free text edits before the periodic charge starts
pub const FREE_TEXT_EDITS: i64 = 5;
/// Period of charged text edits after the free allowance
pub const TEXT_EDIT_PERIOD: i64 = 5;
/// Upper bound for cost previews
pub const MAX_PREVIEW_EDITS: i64 = 50;

/// Whether the edit following `usage_count` prior edits is charged
pub fn is_charged(kind: EditKind, usage_count: i64) -> bool {
    match kind {
        EditKind::Text => usage_count >= FREE_TEXT_EDITS && usage_count % TEXT_EDIT_PERIOD == 0,
        EditKind::Image => usage_count >= 1,
    }
}

#[derive(Clone)]
pub struct EditChargeService {
    store: Arc<dyn CreditStore>,
    ledger: LedgerService,
    pricing: Arc<PricingCatalog>,
}

impl EditChargeService {
    pub fn new(
        store: Arc<dyn CreditStore>,
        ledger: LedgerService,
        pricing: Arc<PricingCatalog>,
    ) -> Self {
        Self {
            store,
            ledger,
            pricing,
        }
    }

    async fn unit_cost(&self, kind: EditKind) -> i64 {
        self.pricing.cost_or_fallback(kind.service_code()).await
    }

    /// Usage count and the credits the next edit would cost
    pub async fn calculate_required_credits(
        &self,
        account_id: &str,
        kind: EditKind,
    ) -> CreditResult<(i64, i64)> {
        validate_account(account_id)?;
        let usage_count = self.store.count_edits(account_id, kind).await?;
        let credits = if is_charged(kind, usage_count) {
            self.unit_cost(kind).await
        } else {
            0
        };
        Ok((usage_count, credits))
    }

    /// Advisory check before starting an edit
    pub async fn check_permission(
        &self,
        account_id: &str,
        kind: EditKind,
    ) -> CreditResult<EditPermission> {
        let (usage_count, required_credits) =
            self.calculate_required_credits(account_id, kind).await?;
        let current_balance = self.ledger.get_balance(account_id).await?;
        let can_edit = required_credits == 0 || current_balance >= required_credits;

        let message = if required_credits == 0 {
            "This edit is free".to_string()
        } else if can_edit {
            format!("This edit costs {} credit(s)", required_credits)
        } else {
            format!(
                "This edit costs {} credit(s) but only {} available",
                required_credits, current_balance
            )
        };

        Ok(EditPermission {
            can_edit,
            required_credits,
            current_balance,
            usage_count,
            message,
        })
    }

    /// Charge (if due) and log a completed edit
    ///
    /// The charge is recomputed here rather than trusted from an earlier
    /// permission check. The debit is committed before the audit row, so a
    /// failure between the two leaves a paid edit that is not counted rather
    /// than a counted edit that was never paid.
    pub async fn record_successful_edit(
        &self,
        account_id: &str,
        kind: EditKind,
        story_ref: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> CreditResult<EditReceipt> {
        let (usage_count, credits) = self.calculate_required_credits(account_id, kind).await?;

        let charge = if credits > 0 {
            let refs = LedgerRefs {
                story_ref: story_ref.clone(),
                purchase_ref: None,
                description: Some(format!("{} edit #{}", kind, usage_count + 1)),
            };
            Some(
                self.ledger
                    .deduct_credits(account_id, credits, kind.service_code().charge_kind(), refs)
                    .await?,
            )
        } else {
            None
        };

        let record = NewEditRecord {
            account_id: account_id.to_string(),
            kind,
            story_ref,
            credits_charged: credits,
            ledger_entry_id: charge.as_ref().map(|entry| entry.id),
            metadata,
        };

        let record = match self.store.record_edit(record).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    account_id = %account_id,
                    kind = %kind,
                    ledger_entry_id = ?charge.as_ref().map(|entry| entry.id),
                    error = %e,
                    "Edit audit insert failed after charge"
                );
                return Err(e);
            }
        };

        let balance = match &charge {
            Some(entry) => entry.balance_after,
            None => self.ledger.get_balance(account_id).await?,
        };

        if credits > 0 {
            info!(account_id = %account_id, kind = %kind, credits, balance, "Charged edit recorded");
        } else {
            debug!(account_id = %account_id, kind = %kind, usage_count, "Free edit recorded");
        }

        Ok(EditReceipt {
            record,
            charge,
            credits_charged: credits,
            balance,
        })
    }

    /// Cost breakdown of the next `count` edits without recording anything
    pub async fn preview_edits(
        &self,
        account_id: &str,
        kind: EditKind,
        count: i64,
    ) -> CreditResult<EditCostPreview> {
        if !(1..=MAX_PREVIEW_EDITS).contains(&count) {
            return Err(CreditError::validation(format!(
                "Preview count must be between 1 and {}",
                MAX_PREVIEW_EDITS
            )));
        }
        validate_account(account_id)?;

        let usage_count = self.store.count_edits(account_id, kind).await?;
        let unit_cost = self.unit_cost(kind).await;
        Ok(simulate(kind, usage_count, count, unit_cost))
    }

    /// Per-kind usage and next-edit cost
    pub async fn usage_stats(&self, account_id: &str) -> CreditResult<Vec<EditUsage>> {
        let mut usage = Vec::with_capacity(EditKind::ALL.len());
        for kind in EditKind::ALL {
            let (usage_count, next_edit_credits) =
                self.calculate_required_credits(account_id, kind).await?;
            usage.push(EditUsage {
                kind,
                usage_count,
                next_edit_credits,
            });
        }
        Ok(usage)
    }
}

/// Walk the usage count forward `count` times
fn simulate(kind: EditKind, usage_count: i64, count: i64, unit_cost: i64) -> EditCostPreview {
    let items: Vec<EditCostItem> = (usage_count..usage_count + count)
        .map(|n| {
            let free = !is_charged(kind, n);
            EditCostItem {
                edit_number: n + 1,
                free,
                credits: if free { 0 } else { unit_cost },
            }
        })
        .collect();
    let total_credits = items.iter().map(|item| item.credits).sum();

    EditCostPreview {
        kind,
        items,
        total_credits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;
    use crate::store::memory::FailurePoint;
    use crate::store::{LedgerStore, MemoryStore};
    use std::time::Duration;

    fn setup() -> (Arc<MemoryStore>, EditChargeService) {
        let store = Arc::new(MemoryStore::with_default_prices());
        let ledger = LedgerService::new(store.clone(), 0);
        let pricing = Arc::new(PricingCatalog::new(store.clone(), Duration::from_secs(60), 1));
        (store.clone(), EditChargeService::new(store, ledger, pricing))
    }

    async fn fund(store: &MemoryStore, account: &str, amount: i64) {
        store
            .append_entry(crate::models::NewLedgerEntry::new(
                account,
                amount,
                EventKind::Voucher,
                LedgerRefs::default(),
            ))
            .await
            .unwrap();
    }

    #[test]
    fn test_text_edit_quota_boundaries() {
        let charged: Vec<i64> = (0..16).filter(|n| is_charged(EditKind::Text, *n)).collect();
        assert_eq!(charged, vec![5, 10, 15]);
    }

    #[test]
    fn test_image_edit_quota_boundaries() {
        assert!(!is_charged(EditKind::Image, 0));
        assert!((1..10).all(|n| is_charged(EditKind::Image, n)));
    }

    #[test]
    fn test_simulate_preview() {
        let preview = simulate(EditKind::Text, 3, 8, 2);
        let charged: Vec<i64> = preview
            .items
            .iter()
            .filter(|item| !item.free)
            .map(|item| item.edit_number)
            .collect();
        assert_eq!(charged, vec![6]);
        assert_eq!(preview.items.first().unwrap().edit_number, 4);
        assert_eq!(preview.total_credits, 2);
    }

    #[tokio::test]
    async fn test_first_edits_are_free() {
        let (_, service) = setup();
        let permission = service.check_permission("acct", EditKind::Text).await.unwrap();
        assert!(permission.can_edit);
        assert_eq!(permission.required_credits, 0);
        assert_eq!(permission.usage_count, 0);
    }

    #[tokio::test]
    async fn test_charged_edit_needs_balance() {
        let (_, service) = setup();
        service
            .record_successful_edit("acct", EditKind::Image, None, None)
            .await
            .unwrap();

        let permission = service.check_permission("acct", EditKind::Image).await.unwrap();
        assert!(!permission.can_edit);
        assert_eq!(permission.required_credits, 2);
        assert_eq!(permission.current_balance, 0);

        let err = service
            .record_successful_edit("acct", EditKind::Image, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CreditError::InsufficientCredits { .. }));
        // Nothing counted for the rejected edit
        assert_eq!(
            service.calculate_required_credits("acct", EditKind::Image).await.unwrap().0,
            1
        );
    }

    #[tokio::test]
    async fn test_record_charges_and_links_ledger_entry() {
        let (store, service) = setup();
        fund(&store, "acct", 5).await;
        service
            .record_successful_edit("acct", EditKind::Image, Some("story".into()), None)
            .await
            .unwrap();

        let receipt = service
            .record_successful_edit(
                "acct",
                EditKind::Image,
                Some("story".into()),
                Some(serde_json::json!({"page": 3})),
            )
            .await
            .unwrap();

        let charge = receipt.charge.unwrap();
        assert_eq!(charge.amount, -2);
        assert_eq!(charge.event_kind, EventKind::ImageEdit);
        assert_eq!(receipt.record.ledger_entry_id, Some(charge.id));
        assert_eq!(receipt.record.credits_charged, 2);
        assert_eq!(receipt.balance, 3);
    }

    #[tokio::test]
    async fn test_audit_failure_after_charge_propagates() {
        let (store, service) = setup();
        fund(&store, "acct", 5).await;
        service
            .record_successful_edit("acct", EditKind::Image, None, None)
            .await
            .unwrap();

        store.fail_on(FailurePoint::RecordEdit).await;
        assert!(service
            .record_successful_edit("acct", EditKind::Image, None, None)
            .await
            .is_err());

        // The charge stands and the count is unchanged
        assert_eq!(store.balance("acct").await.unwrap().unwrap().total, 3);
        assert_eq!(
            service.calculate_required_credits("acct", EditKind::Image).await.unwrap().0,
            1
        );
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let (_, service) = setup();
        let preview = service.preview_edits("acct", EditKind::Text, 11).await.unwrap();
        assert_eq!(preview.total_credits, 2);
        assert_eq!(
            service.calculate_required_credits("acct", EditKind::Text).await.unwrap(),
            (0, 0)
        );
        assert!(matches!(
            service.preview_edits("acct", EditKind::Text, 0).await,
            Err(CreditError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_usage_stats() {
        let (_, service) = setup();
        service
            .record_successful_edit("acct", EditKind::Image, None, None)
            .await
            .unwrap();

        let stats = service.usage_stats("acct").await.unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].kind, EditKind::Text);
        assert_eq!(stats[0].next_edit_credits, 0);
        assert_eq!(stats[1].usage_count, 1);
        assert_eq!(stats[1].next_edit_credits, 2);
    }
}
