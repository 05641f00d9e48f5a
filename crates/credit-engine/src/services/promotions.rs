//! Promotion code redemption and administration

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::ledger::validate_account;
use crate::error::{CreditError, CreditResult};
use crate::models::{NewPromotionCode, PromotionCode, RedeemedPromotion, RedemptionOutcome};
use crate::store::CreditStore;

/// Stored promotion codes: upper-case letters, digits, `_` and `-`
static PROMOTION_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("Invalid promotion code regex"));

pub fn is_valid_code_format(code: &str) -> bool {
    PROMOTION_CODE_REGEX.is_match(code)
}

/// Parameters for creating a promotion code
#[derive(Debug, Clone)]
pub struct PromotionSpec {
    pub code: String,
    pub credits: i64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_redemptions_per_account: Option<i32>,
    pub max_redemptions_total: Option<i32>,
}

#[derive(Clone)]
pub struct PromotionService {
    store: Arc<dyn CreditStore>,
}

impl PromotionService {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    /// Redeem a code for an account
    ///
    /// Every rejection surfaces as `InvalidPromotionCode`; the specific
    /// reason is only logged.
    pub async fn redeem(&self, account_id: &str, raw_code: &str) -> CreditResult<RedeemedPromotion> {
        validate_account(account_id)?;
        let code = PromotionCode::normalize(raw_code);
        if code.is_empty() {
            return Err(reject(account_id, &code, "empty code"));
        }

        let promotion = match self.store.find_promotion(&code).await? {
            Some(promotion) => promotion,
            None => return Err(reject(account_id, &code, "unknown code")),
        };
        if !promotion.is_active {
            return Err(reject(account_id, &code, "inactive"));
        }
        if !promotion.is_within_window(Utc::now()) {
            return Err(reject(account_id, &code, "outside validity window"));
        }
        if promotion.credits <= 0 {
            return Err(reject(account_id, &code, "non-positive credit amount"));
        }

        let by_account = self
            .store
            .count_redemptions(promotion.id, Some(account_id))
            .await?;
        if by_account >= promotion.per_account_cap() {
            return Err(reject(account_id, &code, "per-account cap reached"));
        }
        if let Some(cap) = promotion.global_cap() {
            let total = self.store.count_redemptions(promotion.id, None).await?;
            if total >= cap {
                return Err(reject(account_id, &code, "global cap reached"));
            }
        }

        // The store re-checks the caps under a lock; the counts above only
        // short-circuit the common rejection paths.
        match self.store.redeem(&promotion, account_id).await? {
            RedemptionOutcome::Redeemed { redemption, entry } => {
                metrics::counter!("credits.promotions.redeemed").increment(1);
                info!(
                    account_id = %account_id,
                    code = %code,
                    credits = redemption.credits_granted,
                    ledger_entry_id = entry.id,
                    "Promotion code redeemed"
                );
                Ok(RedeemedPromotion {
                    code,
                    credits_granted: redemption.credits_granted,
                    new_balance: entry.balance_after,
                })
            }
            RedemptionOutcome::Unavailable => Err(reject(account_id, &code, "deactivated concurrently")),
            RedemptionOutcome::AccountCapReached => {
                Err(reject(account_id, &code, "per-account cap reached concurrently"))
            }
            RedemptionOutcome::GlobalCapReached => {
                Err(reject(account_id, &code, "global cap reached concurrently"))
            }
        }
    }

    pub async fn create_promotion(&self, spec: PromotionSpec) -> CreditResult<PromotionCode> {
        let code = PromotionCode::normalize(&spec.code);
        if !is_valid_code_format(&code) {
            return Err(CreditError::validation(
                "Code must be 3-32 characters of A-Z, 0-9, '_' or '-'",
            ));
        }
        if spec.credits <= 0 {
            return Err(CreditError::validation("Credits must be positive"));
        }
        if let (Some(from), Some(until)) = (spec.valid_from, spec.valid_until) {
            if from >= until {
                return Err(CreditError::validation(
                    "valid_from must be before valid_until",
                ));
            }
        }
        if spec.max_redemptions_per_account.is_some_and(|cap| cap <= 0)
            || spec.max_redemptions_total.is_some_and(|cap| cap <= 0)
        {
            return Err(CreditError::validation("Redemption caps must be positive"));
        }
        if self.store.find_promotion(&code).await?.is_some() {
            return Err(CreditError::validation(format!(
                "Promotion code {} already exists",
                code
            )));
        }

        let promotion = self
            .store
            .insert_promotion(NewPromotionCode {
                code,
                credits: spec.credits,
                valid_from: spec.valid_from,
                valid_until: spec.valid_until,
                max_redemptions_per_account: spec.max_redemptions_per_account,
                max_redemptions_total: spec.max_redemptions_total,
            })
            .await?;

        info!(code = %promotion.code, credits = promotion.credits, "Promotion code created");
        Ok(promotion)
    }

    pub async fn deactivate_promotion(&self, raw_code: &str) -> CreditResult<PromotionCode> {
        let code = PromotionCode::normalize(raw_code);
        let promotion = self
            .store
            .set_promotion_active(&code, false)
            .await?
            .ok_or_else(|| CreditError::not_found("Promotion code", &code))?;
        info!(code = %code, "Promotion code deactivated");
        Ok(promotion)
    }

    pub async fn get_promotion(&self, raw_code: &str) -> CreditResult<PromotionCode> {
        let code = PromotionCode::normalize(raw_code);
        self.store
            .find_promotion(&code)
            .await?
            .ok_or_else(|| CreditError::not_found("Promotion code", &code))
    }
}

fn reject(account_id: &str, code: &str, reason: &'static str) -> CreditError {
    metrics::counter!("credits.promotions.rejected", "reason" => reason).increment(1);
    info!(account_id = %account_id, code = %code, reason, "Promotion code rejected");
    CreditError::InvalidPromotionCode
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LedgerStore, MemoryStore};
    use chrono::Duration;

    fn spec(code: &str, credits: i64) -> PromotionSpec {
        PromotionSpec {
            code: code.to_string(),
            credits,
            valid_from: None,
            valid_until: None,
            max_redemptions_per_account: None,
            max_redemptions_total: None,
        }
    }

    fn setup() -> (Arc<MemoryStore>, PromotionService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), PromotionService::new(store))
    }

    #[test]
    fn test_code_format() {
        assert!(is_valid_code_format("WELCOME10"));
        assert!(is_valid_code_format("SPRING_2026-A"));
        assert!(!is_valid_code_format("AB"));
        assert!(!is_valid_code_format("welcome"));
        assert!(!is_valid_code_format("HAS SPACE"));
    }

    #[tokio::test]
    async fn test_redeem_normalizes_input() {
        let (store, service) = setup();
        service.create_promotion(spec("welcome10", 10)).await.unwrap();

        let redeemed = service.redeem("acct", "  Welcome10 ").await.unwrap();
        assert_eq!(redeemed.code, "WELCOME10");
        assert_eq!(redeemed.credits_granted, 10);
        assert_eq!(redeemed.new_balance, 10);
        assert_eq!(store.balance("acct").await.unwrap().unwrap().total, 10);

        let history = store
            .history(
                "acct",
                &crate::models::HistoryQuery {
                    limit: 10,
                    offset: 0,
                    event_kind: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event_kind, crate::models::EventKind::Voucher);
    }

    #[tokio::test]
    async fn test_default_per_account_cap_is_one() {
        let (_, service) = setup();
        service.create_promotion(spec("ONCE", 5)).await.unwrap();

        service.redeem("acct", "ONCE").await.unwrap();
        assert!(matches!(
            service.redeem("acct", "ONCE").await,
            Err(CreditError::InvalidPromotionCode)
        ));
        // A different account may still redeem
        assert!(service.redeem("other", "ONCE").await.is_ok());
    }

    #[tokio::test]
    async fn test_global_cap() {
        let (_, service) = setup();
        service
            .create_promotion(PromotionSpec {
                max_redemptions_total: Some(2),
                ..spec("LIMITED", 3)
            })
            .await
            .unwrap();

        service.redeem("a", "LIMITED").await.unwrap();
        service.redeem("b", "LIMITED").await.unwrap();
        assert!(matches!(
            service.redeem("c", "LIMITED").await,
            Err(CreditError::InvalidPromotionCode)
        ));
    }

    #[tokio::test]
    async fn test_rejections_are_generic() {
        let (_, service) = setup();
        let now = Utc::now();
        service
            .create_promotion(PromotionSpec {
                valid_from: Some(now + Duration::days(1)),
                valid_until: Some(now + Duration::days(2)),
                ..spec("FUTURE", 5)
            })
            .await
            .unwrap();
        service.create_promotion(spec("RETIRED", 5)).await.unwrap();
        service.deactivate_promotion("retired").await.unwrap();

        for code in ["", "NOPE", "FUTURE", "RETIRED"] {
            assert!(
                matches!(
                    service.redeem("acct", code).await,
                    Err(CreditError::InvalidPromotionCode)
                ),
                "{code}"
            );
        }
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (_, service) = setup();
        assert!(matches!(
            service.create_promotion(spec("X", 5)).await,
            Err(CreditError::Validation(_))
        ));
        assert!(matches!(
            service.create_promotion(spec("ZERO", 0)).await,
            Err(CreditError::Validation(_))
        ));
        assert!(matches!(
            service
                .create_promotion(PromotionSpec {
                    max_redemptions_total: Some(0),
                    ..spec("NOCAP", 1)
                })
                .await,
            Err(CreditError::Validation(_))
        ));

        service.create_promotion(spec("DUP", 1)).await.unwrap();
        assert!(matches!(
            service.create_promotion(spec("dup", 1)).await,
            Err(CreditError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_promotion() {
        let (_, service) = setup();
        service.create_promotion(spec("FIND_ME", 4)).await.unwrap();
        assert_eq!(service.get_promotion("find_me").await.unwrap().credits, 4);
        assert!(matches!(
            service.get_promotion("MISSING").await,
            Err(CreditError::NotFound { .. })
        ));
    }
}
