//! Promotional codes and redemptions

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::LedgerEntry;

/// Per-account cap applied when a code does not set one
pub const DEFAULT_REDEMPTIONS_PER_ACCOUNT: i32 = 1;

/// Database model for the promotion_codes table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PromotionCode {
    pub id: Uuid,
    /// Normalized (trimmed, upper-case) code
    pub code: String,
    pub credits: i64,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_redemptions_per_account: Option<i32>,
    pub max_redemptions_total: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PromotionCode {
    /// Normalize user input into the stored code form
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    /// Whether `now` falls inside the optional validity window
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.valid_from.map_or(true, |from| now >= from);
        let not_ended = self.valid_until.map_or(true, |until| now <= until);
        started && not_ended
    }

    pub fn per_account_cap(&self) -> i64 {
        i64::from(
            self.max_redemptions_per_account
                .unwrap_or(DEFAULT_REDEMPTIONS_PER_ACCOUNT),
        )
    }

    pub fn global_cap(&self) -> Option<i64> {
        self.max_redemptions_total.map(i64::from)
    }
}

/// Parameters for creating a promotion code
#[derive(Debug, Clone)]
pub struct NewPromotionCode {
    pub code: String,
    pub credits: i64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_redemptions_per_account: Option<i32>,
    pub max_redemptions_total: Option<i32>,
}

/// Database model for the promotion_redemptions table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PromotionRedemption {
    pub id: i64,
    pub promotion_id: Uuid,
    pub account_id: String,
    pub credits_granted: i64,
    pub ledger_entry_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Storage-level outcome of an atomic redemption attempt
#[derive(Debug, Clone)]
pub enum RedemptionOutcome {
    Redeemed {
        redemption: PromotionRedemption,
        entry: LedgerEntry,
    },
    /// Deactivated or outside its window once locked
    Unavailable,
    AccountCapReached,
    GlobalCapReached,
}

/// Result returned to the caller after a successful redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemedPromotion {
    pub code: String,
    pub credits_granted: i64,
    pub new_balance: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promotion() -> PromotionCode {
        let now = Utc::now();
        PromotionCode {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            credits: 10,
            is_active: true,
            valid_from: None,
            valid_until: None,
            max_redemptions_per_account: None,
            max_redemptions_total: Some(100),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(PromotionCode::normalize("  welcome10 \n"), "WELCOME10");
        assert_eq!(PromotionCode::normalize(""), "");
    }

    #[test]
    fn test_window_open_ended() {
        assert!(promotion().is_within_window(Utc::now()));
    }

    #[test]
    fn test_window_bounds() {
        let now = Utc::now();
        let promo = PromotionCode {
            valid_from: Some(now - Duration::days(1)),
            valid_until: Some(now + Duration::days(1)),
            ..promotion()
        };
        assert!(promo.is_within_window(now));
        assert!(!promo.is_within_window(now - Duration::days(2)));
        assert!(!promo.is_within_window(now + Duration::days(2)));
    }

    #[test]
    fn test_default_caps() {
        let promo = promotion();
        assert_eq!(promo.per_account_cap(), 1);
        assert_eq!(promo.global_cap(), Some(100));
    }
}
