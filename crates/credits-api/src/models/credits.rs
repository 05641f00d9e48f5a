//! Credit balance, ledger history and promotion DTOs

use chrono::{DateTime, Utc};
use credit_engine::models::{LedgerEntry, RedeemedPromotion};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::common::default_limit;

// ============================================================================
// Balance DTOs
// ============================================================================

/// Current balance of the calling account
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: i64,
}

/// Result of a signup grant request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InitialGrantResponse {
    /// False when the grant is disabled or was already applied
    pub granted: bool,
    pub credits: i64,
    pub balance: i64,
}

/// Advisory affordability check
#[derive(Debug, Deserialize, Validate)]
pub struct AffordabilityQuery {
    /// Catalog service code; its current cost is checked
    pub service: Option<String>,
    /// Explicit amount, used when no service is given
    #[validate(range(min = 1))]
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AffordabilityResponse {
    pub can_afford: bool,
    pub required: i64,
    pub balance: i64,
}

// ============================================================================
// Ledger DTOs
// ============================================================================

/// One immutable ledger entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub id: i64,
    /// Signed amount (negative = debit)
    pub amount: i64,
    pub event_kind: String,
    pub story_ref: Option<String>,
    pub purchase_ref: Option<String>,
    pub description: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            amount: entry.amount,
            event_kind: entry.event_kind.to_string(),
            story_ref: entry.story_ref,
            purchase_ref: entry.purchase_ref,
            description: entry.description,
            balance_after: entry.balance_after,
            created_at: entry.created_at,
        }
    }
}

/// Query parameters for listing ledger history
#[derive(Debug, Deserialize, Validate)]
pub struct HistoryParams {
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[validate(range(min = 0))]
    #[serde(default)]
    pub offset: i64,

    /// Filter by ledger event kind
    pub event_kind: Option<String>,
}

/// Charge a catalog service to the calling account
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DeductRequest {
    /// Catalog service code, e.g. `story_generation`
    pub service: String,
    #[validate(length(max = 128))]
    pub story_ref: Option<String>,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

// ============================================================================
// Promotion DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RedeemRequest {
    #[validate(length(max = 64))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RedeemResponse {
    pub code: String,
    pub credits_granted: i64,
    pub new_balance: i64,
}

impl From<RedeemedPromotion> for RedeemResponse {
    fn from(redeemed: RedeemedPromotion) -> Self {
        Self {
            code: redeemed.code,
            credits_granted: redeemed.credits_granted,
            new_balance: redeemed.new_balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_params_defaults() {
        let params: HistoryParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 20);
        assert_eq!(params.offset, 0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_history_params_limit_bounds() {
        let params: HistoryParams = serde_json::from_str(r#"{"limit": 101}"#).unwrap();
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_affordability_rejects_non_positive_amount() {
        let query = AffordabilityQuery {
            service: None,
            amount: Some(0),
        };
        assert!(query.validate().is_err());
    }
}
