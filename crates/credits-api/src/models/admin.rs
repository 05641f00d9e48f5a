//! Operator DTOs: pricing catalog, promotion codes, refunds and audits

use chrono::{DateTime, Utc};
use credit_engine::models::{BalanceCheck, PricingEntry, PromotionCode};
use credit_engine::services::PromotionSpec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// Pricing DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PriceResponse {
    pub service_code: String,
    pub credits: i64,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<PricingEntry> for PriceResponse {
    fn from(entry: PricingEntry) -> Self {
        Self {
            service_code: entry.service_code,
            credits: entry.credits,
            is_active: entry.is_active,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PriceListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpsertPriceRequest {
    #[validate(range(min = 1))]
    pub credits: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

// ============================================================================
// Promotion DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePromotionRequest {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    #[validate(range(min = 1))]
    pub credits: i64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_redemptions_per_account: Option<i32>,
    #[validate(range(min = 1))]
    pub max_redemptions_total: Option<i32>,
}

impl From<CreatePromotionRequest> for PromotionSpec {
    fn from(req: CreatePromotionRequest) -> Self {
        Self {
            code: req.code,
            credits: req.credits,
            valid_from: req.valid_from,
            valid_until: req.valid_until,
            max_redemptions_per_account: req.max_redemptions_per_account,
            max_redemptions_total: req.max_redemptions_total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PromotionResponse {
    pub id: Uuid,
    pub code: String,
    pub credits: i64,
    pub is_active: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_redemptions_per_account: Option<i32>,
    pub max_redemptions_total: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<PromotionCode> for PromotionResponse {
    fn from(promotion: PromotionCode) -> Self {
        Self {
            id: promotion.id,
            code: promotion.code,
            credits: promotion.credits,
            is_active: promotion.is_active,
            valid_from: promotion.valid_from,
            valid_until: promotion.valid_until,
            max_redemptions_per_account: promotion.max_redemptions_per_account,
            max_redemptions_total: promotion.max_redemptions_total,
            created_at: promotion.created_at,
        }
    }
}

// ============================================================================
// Ledger operator DTOs
// ============================================================================

/// Return credits to an account
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefundRequest {
    #[validate(length(min = 1, max = 255))]
    pub account_id: String,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(max = 128))]
    pub story_ref: Option<String>,
    #[validate(length(max = 128))]
    pub purchase_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceCheckResponse {
    pub account_id: String,
    pub projected: i64,
    pub ledger_sum: i64,
    pub consistent: bool,
}

impl BalanceCheckResponse {
    pub fn new(account_id: &str, check: BalanceCheck) -> Self {
        Self {
            account_id: account_id.to_string(),
            projected: check.projected,
            ledger_sum: check.ledger_sum,
            consistent: check.consistent,
        }
    }
}
