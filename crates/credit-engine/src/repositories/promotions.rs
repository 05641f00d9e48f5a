//! Promotion code and redemption repositories

use anyhow::{Context, Result};
use sqlx::{Executor, PgConnection, Postgres};
use uuid::Uuid;

use crate::models::{NewPromotionCode, PromotionCode, PromotionRedemption};

pub struct PromotionRepository;

impl PromotionRepository {
    /// Find a promotion by its normalized code
    pub async fn find_by_code<'e, E>(executor: E, code: &str) -> Result<Option<PromotionCode>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let promotion = sqlx::query_as::<_, PromotionCode>(
            r#"
            SELECT * FROM promotion_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(executor)
        .await
        .context("Failed to find promotion code")?;

        Ok(promotion)
    }

    /// Lock a promotion row for the rest of the transaction
    ///
    /// Concurrent redemptions of the same code queue on this lock, so the
    /// cap counts taken afterwards are exact.
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<PromotionCode>> {
        let promotion = sqlx::query_as::<_, PromotionCode>(
            r#"
            SELECT * FROM promotion_codes
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await
        .context("Failed to lock promotion code")?;

        Ok(promotion)
    }

    /// Create a promotion code
    pub async fn insert<'e, E>(executor: E, promotion: &NewPromotionCode) -> Result<PromotionCode>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PromotionCode>(
            r#"
            INSERT INTO promotion_codes (
                id, code, credits, is_active, valid_from, valid_until,
                max_redemptions_per_account, max_redemptions_total,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&promotion.code)
        .bind(promotion.credits)
        .bind(promotion.valid_from)
        .bind(promotion.valid_until)
        .bind(promotion.max_redemptions_per_account)
        .bind(promotion.max_redemptions_total)
        .fetch_one(executor)
        .await
        .context("Failed to create promotion code")?;

        Ok(row)
    }

    /// Toggle the active flag
    pub async fn set_active<'e, E>(
        executor: E,
        code: &str,
        is_active: bool,
    ) -> Result<Option<PromotionCode>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PromotionCode>(
            r#"
            UPDATE promotion_codes
            SET is_active = $2, updated_at = NOW()
            WHERE code = $1
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(is_active)
        .fetch_optional(executor)
        .await
        .context("Failed to update promotion code")?;

        Ok(row)
    }
}

pub struct RedemptionRepository;

impl RedemptionRepository {
    /// Count redemptions of a promotion, optionally restricted to one account
    pub async fn count<'e, E>(
        executor: E,
        promotion_id: Uuid,
        account_id: Option<&str>,
    ) -> Result<i64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM promotion_redemptions
            WHERE promotion_id = $1
              AND ($2::TEXT IS NULL OR account_id = $2)
            "#,
        )
        .bind(promotion_id)
        .bind(account_id)
        .fetch_one(executor)
        .await
        .context("Failed to count promotion redemptions")?;

        Ok(count)
    }

    /// Record a redemption backed by a committed-in-transaction ledger entry
    pub async fn insert<'e, E>(
        executor: E,
        promotion_id: Uuid,
        account_id: &str,
        credits_granted: i64,
        ledger_entry_id: i64,
    ) -> Result<PromotionRedemption>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PromotionRedemption>(
            r#"
            INSERT INTO promotion_redemptions (
                promotion_id, account_id, credits_granted, ledger_entry_id, created_at
            )
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(promotion_id)
        .bind(account_id)
        .bind(credits_granted)
        .bind(ledger_entry_id)
        .fetch_one(executor)
        .await
        .context("Failed to record promotion redemption")?;

        Ok(row)
    }
}
