//! Pricing catalog repository

use anyhow::{Context, Result};
use shared::DbPool;
use sqlx::{Executor, Postgres};

use crate::models::PricingEntry;

pub struct PricingRepository;

impl PricingRepository {
    /// Find a catalog entry by service code, active or not
    pub async fn find(pool: &DbPool, service_code: &str) -> Result<Option<PricingEntry>> {
        let entry = sqlx::query_as::<_, PricingEntry>(
            r#"
            SELECT * FROM pricing_catalog
            WHERE service_code = $1
            "#,
        )
        .bind(service_code)
        .fetch_optional(pool)
        .await
        .context("Failed to find pricing entry")?;

        Ok(entry)
    }

    /// List catalog entries ordered by service code
    pub async fn list(pool: &DbPool, include_inactive: bool) -> Result<Vec<PricingEntry>> {
        let entries = sqlx::query_as::<_, PricingEntry>(
            r#"
            SELECT * FROM pricing_catalog
            WHERE $1 OR is_active
            ORDER BY service_code
            "#,
        )
        .bind(include_inactive)
        .fetch_all(pool)
        .await
        .context("Failed to list pricing entries")?;

        Ok(entries)
    }

    /// Create or update the cost of a service (re-activates it)
    pub async fn upsert<'e, E>(executor: E, service_code: &str, credits: i64) -> Result<PricingEntry>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, PricingEntry>(
            r#"
            INSERT INTO pricing_catalog (service_code, credits, is_active, created_at, updated_at)
            VALUES ($1, $2, TRUE, NOW(), NOW())
            ON CONFLICT (service_code) DO UPDATE SET
                credits = EXCLUDED.credits,
                is_active = TRUE,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(service_code)
        .bind(credits)
        .fetch_one(executor)
        .await
        .context("Failed to upsert pricing entry")?;

        Ok(entry)
    }

    /// Toggle the active flag (entries are never deleted)
    pub async fn set_active<'e, E>(
        executor: E,
        service_code: &str,
        is_active: bool,
    ) -> Result<Option<PricingEntry>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let entry = sqlx::query_as::<_, PricingEntry>(
            r#"
            UPDATE pricing_catalog
            SET is_active = $2, updated_at = NOW()
            WHERE service_code = $1
            RETURNING *
            "#,
        )
        .bind(service_code)
        .bind(is_active)
        .fetch_optional(executor)
        .await
        .context("Failed to update pricing entry")?;

        Ok(entry)
    }
}
