//! Postgres pool and schema helpers for the credit store

use std::time::Duration;

use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::error::Result;

pub type DbPool = PgPool;

/// What the credit store looks like from a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    /// Latest successfully applied migration, if any.
    pub schema_version: Option<i64>,
    /// Planner estimate of balance rows; -1 before the first ANALYZE.
    pub approx_accounts: i64,
}

/// Connect to the credit database.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.connection_url())
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Credit database pool ready"
    );
    Ok(pool)
}

/// Apply the ledger, pricing, promotion and payment migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("../../database/migrations").run(pool).await?;
    Ok(())
}

/// Read the schema version and resolve the balance table.
///
/// Fails when the database is unreachable or the ledger tables are missing,
/// so a successful result means credit operations can be served.
pub async fn ledger_status(pool: &DbPool) -> Result<LedgerStatus> {
    let (schema_version, approx_accounts): (Option<i64>, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT MAX(version) FROM _sqlx_migrations WHERE success),
            (SELECT reltuples::BIGINT FROM pg_class WHERE oid = 'account_balances'::regclass)
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(LedgerStatus {
        schema_version,
        approx_accounts,
    })
}
