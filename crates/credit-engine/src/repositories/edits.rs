//! Edit audit log repository

use anyhow::{Context, Result};
use shared::DbPool;
use sqlx::{Executor, Postgres};

use crate::models::{EditKind, EditRecord, NewEditRecord};

pub struct EditRepository;

impl EditRepository {
    /// Number of recorded edits of one kind for an account
    pub async fn count(pool: &DbPool, account_id: &str, kind: EditKind) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM edit_history
            WHERE account_id = $1 AND kind = $2
            "#,
        )
        .bind(account_id)
        .bind(kind)
        .fetch_one(pool)
        .await
        .context("Failed to count edits")?;

        Ok(count)
    }

    /// Append an edit audit row
    pub async fn insert<'e, E>(executor: E, record: &NewEditRecord) -> Result<EditRecord>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, EditRecord>(
            r#"
            INSERT INTO edit_history (
                account_id, kind, story_ref, credits_charged,
                ledger_entry_id, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(&record.account_id)
        .bind(record.kind)
        .bind(&record.story_ref)
        .bind(record.credits_charged)
        .bind(record.ledger_entry_id)
        .bind(&record.metadata)
        .fetch_one(executor)
        .await
        .context("Failed to insert edit record")?;

        Ok(row)
    }
}
