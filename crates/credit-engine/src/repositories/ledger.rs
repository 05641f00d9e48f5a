//! Ledger and balance projection repositories
//!
//! Every ledger append goes through [`LedgerRepository::append`], which
//! projects the amount onto `account_balances` and inserts the ledger row on
//! the same connection. Callers own the surrounding transaction so that
//! order completion and promotion redemption can include the append in
//! their own atomic unit.

use anyhow::{Context, Result};
use shared::DbPool;
use sqlx::{Executor, PgConnection, Postgres};

use crate::models::{AccountBalance, HistoryQuery, LedgerEntry, NewLedgerEntry};

pub struct BalanceRepository;

impl BalanceRepository {
    /// Get the projected balance row for an account
    pub async fn find<'e, E>(executor: E, account_id: &str) -> Result<Option<AccountBalance>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let balance = sqlx::query_as::<_, AccountBalance>(
            r#"
            SELECT account_id, total, updated_at FROM account_balances
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(executor)
        .await
        .context("Failed to get account balance")?;

        Ok(balance)
    }

    /// Increment the projection, creating the row on first credit (returns new total)
    pub async fn increment<'e, E>(executor: E, account_id: &str, amount: i64) -> Result<i64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO account_balances (account_id, total, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (account_id) DO UPDATE SET
                total = account_balances.total + EXCLUDED.total,
                updated_at = NOW()
            RETURNING total
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_one(executor)
        .await
        .context("Failed to increment account balance")?;

        Ok(total)
    }

    /// Apply a debit only if the current total covers it (returns new total, None if short)
    ///
    /// The guard and the write are a single statement, so concurrent debits
    /// serialize on the row lock and each one sees the committed total.
    pub async fn debit_guarded<'e, E>(
        executor: E,
        account_id: &str,
        amount: i64,
    ) -> Result<Option<i64>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE account_balances
            SET total = total - $2, updated_at = NOW()
            WHERE account_id = $1 AND total >= $2
            RETURNING total
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .fetch_optional(executor)
        .await
        .context("Failed to debit account balance")?;

        Ok(total)
    }
}

pub struct LedgerRepository;

impl LedgerRepository {
    /// Project the entry onto the balance and insert it (None if a debit is not covered)
    pub async fn append(
        conn: &mut PgConnection,
        entry: &NewLedgerEntry,
    ) -> Result<Option<LedgerEntry>> {
        let balance_after = if entry.is_debit() {
            match BalanceRepository::debit_guarded(&mut *conn, &entry.account_id, -entry.amount)
                .await?
            {
                Some(total) => total,
                None => return Ok(None),
            }
        } else {
            BalanceRepository::increment(&mut *conn, &entry.account_id, entry.amount).await?
        };

        let row = Self::insert(&mut *conn, entry, balance_after).await?;
        Ok(Some(row))
    }

    /// Insert a ledger row, skipping it when a unique index already covers it
    ///
    /// Used for the one-per-account initial grant and one-per-order purchase
    /// credits. Returns Ok(None) on conflict; the caller must roll back the
    /// balance projection it made in the same transaction.
    pub async fn insert_unique<'e, E>(
        executor: E,
        entry: &NewLedgerEntry,
        balance_after: i64,
    ) -> Result<Option<LedgerEntry>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO credit_ledger (
                account_id, amount, event_kind, story_ref,
                purchase_ref, description, balance_after, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&entry.account_id)
        .bind(entry.amount)
        .bind(entry.event_kind)
        .bind(&entry.refs.story_ref)
        .bind(&entry.refs.purchase_ref)
        .bind(&entry.refs.description)
        .bind(balance_after)
        .fetch_optional(executor)
        .await
        .context("Failed to insert unique ledger entry")?;

        Ok(row)
    }

    async fn insert<'e, E>(
        executor: E,
        entry: &NewLedgerEntry,
        balance_after: i64,
    ) -> Result<LedgerEntry>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, LedgerEntry>(
            r#"
            INSERT INTO credit_ledger (
                account_id, amount, event_kind, story_ref,
                purchase_ref, description, balance_after, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(&entry.account_id)
        .bind(entry.amount)
        .bind(entry.event_kind)
        .bind(&entry.refs.story_ref)
        .bind(&entry.refs.purchase_ref)
        .bind(&entry.refs.description)
        .bind(balance_after)
        .fetch_one(executor)
        .await
        .context("Failed to insert ledger entry")?;

        Ok(row)
    }

    /// List ledger entries for an account, newest first
    pub async fn list(
        pool: &DbPool,
        account_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<LedgerEntry>> {
        let query = query.normalized();
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT * FROM credit_ledger
            WHERE account_id = $1
              AND ($2::credit_event_kind IS NULL OR event_kind = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(account_id)
        .bind(query.event_kind)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(pool)
        .await
        .context("Failed to list ledger entries")?;

        Ok(entries)
    }

    /// Sum of all ledger amounts for an account
    pub async fn sum_for_account(pool: &DbPool, account_id: &str) -> Result<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT FROM credit_ledger
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_one(pool)
        .await
        .context("Failed to sum ledger entries")?;

        Ok(sum)
    }
}
