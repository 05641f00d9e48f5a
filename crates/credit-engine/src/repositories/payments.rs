//! Payment order, payment event and saved payment method repositories

use anyhow::{Context, Result};
use shared::DbPool;
use sqlx::types::Json;
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::{
    event_types, NewPaymentEvent, NewPaymentOrder, OrderStatus, PaymentEvent,
    PaymentMethodDetails, PaymentOrder, SavedPaymentMethod,
};

pub struct PaymentOrderRepository;

impl PaymentOrderRepository {
    /// Persist a pending order after the provider accepted it
    pub async fn insert<'e, E>(executor: E, order: &NewPaymentOrder) -> Result<PaymentOrder>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, PaymentOrder>(
            r#"
            INSERT INTO payment_orders (
                id, account_id, amount_minor, currency, status,
                provider_order_id, provider_token, credits, bundle,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(order.id)
        .bind(&order.account_id)
        .bind(order.amount_minor)
        .bind(&order.currency)
        .bind(&order.provider_order_id)
        .bind(&order.provider_token)
        .bind(order.credits)
        .bind(Json(&order.bundle))
        .fetch_one(executor)
        .await
        .context("Failed to create payment order")?;

        Ok(row)
    }

    pub async fn find_by_id(pool: &DbPool, id: Uuid) -> Result<Option<PaymentOrder>> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT * FROM payment_orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to find payment order")?;

        Ok(order)
    }

    /// Find an order by the provider's order reference
    pub async fn find_by_provider_ref(
        pool: &DbPool,
        provider_order_id: &str,
    ) -> Result<Option<PaymentOrder>> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT * FROM payment_orders
            WHERE provider_order_id = $1
            "#,
        )
        .bind(provider_order_id)
        .fetch_optional(pool)
        .await
        .context("Failed to find payment order by provider reference")?;

        Ok(order)
    }

    /// List an account's orders, newest first
    pub async fn list_for_account(
        pool: &DbPool,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<PaymentOrder>> {
        let orders = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT * FROM payment_orders
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list payment orders")?;

        Ok(orders)
    }

    /// Move an order to `to` only if its current status is one of `from`
    ///
    /// Returns None when the guard did not match (the order moved on or
    /// does not exist).
    pub async fn transition<'e, E>(
        executor: E,
        id: Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
    ) -> Result<Option<PaymentOrder>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let from: Vec<&str> = from.iter().map(OrderStatus::as_str).collect();
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = $2,
                updated_at = NOW(),
                completed_at = CASE WHEN $2 = 'completed'::payment_order_status
                                    THEN NOW() ELSE completed_at END
            WHERE id = $1 AND status::TEXT = ANY($3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(from)
        .fetch_optional(executor)
        .await
        .context("Failed to transition payment order")?;

        Ok(order)
    }
}

pub struct PaymentEventRepository;

impl PaymentEventRepository {
    /// Append an audit event for an order
    pub async fn insert<'e, E>(
        executor: E,
        order_id: Uuid,
        event: &NewPaymentEvent,
    ) -> Result<PaymentEvent>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let event = sqlx::query_as::<_, PaymentEvent>(
            r#"
            INSERT INTO payment_events (order_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(event.event_type)
        .bind(event.payload.as_ref())
        .fetch_one(executor)
        .await
        .context("Failed to record payment event")?;

        Ok(event)
    }

    /// Append a webhook delivery, resolving the order from the provider reference
    ///
    /// The row is written even when no order matches; `order_id` is then NULL.
    pub async fn insert_webhook<'e, E>(
        executor: E,
        provider_order_id: &str,
        payload: &serde_json::Value,
    ) -> Result<PaymentEvent>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let event = sqlx::query_as::<_, PaymentEvent>(
            r#"
            INSERT INTO payment_events (
                order_id, provider_order_id, event_type, payload, created_at
            )
            VALUES (
                (SELECT id FROM payment_orders WHERE provider_order_id = $1),
                $1, $2, $3, NOW()
            )
            RETURNING *
            "#,
        )
        .bind(provider_order_id)
        .bind(event_types::WEBHOOK_RECEIVED)
        .bind(payload)
        .fetch_one(executor)
        .await
        .context("Failed to record webhook delivery")?;

        Ok(event)
    }

    /// List an order's events in insertion order
    pub async fn list_for_order(pool: &DbPool, order_id: Uuid) -> Result<Vec<PaymentEvent>> {
        let events = sqlx::query_as::<_, PaymentEvent>(
            r#"
            SELECT * FROM payment_events
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(pool)
        .await
        .context("Failed to list payment events")?;

        Ok(events)
    }
}

pub struct PaymentMethodRepository;

impl PaymentMethodRepository {
    /// Create or refresh a saved payment method for an account
    pub async fn upsert<'e, E>(
        executor: E,
        account_id: &str,
        method: &PaymentMethodDetails,
    ) -> Result<SavedPaymentMethod>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, SavedPaymentMethod>(
            r#"
            INSERT INTO saved_payment_methods (
                account_id, provider_method_id, method_type,
                card_brand, card_last_four, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (account_id, provider_method_id) DO UPDATE SET
                method_type = EXCLUDED.method_type,
                card_brand = EXCLUDED.card_brand,
                card_last_four = EXCLUDED.card_last_four,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(&method.id)
        .bind(&method.method_type)
        .bind(&method.card_brand)
        .bind(&method.card_last_four)
        .fetch_one(executor)
        .await
        .context("Failed to save payment method")?;

        Ok(row)
    }
}
