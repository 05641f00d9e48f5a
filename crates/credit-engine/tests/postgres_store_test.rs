// Integration tests for the Postgres store
// Ledger rows are immutable, so every test works on fresh account ids

use std::sync::Arc;

use anyhow::Result;
use credit_engine::models::{
    event_types, BundleLine, EditKind, EventKind, LedgerRefs, NewEditRecord, NewLedgerEntry,
    NewPaymentEvent, NewPaymentOrder, NewPromotionCode, OrderStatus, RedemptionOutcome,
};
use credit_engine::store::{
    EditLogStore, LedgerStore, PaymentStore, PgStore, PricingStore, PromotionStore,
};
use credit_engine::CreditError;
use sqlx::PgPool;
use uuid::Uuid;

async fn setup_store() -> Result<PgStore> {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");
    let pool = PgPool::connect(&database_url).await?;
    shared::db::run_migrations(&pool).await?;
    Ok(PgStore::new(pool))
}

fn account() -> String {
    format!("test_{}", Uuid::new_v4())
}

fn credit(account_id: &str, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry::new(account_id, amount, EventKind::Voucher, LedgerRefs::default())
}

fn created() -> NewPaymentEvent {
    NewPaymentEvent::new(event_types::ORDER_CREATED, None)
}

fn order_for(account_id: &str) -> NewPaymentOrder {
    let id = Uuid::new_v4();
    NewPaymentOrder {
        id,
        account_id: account_id.to_string(),
        amount_minor: 900,
        currency: "EUR".to_string(),
        provider_order_id: format!("test_ord_{}", id),
        provider_token: format!("test_tok_{}", id),
        credits: 100,
        bundle: vec![BundleLine {
            package_id: "starter".to_string(),
            quantity: 1,
            credits: 100,
            price_minor: 900,
        }],
    }
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_append_projects_balance() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();

    let first = store.append_entry(credit(&account_id, 10)).await?;
    assert_eq!(first.balance_after, 10);

    let debit = store
        .append_entry(NewLedgerEntry::new(
            &account_id,
            -4,
            EventKind::TextEdit,
            LedgerRefs::story("story-1"),
        ))
        .await?;
    assert_eq!(debit.balance_after, 6);

    let balance = store.balance(&account_id).await?.map(|b| b.total);
    assert_eq!(balance, Some(6));
    assert_eq!(store.ledger_sum(&account_id).await?, 6);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_balance_row_rejects_negative_total() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();
    store.append_entry(credit(&account_id, 3)).await?;

    let forced = sqlx::query("UPDATE account_balances SET total = -1 WHERE account_id = $1")
        .bind(&account_id)
        .execute(store.pool())
        .await;

    assert!(forced.is_err());
    assert_eq!(store.balance(&account_id).await?.map(|b| b.total), Some(3));
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_uncovered_debit_is_rejected() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();
    store.append_entry(credit(&account_id, 3)).await?;

    let err = store
        .append_entry(NewLedgerEntry::new(
            &account_id,
            -5,
            EventKind::StoryGeneration,
            LedgerRefs::default(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CreditError::InsufficientCredits {
            required: 5,
            available: 3
        }
    ));
    assert_eq!(store.ledger_sum(&account_id).await?, 3);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_concurrent_debits_serialize() -> Result<()> {
    let store = Arc::new(setup_store().await?);
    let account_id = account();
    store.append_entry(credit(&account_id, 5)).await?;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let store = store.clone();
        let account_id = account_id.clone();
        handles.push(tokio::spawn(async move {
            store
                .append_entry(NewLedgerEntry::new(
                    &account_id,
                    -1,
                    EventKind::AudioGeneration,
                    LedgerRefs::default(),
                ))
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await?.is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(store.balance(&account_id).await?.map(|b| b.total), Some(0));
    assert_eq!(store.ledger_sum(&account_id).await?, 0);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_initial_grant_is_unique() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();
    let grant = || NewLedgerEntry::new(&account_id, 20, EventKind::InitialGrant, LedgerRefs::default());

    assert!(store.append_unique(grant()).await?.is_some());
    assert!(store.append_unique(grant()).await?.is_none());
    assert_eq!(store.ledger_sum(&account_id).await?, 20);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_order_completes_once() -> Result<()> {
    let store = Arc::new(setup_store().await?);
    let account_id = account();
    let order = store.insert_order(order_for(&account_id), created()).await?;
    assert_eq!(order.status, OrderStatus::Pending);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let store = store.clone();
        let order_id = order.id;
        handles.push(tokio::spawn(async move { store.complete_order(order_id).await }));
    }

    let mut completions = 0;
    for handle in handles {
        if handle.await??.is_some() {
            completions += 1;
        }
    }

    assert_eq!(completions, 1);
    assert_eq!(store.ledger_sum(&account_id).await?, 100);
    let stored = store.find_order(order.id).await?.expect("order exists");
    assert_eq!(stored.status, OrderStatus::Completed);
    assert!(stored.completed_at.is_some());

    let completions = store
        .list_events(order.id)
        .await?
        .into_iter()
        .filter(|e| e.event_type == event_types::ORDER_COMPLETED)
        .count();
    assert_eq!(completions, 1);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_cancelled_order_cannot_complete() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();
    let order = store.insert_order(order_for(&account_id), created()).await?;

    let cancel = || NewPaymentEvent::new(event_types::ORDER_CANCELLED, None);
    let cancelled = store
        .transition_status(
            order.id,
            OrderStatus::sources_for(OrderStatus::Cancelled),
            OrderStatus::Cancelled,
            cancel(),
        )
        .await?;
    assert!(cancelled.is_some());
    assert!(store.complete_order(order.id).await?.is_none());
    assert_eq!(store.ledger_sum(&account_id).await?, 0);

    // A guard miss writes no event
    let again = store
        .transition_status(
            order.id,
            OrderStatus::sources_for(OrderStatus::Cancelled),
            OrderStatus::Cancelled,
            cancel(),
        )
        .await?;
    assert!(again.is_none());

    let types: Vec<String> = store
        .list_events(order.id)
        .await?
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec![event_types::ORDER_CREATED, event_types::ORDER_CANCELLED]
    );
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_webhook_deliveries_are_always_recorded() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();
    let order = store.insert_order(order_for(&account_id), created()).await?;

    let matched = store
        .record_webhook(&order.provider_order_id, serde_json::json!({ "event": "ORDER_COMPLETED" }))
        .await?;
    assert_eq!(matched.order_id, Some(order.id));

    let unknown = format!("test_missing_{}", Uuid::new_v4());
    let unmatched = store
        .record_webhook(&unknown, serde_json::json!({ "event": "ORDER_COMPLETED" }))
        .await?;
    assert_eq!(unmatched.order_id, None);
    assert_eq!(unmatched.provider_order_id.as_deref(), Some(unknown.as_str()));
    assert_eq!(unmatched.event_type, event_types::WEBHOOK_RECEIVED);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_redemption_caps_under_contention() -> Result<()> {
    let store = Arc::new(setup_store().await?);
    let code = format!("TEST_{}", &Uuid::new_v4().simple().to_string()[..12]).to_uppercase();
    let promotion = store
        .insert_promotion(NewPromotionCode {
            code,
            credits: 5,
            valid_from: None,
            valid_until: None,
            max_redemptions_per_account: None,
            max_redemptions_total: Some(2),
        })
        .await?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let promotion = promotion.clone();
        handles.push(tokio::spawn(async move {
            store.redeem(&promotion, &account()).await
        }));
    }

    let mut redeemed = 0;
    for handle in handles {
        match handle.await?? {
            RedemptionOutcome::Redeemed { entry, .. } => {
                assert_eq!(entry.amount, 5);
                redeemed += 1;
            }
            RedemptionOutcome::GlobalCapReached => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(redeemed, 2);
    assert_eq!(store.count_redemptions(promotion.id, None).await?, 2);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_edit_log_counts_by_kind() -> Result<()> {
    let store = setup_store().await?;
    let account_id = account();

    for kind in [EditKind::Text, EditKind::Text, EditKind::Image] {
        store
            .record_edit(NewEditRecord {
                account_id: account_id.clone(),
                kind,
                story_ref: None,
                credits_charged: 0,
                ledger_entry_id: None,
                metadata: None,
            })
            .await?;
    }

    assert_eq!(store.count_edits(&account_id, EditKind::Text).await?, 2);
    assert_eq!(store.count_edits(&account_id, EditKind::Image).await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_seeded_pricing_catalog() -> Result<()> {
    let store = setup_store().await?;
    let text = store.find_price("text_edit").await?.expect("seeded");
    assert!(text.credits > 0);
    assert!(store.list_prices(true).await?.len() >= 6);
    Ok(())
}
