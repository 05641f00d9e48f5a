// End-to-end scenarios against the in-memory store
// These exercise the public engine API the way the HTTP layer drives it

use std::sync::Arc;

use async_trait::async_trait;
use credit_engine::models::{
    BundleRequest, EditKind, EventKind, LedgerRefs, OrderStatus, ProviderEvent, WebhookOutcome,
    WebhookPayload,
};
use credit_engine::services::{PromotionSpec, ProviderOrder, ProviderOrderRequest};
use credit_engine::{
    CreditEngine, CreditError, CreditResult, EngineConfig, MemoryStore, PaymentProvider,
};
use mockall::mock;
use serde_json::json;

mock! {
    pub Provider {}

    #[async_trait]
    impl PaymentProvider for Provider {
        async fn create_order(&self, request: &ProviderOrderRequest) -> CreditResult<ProviderOrder>;
    }
}

fn provider_with_id(provider_order_id: &'static str) -> MockProvider {
    let mut provider = MockProvider::new();
    provider.expect_create_order().returning(move |_| {
        Ok(ProviderOrder {
            id: provider_order_id.to_string(),
            token: format!("tok_{}", provider_order_id),
            state: Some("pending".to_string()),
        })
    });
    provider
}

fn engine_with(provider: MockProvider) -> (Arc<MemoryStore>, CreditEngine) {
    let store = Arc::new(MemoryStore::with_default_prices());
    let config = EngineConfig {
        webhook_secret: Some("whsec_scenarios".to_string()),
        ..EngineConfig::default()
    };
    let engine = CreditEngine::new(store.clone(), Arc::new(provider), &config);
    (store, engine)
}

fn completion(provider_order_id: &str) -> WebhookPayload {
    WebhookPayload {
        event: ProviderEvent::OrderCompleted,
        order_id: provider_order_id.to_string(),
        timestamp: None,
        state: Some("completed".to_string()),
        amount: Some(900),
        payment_method: None,
    }
}

#[tokio::test]
async fn test_promotion_then_text_edits() {
    let (_, engine) = engine_with(MockProvider::new());
    engine
        .promotions
        .create_promotion(PromotionSpec {
            code: "WELCOME10".to_string(),
            credits: 10,
            valid_from: None,
            valid_until: None,
            max_redemptions_per_account: Some(1),
            max_redemptions_total: Some(100),
        })
        .await
        .unwrap();

    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 0);
    let redeemed = engine.promotions.redeem("acct", "WELCOME10").await.unwrap();
    assert_eq!(redeemed.new_balance, 10);

    for edit in 1..=6 {
        let receipt = engine
            .edits
            .record_successful_edit("acct", EditKind::Text, Some("story-1".into()), None)
            .await
            .unwrap();
        let expected = if edit == 6 { 1 } else { 0 };
        assert_eq!(receipt.credits_charged, expected, "edit {}", edit);
    }
    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 9);

    assert!(matches!(
        engine.promotions.redeem("acct", "WELCOME10").await,
        Err(CreditError::InvalidPromotionCode)
    ));
    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 9);
    assert!(engine.ledger.verify_balance("acct").await.unwrap().consistent);
}

#[tokio::test]
async fn test_order_completion_delivered_twice() {
    let (_, engine) = engine_with(provider_with_id("ord_retry"));
    let created = engine
        .payments
        .create_order(
            "acct",
            &[BundleRequest {
                package_id: "starter".to_string(),
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    assert_eq!(created.order.credits, 100);
    assert_eq!(created.order.amount_minor, 900);

    let payload = completion("ord_retry");
    let first = engine
        .payments
        .process_webhook(&payload, json!({"attempt": 1}))
        .await
        .unwrap();
    let second = engine
        .payments
        .process_webhook(&payload, json!({"attempt": 2}))
        .await
        .unwrap();

    assert_eq!(first.label(), "processed");
    assert_eq!(second.label(), "duplicate");
    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 100);

    let purchases = engine
        .ledger
        .get_history(
            "acct",
            &credit_engine::models::HistoryQuery {
                limit: 10,
                offset: 0,
                event_kind: Some(EventKind::Purchase),
            },
        )
        .await
        .unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(
        purchases[0].purchase_ref.as_deref(),
        Some(created.order.id.to_string().as_str())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_completion_credits_once() {
    let (_, engine) = engine_with(provider_with_id("ord_parallel"));
    let created = engine
        .payments
        .create_order(
            "acct",
            &[BundleRequest {
                package_id: "plus".to_string(),
                quantity: 2,
            }],
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for attempt in 0..8 {
        let payments = engine.payments.clone();
        handles.push(tokio::spawn(async move {
            payments
                .process_webhook(&completion("ord_parallel"), json!({ "attempt": attempt }))
                .await
        }));
    }

    let mut processed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            WebhookOutcome::Processed { status, .. } => {
                assert_eq!(status, OrderStatus::Completed);
                processed += 1;
            }
            WebhookOutcome::AlreadyCompleted { order_id } => {
                assert_eq!(order_id, created.order.id)
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    assert_eq!(processed, 1);
    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_debits_never_overdraw() {
    let (_, engine) = engine_with(MockProvider::new());
    engine
        .ledger
        .grant_credits("acct", 10, EventKind::Voucher, LedgerRefs::default())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..25 {
        let ledger = engine.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .deduct_credits("acct", 1, EventKind::StoryGeneration, LedgerRefs::default())
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(entry) => {
                assert!(entry.balance_after >= 0);
                succeeded += 1;
            }
            Err(CreditError::InsufficientCredits { required, available }) => {
                assert_eq!(required, 1);
                assert_eq!(available, 0);
            }
            Err(e) => panic!("unexpected error {}", e),
        }
    }

    assert_eq!(succeeded, 10);
    let check = engine.ledger.verify_balance("acct").await.unwrap();
    assert_eq!(check.projected, 0);
    assert!(check.consistent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_redemptions_respect_global_cap() {
    let (store, engine) = engine_with(MockProvider::new());
    engine
        .promotions
        .create_promotion(PromotionSpec {
            code: "FLASH".to_string(),
            credits: 7,
            valid_from: None,
            valid_until: None,
            max_redemptions_per_account: None,
            max_redemptions_total: Some(3),
        })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..12 {
        let promotions = engine.promotions.clone();
        handles.push(tokio::spawn(async move {
            promotions.redeem(&format!("acct-{}", i), "FLASH").await
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            granted += 1;
        }
    }

    assert_eq!(granted, 3);
    assert_eq!(store.orphaned_redemptions().await, 0);
}

#[tokio::test]
async fn test_signed_webhook_round_trip() {
    let (_, engine) = engine_with(provider_with_id("ord_signed"));
    engine
        .payments
        .create_order(
            "acct",
            &[BundleRequest {
                package_id: "starter".to_string(),
                quantity: 1,
            }],
        )
        .await
        .unwrap();

    let body = br#"{"event":"ORDER_COMPLETED","order_id":"ord_signed","state":"COMPLETED"}"#;
    let ts = chrono::Utc::now().timestamp_millis().to_string();
    let signature = credit_engine::services::signature::sign("whsec_scenarios", &ts, body).unwrap();

    let outcome = engine
        .payments
        .ingest_webhook(body, Some(&signature), Some(&ts))
        .await
        .unwrap();
    assert_eq!(outcome.label(), "processed");

    let stale = (chrono::Utc::now().timestamp_millis() - 6 * 60 * 1000).to_string();
    let stale_signature =
        credit_engine::services::signature::sign("whsec_scenarios", &stale, body).unwrap();
    assert!(matches!(
        engine
            .payments
            .ingest_webhook(body, Some(&stale_signature), Some(&stale))
            .await,
        Err(CreditError::InvalidSignature)
    ));
    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 100);
}

#[tokio::test]
async fn test_provider_failure_leaves_no_order() {
    let mut provider = MockProvider::new();
    provider
        .expect_create_order()
        .times(1)
        .returning(|_| Err(CreditError::provider("connection reset")));
    let (store, engine) = engine_with(provider);

    assert!(matches!(
        engine
            .payments
            .create_order(
                "acct",
                &[BundleRequest {
                    package_id: "pro".to_string(),
                    quantity: 1,
                }],
            )
            .await,
        Err(CreditError::Provider(_))
    ));
    assert!(credit_engine::store::PaymentStore::list_orders(store.as_ref(), "acct", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_initial_grant_and_refund() {
    let store = Arc::new(MemoryStore::with_default_prices());
    let config = EngineConfig {
        initial_grant_credits: 25,
        ..EngineConfig::default()
    };
    let engine = CreditEngine::new(store, Arc::new(MockProvider::new()), &config);

    assert!(engine.ledger.grant_initial_credits("acct").await.unwrap().is_some());
    assert!(engine.ledger.grant_initial_credits("acct").await.unwrap().is_none());

    engine
        .ledger
        .deduct_credits(
            "acct",
            5,
            EventKind::StoryGeneration,
            LedgerRefs::story("story-9"),
        )
        .await
        .unwrap();
    engine
        .ledger
        .refund("acct", 5, Some("story-9".to_string()), None)
        .await
        .unwrap();

    assert_eq!(engine.ledger.get_balance("acct").await.unwrap(), 25);
    assert!(engine.ledger.verify_balance("acct").await.unwrap().consistent);
}
