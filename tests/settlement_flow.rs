//! End-to-end lifecycle tests against the public crate API, using the
//! offline sandbox gateway.

use disburse::application::credentials::CredentialManager;
use disburse::application::dispatcher::SideEffectDispatcher;
use disburse::application::engine::PayoutEngine;
use disburse::domain::credential::{Provider, TokenGrant};
use disburse::domain::payment_request::RequestStatus;
use disburse::domain::{Actor, Role};
use disburse::error::PayoutError;
use disburse::infrastructure::crypto::TokenCipher;
use disburse::infrastructure::in_memory::{
    InMemoryCredentialStore, InMemoryLedger, InMemoryPaymentRequestStore, InMemoryTransferStore,
};
use disburse::infrastructure::sandbox::{LogNotifier, SandboxGateway};
use disburse::interfaces::api::CreatePaymentBody;
use rust_decimal_macros::dec;
use std::sync::Arc;

const OPERATOR: Actor = Actor {
    user_id: 1,
    role: Role::Manager,
};

async fn engine() -> (PayoutEngine, Arc<InMemoryLedger>) {
    let gateway = Arc::new(SandboxGateway::new());
    let credentials = Arc::new(CredentialManager::new(
        Arc::new(InMemoryCredentialStore::new()),
        TokenCipher::ephemeral(),
        vec![gateway.clone()],
    ));
    credentials
        .store_grant(
            OPERATOR.user_id,
            Provider::OpenBanking,
            TokenGrant {
                access_token: "seeded".into(),
                refresh_token: "seeded-refresh".into(),
                token_type: "Bearer".into(),
                scope: "login transfer inquiry".into(),
                expires_in: 3600,
                subject_id: None,
            },
        )
        .await
        .unwrap();
    let ledger = Arc::new(InMemoryLedger::new());
    let dispatcher =
        SideEffectDispatcher::new(Arc::new(LogNotifier::default()), ledger.clone());
    let engine = PayoutEngine::new(
        Arc::new(InMemoryPaymentRequestStore::new()),
        Arc::new(InMemoryTransferStore::new()),
        credentials,
        gateway,
        dispatcher,
    );
    (engine, ledger)
}

fn body(json: &str) -> CreatePaymentBody {
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn test_full_lifecycle_from_wire_payload_to_settlement() {
    let (engine, ledger) = engine().await;
    let input = body(
        r#"{
            "projectId": 12,
            "materialAmount": 1000000,
            "laborAmount": 500000,
            "applyTaxDeduction": true,
            "accountHolder": "김목수",
            "bank": "KB국민은행",
            "accountNumber": "123-456-789012"
        }"#,
    )
    .into_new_request(3)
    .unwrap();

    let request = engine.create(&Actor::new(3, Role::Staff), input).await.unwrap();
    assert_eq!(request.material_amount.value(), dec!(967_000));
    assert_eq!(request.labor_amount.value(), dec!(483_500));
    assert_eq!(request.destination.bank_code, "004");

    engine.approve(&OPERATOR, request.id).await.unwrap();
    let outcome = engine
        .transfer_and_settle(&OPERATOR, request.id, None)
        .await
        .unwrap();
    assert_eq!(outcome.status, RequestStatus::Completed);
    assert_eq!(outcome.transaction_id, "SBX00000001");

    let settled = engine.get(request.id).await.unwrap();
    assert_eq!(settled.total_amount().value(), dec!(1_450_500));
    assert!(settled.notes.iter().any(|n| n.contains("SBX00000001")));

    // Dispatched effects run on spawned tasks; give them a beat to land.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let entries = ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount.value(), dec!(1_450_500));
}

#[tokio::test]
async fn test_repeated_transfer_is_idempotent_across_public_api() {
    let (engine, _ledger) = engine().await;
    let input = body(
        r#"{
            "projectId": 1,
            "materialAmount": 1100000,
            "includesVAT": true,
            "accountHolder": "홍길동",
            "bank": "088",
            "accountNumber": "110222333444"
        }"#,
    )
    .into_new_request(1)
    .unwrap();
    let request = engine.create(&OPERATOR, input).await.unwrap();
    let breakdown = request.vat_breakdown().unwrap();
    assert_eq!(breakdown.supply, dec!(1_000_000));
    assert_eq!(breakdown.vat, dec!(100_000));

    engine.approve(&OPERATOR, request.id).await.unwrap();
    let first = engine
        .transfer_and_settle(&OPERATOR, request.id, None)
        .await
        .unwrap();
    let second = engine
        .transfer_and_settle(&OPERATOR, request.id, None)
        .await
        .unwrap();
    assert_eq!(first.transaction_id, second.transaction_id);
    assert!(second.reused);
}

#[tokio::test]
async fn test_transfer_without_bank_connection_asks_for_authorization() {
    let (engine, _ledger) = engine().await;
    let unconnected = Actor::new(42, Role::Manager);
    let input = body(
        r#"{
            "projectId": 5,
            "materialAmount": 300000,
            "applyTaxDeduction": true,
            "accountHolder": "이배관",
            "bank": "신한은행",
            "accountNumber": "555666777888"
        }"#,
    )
    .into_new_request(5)
    .unwrap();
    let request = engine.create(&unconnected, input).await.unwrap();
    engine.approve(&unconnected, request.id).await.unwrap();

    let err = engine
        .transfer_and_settle(&unconnected, request.id, None)
        .await
        .unwrap_err();
    match err {
        PayoutError::NeedsAuthorization { user_id, provider } => {
            assert_eq!(user_id, 42);
            assert_eq!(provider, Provider::OpenBanking);
        }
        other => panic!("expected NeedsAuthorization, got {other:?}"),
    }
    // The request stays approved and transferable once connected.
    assert_eq!(
        engine.get(request.id).await.unwrap().status,
        RequestStatus::Approved
    );
}

#[tokio::test]
async fn test_stats_reflect_mixed_outcomes() {
    let (engine, _ledger) = engine().await;
    let make = |account: &str| {
        body(&format!(
            r#"{{
                "projectId": 2,
                "materialAmount": 200000,
                "applyTaxDeduction": true,
                "accountHolder": "박전기",
                "bank": "004",
                "accountNumber": "{account}"
            }}"#
        ))
        .into_new_request(2)
        .unwrap()
    };

    let paid = engine.create(&OPERATOR, make("111111111111")).await.unwrap();
    let refused = engine.create(&OPERATOR, make("222222222222")).await.unwrap();
    let waiting = engine.create(&OPERATOR, make("333333333333")).await.unwrap();

    engine.approve(&OPERATOR, paid.id).await.unwrap();
    engine
        .transfer_and_settle(&OPERATOR, paid.id, None)
        .await
        .unwrap();
    engine
        .reject(&OPERATOR, refused.id, "duplicate invoice")
        .await
        .unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.completed_count, 1);
    assert_eq!(stats.rejected_count, 1);
    assert_eq!(stats.pending_count, 1);
    assert_eq!(stats.pending_amount, waiting.total_amount().value());
    assert_eq!(stats.completed_amount, dec!(193_400));
}
