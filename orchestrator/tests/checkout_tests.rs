//! End-to-end orchestrator scenarios against mock collaborators.
//!
//! The in-memory repository enforces the same transition rules as the
//! `PostgreSQL` store, so these tests exercise the real state machine:
//! fan-out authorize, all-or-nothing capture, compensation, proportional
//! refunds, and the webhook race.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use splitpay_core::Clock;
use splitpay_core::Repository;
use splitpay_core::error::SplitPayError;
use splitpay_core::repository::NewStore;
use splitpay_core::types::{
    CheckoutSession, CustomerMeta, PaymentStatus, RefundInitiator, RefundReason, RefundStatus,
    SessionId, StoreSettings, TransactionStatus,
};
use splitpay_orchestrator::{
    CardSubmission, CheckoutOrchestrator, Reconciler, repair_unsubmitted_orders,
};
use splitpay_sessions::{InMemorySessionStore, SessionStore};
use splitpay_shopify::{CheckoutInfo, PlatformEvent};
use splitpay_stripe::{PaymentProvider, ProviderEvent};
use splitpay_testing::{
    ConfirmScript, FixedClock, InMemoryRepository, MockPaymentProvider, MockPlatform, test_clock,
};
use std::sync::Arc;

const SHOP: &str = "demo-store.myshopify.com";

type TestOrchestrator = CheckoutOrchestrator<
    InMemoryRepository,
    MockPaymentProvider,
    MockPlatform,
    InMemorySessionStore<Arc<FixedClock>>,
>;

struct Harness {
    repo: Arc<InMemoryRepository>,
    provider: Arc<MockPaymentProvider>,
    platform: Arc<MockPlatform>,
    sessions: Arc<InMemorySessionStore<Arc<FixedClock>>>,
    clock: Arc<FixedClock>,
    orchestrator: TestOrchestrator,
}

impl Harness {
    async fn new(total_cents: i64, settings: StoreSettings) -> (Self, String) {
        let repo = Arc::new(InMemoryRepository::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let platform = Arc::new(MockPlatform::new());
        let clock = Arc::new(test_clock());
        let sessions = Arc::new(InMemorySessionStore::with_clock(Arc::clone(&clock)));

        repo.create_store(NewStore {
            shop_domain: SHOP.to_string(),
            access_token: "shpat_test".to_string(),
            settings,
        })
        .await
        .expect("store install");

        let checkout_token = "a1b2c3d4e5f6a1b2c3d4e5f6a1b2c3d4".to_string();
        platform.set_checkout(
            &checkout_token,
            CheckoutInfo {
                total_amount_cents: total_cents,
                currency: "USD".to_string(),
                customer_email: Some("buyer@example.com".to_string()),
            },
        );

        let dyn_clock: Arc<dyn splitpay_core::Clock> = Arc::clone(&clock) as Arc<dyn splitpay_core::Clock>;
        let orchestrator = CheckoutOrchestrator::new(
            Arc::clone(&repo),
            Arc::clone(&provider),
            Arc::clone(&platform),
            Arc::clone(&sessions),
            dyn_clock,
        );

        (
            Self {
                repo,
                provider,
                platform,
                sessions,
                clock,
                orchestrator,
            },
            checkout_token,
        )
    }

    /// init + add one card per amount, returning the session and intents.
    async fn session_with_cards(
        &self,
        checkout_token: &str,
        amounts: &[i64],
    ) -> (SessionId, Vec<String>) {
        let init = self
            .orchestrator
            .init(SHOP, checkout_token, CustomerMeta::default())
            .await
            .expect("init");
        let mut intents = Vec::new();
        for amount in amounts {
            let added = self
                .orchestrator
                .add_card(&init.session_id, *amount)
                .await
                .expect("add_card");
            intents.push(added.provider_intent_id);
        }
        (init.session_id, intents)
    }
}

fn submissions(intents: &[String]) -> Vec<CardSubmission> {
    intents
        .iter()
        .map(|intent| CardSubmission {
            provider_intent_id: intent.clone(),
            provider_method_id: format!("pm_{}", intent.trim_start_matches("pi_")),
        })
        .collect()
}

// ── S1: happy path, two cards on a $150 total ──────────────────

#[tokio::test]
async fn test_two_card_checkout_captures_all_and_creates_order() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;

    let outcome = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");
    assert!(!outcome.order_id.is_empty());

    let txn = h
        .repo
        .completed_transaction(
            h.repo.store_by_domain(SHOP).await.unwrap().unwrap().id,
            &token,
        )
        .await
        .unwrap()
        .expect("completed transaction");
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.order_id, Some(outcome.order_id.clone()));

    let payments = h.repo.payments_for_transaction(txn.id).await.unwrap();
    assert_eq!(payments.len(), 2);
    let mut amounts: Vec<i64> = payments.iter().map(|p| p.amount_cents).collect();
    amounts.sort_unstable();
    assert_eq!(amounts, vec![5000, 10000]);
    for payment in &payments {
        assert_eq!(payment.status, PaymentStatus::Captured);
        assert!(payment.captured_at.is_some());
    }

    // Session is gone.
    assert_eq!(
        h.sessions.get_session(&session_id).await.unwrap_err(),
        SplitPayError::SessionNotFound
    );

    // One order submitted with the split count.
    let orders = h.platform.orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payment_count, 2);
    assert_eq!(orders[0].total_amount_cents, 15000);
}

// ── S2: second card declines on a three-way split ──────────────

#[tokio::test]
async fn test_decline_voids_authorized_siblings_and_fails_transaction() {
    let (h, token) = Harness::new(12000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[4000, 4000, 4000]).await;

    h.provider.script_confirm(
        &intents[1],
        ConfirmScript::Decline {
            code: "card_declined",
            message: "Your card was declined.",
        },
    );

    let err = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect_err("complete must fail");
    let SplitPayError::CardDeclined(card) = err else {
        panic!("expected decline, got {err:?}");
    };
    assert_eq!(card.provider_intent_id, intents[1]);
    assert!(card.message.contains("declined"));

    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;
    let txn = h.repo.transaction(txn).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(txn.failure_reason.unwrap().contains("Your card was declined."));
    assert!(txn.order_id.is_none());

    // Cards 1 and 3 voided, card 2 failed.
    for (intent, expected) in [
        (&intents[0], PaymentStatus::Voided),
        (&intents[1], PaymentStatus::Failed),
        (&intents[2], PaymentStatus::Voided),
    ] {
        let payment = h.repo.payment_by_intent(intent).await.unwrap().unwrap();
        assert_eq!(payment.status, expected, "intent {intent}");
    }

    // Compensation canceled exactly the authorized siblings.
    let mut canceled = h.provider.canceled();
    canceled.sort();
    let mut expected = vec![intents[0].clone(), intents[2].clone()];
    expected.sort();
    assert_eq!(canceled, expected);

    // Nothing was captured.
    assert!(h.provider.captured().is_empty());
    assert!(h.platform.orders().is_empty());
}

// ── S3: proportional refund of $30 on an 80/40 split ───────────

#[tokio::test]
async fn test_proportional_refund_splits_exactly() {
    let (h, token) = Harness::new(12000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[8000, 4000]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;

    let outcome = h
        .orchestrator
        .refund(
            txn,
            3000,
            RefundReason::RequestedByCustomer,
            RefundInitiator::Admin,
        )
        .await
        .expect("refund");

    assert_eq!(outcome.total_refunded_cents, 3000);
    assert_eq!(outcome.new_status, TransactionStatus::PartiallyRefunded);
    assert_eq!(outcome.refunds.len(), 2);
    let amounts: Vec<i64> = outcome.refunds.iter().map(|r| r.amount_cents).collect();
    assert_eq!(amounts, vec![2000, 1000]);
    for refund in &outcome.refunds {
        assert_eq!(refund.status, RefundStatus::Succeeded);
    }

    assert_eq!(
        h.repo.transaction(txn).await.unwrap().unwrap().status,
        TransactionStatus::PartiallyRefunded
    );
}

// ── S4: rounding repair on an equal three-way split ────────────

#[tokio::test]
async fn test_refund_rounding_repair_lands_on_first_largest() {
    let (h, token) = Harness::new(300, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[100, 100, 100]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;

    let outcome = h
        .orchestrator
        .refund(txn, 10, RefundReason::Duplicate, RefundInitiator::Admin)
        .await
        .expect("refund");

    let amounts: Vec<i64> = outcome.refunds.iter().map(|r| r.amount_cents).collect();
    assert_eq!(amounts, vec![4, 3, 3]);
    assert_eq!(amounts.iter().sum::<i64>(), 10);

    let provider_amounts: Vec<i64> = h.provider.refunds().iter().map(|(_, a)| *a).collect();
    assert_eq!(provider_amounts, vec![4, 3, 3]);
}

// ── S5: idempotent cancel ──────────────────────────────────────

#[tokio::test]
async fn test_remove_card_on_finalized_intent_succeeds() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000]).await;

    // The intent already reached a provider-final state.
    h.provider.cancel_authorization(&intents[0]).await.unwrap();

    h.orchestrator
        .remove_card(&session_id, &intents[0])
        .await
        .expect("remove_card must swallow already-final");

    let session = h.sessions.get_session(&session_id).await.unwrap();
    assert!(session.payments.is_empty());

    // Removing it again: no longer in the session.
    assert_eq!(
        h.orchestrator
            .remove_card(&session_id, &intents[0])
            .await
            .unwrap_err(),
        SplitPayError::PaymentNotFound
    );
}

// ── S6: webhook race after capture ─────────────────────────────

#[tokio::test]
async fn test_capture_webhook_after_complete_is_idempotent() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");

    let reconciler = Reconciler::new(Arc::clone(&h.repo));
    reconciler
        .handle_provider_event(ProviderEvent::PaymentIntentSucceeded {
            intent_id: intents[0].clone(),
        })
        .await
        .expect("idempotent re-write allowed");

    let payment = h.repo.payment_by_intent(&intents[0]).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Captured);
}

// ── init edge cases ────────────────────────────────────────────

#[tokio::test]
async fn test_init_rejects_unknown_and_inactive_stores() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;

    let err = h
        .orchestrator
        .init("ghost.myshopify.com", &token, CustomerMeta::default())
        .await
        .unwrap_err();
    assert_eq!(err, SplitPayError::StoreNotFound);

    let store = h.repo.store_by_domain(SHOP).await.unwrap().unwrap();
    h.repo.deactivate_store(store.id).await.unwrap();
    let err = h
        .orchestrator
        .init(SHOP, &token, CustomerMeta::default())
        .await
        .unwrap_err();
    assert_eq!(err, SplitPayError::StoreNotFound);
}

#[tokio::test]
async fn test_init_reuses_newest_pending_transaction() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let first = h
        .orchestrator
        .init(SHOP, &token, CustomerMeta::default())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .init(SHOP, &token, CustomerMeta::default())
        .await
        .unwrap();
    assert_eq!(first.transaction_id, second.transaction_id);
    assert_ne!(first.session_id, second.session_id);
    // The authoritative total came from the platform, not the widget.
    assert_eq!(second.total_amount_cents, 15000);
}

#[tokio::test]
async fn test_init_rejects_completed_checkout() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");

    let err = h
        .orchestrator
        .init(SHOP, &token, CustomerMeta::default())
        .await
        .unwrap_err();
    assert_eq!(err, SplitPayError::AlreadyCompleted);
}

// ── add_card preconditions ─────────────────────────────────────

#[tokio::test]
async fn test_add_card_enforces_store_card_limit() {
    let settings = StoreSettings {
        max_cards: 2,
        ..StoreSettings::default()
    };
    let (h, token) = Harness::new(15000, settings).await;
    let (session_id, _) = h.session_with_cards(&token, &[5000, 5000]).await;

    let err = h.orchestrator.add_card(&session_id, 5000).await.unwrap_err();
    assert_eq!(err, SplitPayError::TooManyCards { limit: 2 });
}

#[tokio::test]
async fn test_add_card_enforces_minimum_and_remaining_balance() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, _) = h.session_with_cards(&token, &[10000]).await;

    assert!(matches!(
        h.orchestrator.add_card(&session_id, 50).await.unwrap_err(),
        SplitPayError::Validation(_)
    ));
    assert!(matches!(
        h.orchestrator.add_card(&session_id, 5001).await.unwrap_err(),
        SplitPayError::Validation(_)
    ));
    // Exactly the remainder is fine.
    h.orchestrator.add_card(&session_id, 5000).await.expect("exact remainder");
}

#[tokio::test]
async fn test_expired_session_rejected() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, _) = h.session_with_cards(&token, &[10000]).await;

    h.clock.advance(chrono::Duration::minutes(31));
    let err = h.orchestrator.add_card(&session_id, 5000).await.unwrap_err();
    assert_eq!(err, SplitPayError::SessionExpired);
}

// ── complete preconditions ─────────────────────────────────────

#[tokio::test]
async fn test_complete_requires_full_coverage() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;

    // One card only: below the two-card floor.
    let (session_id, intents) = h.session_with_cards(&token, &[15000]).await;
    assert!(matches!(
        h.orchestrator
            .complete(&session_id, &submissions(&intents), None)
            .await
            .unwrap_err(),
        SplitPayError::Validation(_)
    ));
}

#[tokio::test]
async fn test_complete_requires_exact_sum() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 4000]).await;
    assert!(matches!(
        h.orchestrator
            .complete(&session_id, &submissions(&intents), None)
            .await
            .unwrap_err(),
        SplitPayError::Validation(_)
    ));
    // No provider traffic on a failed precondition.
    assert!(h.provider.confirmed().is_empty());
}

#[tokio::test]
async fn test_concurrent_complete_loses_cas() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;

    // A concurrent call already owns the transaction.
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;
    assert!(h.repo.mark_processing(txn).await.unwrap());

    let err = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .unwrap_err();
    assert_eq!(err, SplitPayError::AlreadyProcessing);
}

#[tokio::test]
async fn test_already_authorized_intent_not_reconfirmed() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;

    h.provider.preauthorize(&intents[0]);
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");

    // Only the second card needed confirmation.
    assert_eq!(h.provider.confirmed(), vec![intents[1].clone()]);
    let mut captured = h.provider.captured();
    captured.sort();
    let mut all = intents.clone();
    all.sort();
    assert_eq!(captured, all);
}

#[tokio::test]
async fn test_interactive_required_fails_closed() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;
    h.provider
        .script_confirm(&intents[0], ConfirmScript::RequireAction);

    let err = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .unwrap_err();
    let SplitPayError::CardDeclined(card) = err else {
        panic!("expected decline shape, got {err:?}");
    };
    assert_eq!(card.provider_intent_id, intents[0]);

    let payment = h.repo.payment_by_intent(&intents[1]).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Voided);
}

// ── partial capture anomaly ────────────────────────────────────

#[tokio::test]
async fn test_partial_capture_fails_transaction_and_releases_rest() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;
    h.provider.fail_capture(
        &intents[1],
        SplitPayError::ProviderTransient("capture timed out".into()),
    );

    let err = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SplitPayError::PartialCapture(_)));

    // Card 1 captured (needs manual reversal), card 2 released.
    let p1 = h.repo.payment_by_intent(&intents[0]).await.unwrap().unwrap();
    assert_eq!(p1.status, PaymentStatus::Captured);
    let p2 = h.repo.payment_by_intent(&intents[1]).await.unwrap().unwrap();
    assert_eq!(p2.status, PaymentStatus::Voided);

    let txn = h.repo.transaction(p1.transaction_id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert!(txn.failure_reason.unwrap().contains("Capture failed"));
}

// ── order submission and repair ────────────────────────────────

#[tokio::test]
async fn test_order_failure_keeps_money_and_repair_retries() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;
    h.platform.fail_orders(true);

    let err = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SplitPayError::OrderSubmissionFailed(_)));

    // Money stays captured; the transaction is completed without an order.
    let payment = h.repo.payment_by_intent(&intents[0]).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Captured);
    let txn = h.repo.transaction(payment.transaction_id).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(txn.order_id.is_none());

    // Boot-time repair picks it up once the platform recovers.
    h.platform.fail_orders(false);
    let repaired = repair_unsubmitted_orders(h.repo.as_ref(), h.platform.as_ref())
        .await
        .expect("repair scan");
    assert_eq!(repaired, 1);
    let txn = h.repo.transaction(txn.id).await.unwrap().unwrap();
    assert!(txn.order_id.is_some());
}

#[tokio::test]
async fn test_idempotent_complete_retry_returns_recorded_order() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[10000, 5000]).await;

    let first = h
        .orchestrator
        .complete(&session_id, &submissions(&intents), Some("retry-key-1"))
        .await
        .expect("complete");

    // The buyer's retry lands on a fresh session for the same transaction.
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;
    let now = h.clock.now();
    let replay_session = CheckoutSession {
        session_id: SessionId("replay-session".into()),
        transaction_id: txn,
        shop_domain: SHOP.to_string(),
        checkout_token: token.clone(),
        payments: Vec::new(),
        created_at: now,
        expires_at: now + chrono::Duration::minutes(30),
    };
    h.sessions.create_session(replay_session).await.unwrap();

    let second = h
        .orchestrator
        .complete(
            &SessionId("replay-session".into()),
            &submissions(&intents),
            Some("retry-key-1"),
        )
        .await
        .expect("idempotent retry");
    assert_eq!(first, second);

    // A different key is not treated as the same submission.
    let err = h
        .orchestrator
        .complete(
            &SessionId("replay-session".into()),
            &submissions(&intents),
            Some("other-key"),
        )
        .await
        .unwrap_err();
    assert_eq!(err, SplitPayError::AlreadyCompleted);
}

// ── refunds ────────────────────────────────────────────────────

#[tokio::test]
async fn test_refund_rejects_excess_and_wrong_state() {
    let (h, token) = Harness::new(12000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[8000, 4000]).await;

    // Not refundable before completion.
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;
    assert!(matches!(
        h.orchestrator
            .refund(txn, 100, RefundReason::Duplicate, RefundInitiator::Admin)
            .await
            .unwrap_err(),
        SplitPayError::InvalidTransition(_)
    ));

    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");

    h.orchestrator
        .refund(txn, 10000, RefundReason::Duplicate, RefundInitiator::Admin)
        .await
        .expect("first refund");

    let err = h
        .orchestrator
        .refund(txn, 3000, RefundReason::Duplicate, RefundInitiator::Admin)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SplitPayError::RefundExceedsRemaining {
            requested: 3000,
            remaining: 2000,
        }
    );
}

#[tokio::test]
async fn test_full_refund_terminates_payments_and_transaction() {
    let (h, token) = Harness::new(12000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[8000, 4000]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;

    let outcome = h
        .orchestrator
        .refund(
            txn,
            12000,
            RefundReason::RequestedByCustomer,
            RefundInitiator::Admin,
        )
        .await
        .expect("full refund");

    assert_eq!(outcome.new_status, TransactionStatus::Refunded);
    assert_eq!(outcome.total_refunded_cents, 12000);
    for intent in &intents {
        let payment = h.repo.payment_by_intent(intent).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
    }
}

#[tokio::test]
async fn test_refund_split_failure_does_not_abort_others() {
    let (h, token) = Harness::new(12000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[8000, 4000]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;

    h.provider.fail_refund(
        &intents[0],
        SplitPayError::Provider("charge already disputed".into()),
    );

    let outcome = h
        .orchestrator
        .refund(txn, 3000, RefundReason::Fraudulent, RefundInitiator::Admin)
        .await
        .expect("refund continues");

    assert_eq!(outcome.refunds.len(), 2);
    assert_eq!(outcome.refunds[0].status, RefundStatus::Failed);
    assert!(outcome.refunds[0].failure_reason.is_some());
    assert_eq!(outcome.refunds[1].status, RefundStatus::Succeeded);
    // Only the succeeded split counts toward the running total.
    assert_eq!(outcome.total_refunded_cents, 1000);
    assert_eq!(outcome.new_status, TransactionStatus::PartiallyRefunded);
}

// ── reconciler ─────────────────────────────────────────────────

#[tokio::test]
async fn test_reconciler_marks_pending_payment_failed() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let (_, intents) = h.session_with_cards(&token, &[10000]).await;

    let reconciler = Reconciler::new(Arc::clone(&h.repo));
    reconciler
        .handle_provider_event(ProviderEvent::PaymentIntentFailed {
            intent_id: intents[0].clone(),
            code: Some("expired_card".into()),
            message: Some("The card has expired.".into()),
        })
        .await
        .expect("handle event");

    let payment = h.repo.payment_by_intent(&intents[0]).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_code.as_deref(), Some("expired_card"));
}

#[tokio::test]
async fn test_reconciler_updates_refund_status_from_charge_event() {
    let (h, token) = Harness::new(12000, StoreSettings::default()).await;
    let (session_id, intents) = h.session_with_cards(&token, &[8000, 4000]).await;
    h.orchestrator
        .complete(&session_id, &submissions(&intents), None)
        .await
        .expect("complete");
    let txn = h
        .repo
        .payment_by_intent(&intents[0])
        .await
        .unwrap()
        .unwrap()
        .transaction_id;
    let outcome = h
        .orchestrator
        .refund(txn, 3000, RefundReason::Duplicate, RefundInitiator::Admin)
        .await
        .expect("refund");
    let provider_refund_id = outcome.refunds[0].provider_refund_id.clone().unwrap();

    let reconciler = Reconciler::new(Arc::clone(&h.repo));
    reconciler
        .handle_provider_event(ProviderEvent::ChargeRefunded {
            intent_id: Some(intents[0].clone()),
            refunds: vec![splitpay_stripe::RefundUpdate {
                refund_id: provider_refund_id.clone(),
                status: "failed".into(),
            }],
        })
        .await
        .expect("handle event");

    let refund = h
        .repo
        .refund_by_provider_id(&provider_refund_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refund.status, RefundStatus::Failed);
}

#[tokio::test]
async fn test_uninstall_and_redact_events() {
    let (h, token) = Harness::new(15000, StoreSettings::default()).await;
    let init = h
        .orchestrator
        .init(
            SHOP,
            &token,
            CustomerMeta {
                email: Some("buyer@example.com".into()),
                ip: Some("203.0.113.5".into()),
                user_agent: Some("Mozilla/5.0".into()),
            },
        )
        .await
        .expect("init");

    let reconciler = Reconciler::new(Arc::clone(&h.repo));
    reconciler
        .handle_platform_event(SHOP, PlatformEvent::AppUninstalled)
        .await
        .expect("uninstall");
    let store = h.repo.store_by_domain(SHOP).await.unwrap().unwrap();
    assert!(!store.active);
    assert!(store.access_token.is_none());

    reconciler
        .handle_platform_event(SHOP, PlatformEvent::ShopRedact)
        .await
        .expect("redact");
    let txn = h.repo.transaction(init.transaction_id).await.unwrap().unwrap();
    assert_eq!(txn.customer, CustomerMeta::default());
}
