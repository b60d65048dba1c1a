//! The checkout state machine.

use crate::submitter;
use chrono::Duration;
use futures::future::join_all;
use splitpay_core::clock::Clock;
use splitpay_core::error::{DeclinedCard, SplitPayError};
use splitpay_core::money::distribute;
use splitpay_core::repository::{CardDetails, NewPayment, NewRefund, NewTransaction, Repository};
use splitpay_core::types::{
    CheckoutSession, CustomerMeta, PaymentId, PaymentStatus, RefundId, RefundInitiator,
    RefundReason, RefundStatus, SessionId, SessionPayment, Store, Transaction, TransactionId,
    TransactionStatus,
};
use splitpay_core::{Result, validation};
use splitpay_sessions::{SESSION_TTL_MINUTES, SessionStore, generate_session_id};
use splitpay_shopify::CommercePlatform;
use splitpay_stripe::{AuthorizationMetadata, ConfirmedAuthorization, PaymentProvider};
use std::sync::Arc;

/// Everything the widget needs to start adding cards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    /// Session handle for subsequent calls.
    pub session_id: SessionId,

    /// The transaction being assembled.
    pub transaction_id: TransactionId,

    /// Authoritative checkout total in cents.
    pub total_amount_cents: i64,

    /// ISO-4217 currency.
    pub currency: String,

    /// Effective per-checkout card limit.
    pub max_cards: u8,

    /// Effective per-card minimum in cents.
    pub min_amount_cents: i64,
}

/// A created card authorization, ready for browser-side collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCardOutcome {
    /// Durable payment row.
    pub payment_id: PaymentId,

    /// Provider intent ID.
    pub provider_intent_id: String,

    /// Client secret the browser hands to the provider's JS; the card PAN
    /// never crosses this system.
    pub client_secret: String,
}

/// One card in a `complete()` submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSubmission {
    /// Provider intent ID (must be in the session).
    pub provider_intent_id: String,

    /// Provider payment-method ID collected by the browser.
    pub provider_method_id: String,
}

/// The completed checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteOutcome {
    /// Platform order ID.
    pub order_id: String,

    /// Human-facing order number.
    pub order_number: String,
}

/// Per-payment outcome of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RefundResult {
    /// Local refund row.
    pub refund_id: RefundId,

    /// The payment refunded against.
    pub payment_id: PaymentId,

    /// Provider refund ID, when the provider accepted it.
    pub provider_refund_id: Option<String>,

    /// Cents refunded by this split.
    pub amount_cents: i64,

    /// Provider-reported status.
    pub status: RefundStatus,

    /// Failure detail, when the provider rejected this split.
    pub failure_reason: Option<String>,
}

/// Result of a refund operation across all splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    /// Per-split results, in captured-payment order.
    pub refunds: Vec<RefundResult>,

    /// Total cents successfully refunded over the transaction's lifetime.
    pub total_refunded_cents: i64,

    /// Transaction status after this operation.
    pub new_status: TransactionStatus,
}

/// Drives a transaction through init → add/remove card → complete → refund.
///
/// Generic over the durable store, the payment provider, the commerce
/// platform and the session store so tests can substitute any of them.
pub struct CheckoutOrchestrator<R, P, C, S> {
    repo: Arc<R>,
    provider: Arc<P>,
    platform: Arc<C>,
    sessions: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<R, P, C, S> CheckoutOrchestrator<R, P, C, S>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    /// Assemble an orchestrator from its collaborators.
    pub fn new(
        repo: Arc<R>,
        provider: Arc<P>,
        platform: Arc<C>,
        sessions: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            provider,
            platform,
            sessions,
            clock,
        }
    }

    // ── init ───────────────────────────────────────────────────

    /// Start (or resume) a checkout: verify the store, pin the
    /// authoritative total, and hand out a 30-minute session.
    ///
    /// The total comes from the platform's checkout API, never from the
    /// widget; the browser is outside the trust boundary for amounts.
    ///
    /// # Errors
    ///
    /// `StoreNotFound` for unknown or inactive shops, `AlreadyCompleted`
    /// when the checkout token already settled, plus validation and
    /// downstream errors.
    pub async fn init(
        &self,
        shop_domain: &str,
        checkout_token: &str,
        client_meta: CustomerMeta,
    ) -> Result<InitOutcome> {
        validation::validate_shop_domain(shop_domain)?;
        validation::validate_checkout_token(checkout_token)?;

        let store = self.active_store(shop_domain).await?;

        if self
            .repo
            .completed_transaction(store.id, checkout_token)
            .await?
            .is_some()
        {
            return Err(SplitPayError::AlreadyCompleted);
        }

        let transaction = match self
            .repo
            .latest_pending_transaction(store.id, checkout_token)
            .await?
        {
            Some(existing) => existing,
            None => {
                let access_token = store_token(&store)?;
                let checkout = self
                    .platform
                    .fetch_checkout(shop_domain, access_token, checkout_token)
                    .await?;
                // Client metadata is best-effort: malformed values are
                // dropped, never a reason to reject the checkout.
                let mut customer = client_meta;
                if customer
                    .ip
                    .as_deref()
                    .is_some_and(|ip| validation::validate_client_ip(ip).is_err())
                {
                    customer.ip = None;
                }
                if customer
                    .email
                    .as_deref()
                    .is_some_and(|email| validation::validate_email(email).is_err())
                {
                    customer.email = None;
                }
                if customer.email.is_none() {
                    customer.email = checkout.customer_email;
                }
                self.repo
                    .create_transaction(NewTransaction {
                        store_id: store.id,
                        checkout_token: checkout_token.to_string(),
                        total_amount_cents: checkout.total_amount_cents,
                        currency: checkout.currency,
                        customer,
                    })
                    .await?
            }
        };

        let now = self.clock.now();
        let session = CheckoutSession {
            session_id: generate_session_id(),
            transaction_id: transaction.id,
            shop_domain: shop_domain.to_string(),
            checkout_token: checkout_token.to_string(),
            payments: Vec::new(),
            created_at: now,
            expires_at: now + Duration::minutes(SESSION_TTL_MINUTES),
        };
        self.sessions.create_session(session.clone()).await?;

        tracing::info!(
            shop_domain,
            transaction_id = %transaction.id,
            total_amount_cents = transaction.total_amount_cents,
            "Checkout session initialized"
        );

        Ok(InitOutcome {
            session_id: session.session_id,
            transaction_id: transaction.id,
            total_amount_cents: transaction.total_amount_cents,
            currency: transaction.currency,
            max_cards: store.settings.effective_max_cards(),
            min_amount_cents: store.settings.effective_min_amount_cents(),
        })
    }

    // ── add_card ───────────────────────────────────────────────

    /// Create a manual-capture authorization for one more card.
    ///
    /// # Errors
    ///
    /// Session errors, `TooManyCards`, amount validation (minimum and
    /// remaining-balance checks), and provider failures, in that order;
    /// the first failing precondition aborts.
    pub async fn add_card(&self, session_id: &SessionId, amount_cents: i64) -> Result<AddCardOutcome> {
        let mut session = self.sessions.get_session(session_id).await?;
        let store = self.active_store(&session.shop_domain).await?;
        let transaction = self.require_transaction(session.transaction_id).await?;

        let limit = store.settings.effective_max_cards();
        if session.payments.len() >= usize::from(limit) {
            return Err(SplitPayError::TooManyCards { limit });
        }

        validation::validate_amount(
            amount_cents,
            store.settings.effective_min_amount_cents(),
            None,
        )?;
        let remaining = session.remaining_cents(transaction.total_amount_cents);
        if amount_cents > remaining {
            return Err(SplitPayError::Validation(format!(
                "amount {amount_cents} exceeds remaining balance {remaining}"
            )));
        }

        let created = self
            .provider
            .create_authorization(
                amount_cents,
                &transaction.currency,
                &AuthorizationMetadata {
                    transaction_id: transaction.id,
                    card_index: session.payments.len(),
                },
            )
            .await?;

        let payment = self
            .repo
            .create_payment(NewPayment {
                transaction_id: transaction.id,
                provider_intent_id: created.intent_id.clone(),
                amount_cents,
            })
            .await?;

        session.payments.push(SessionPayment {
            payment_id: payment.id,
            provider_intent_id: created.intent_id.clone(),
            amount_cents,
        });
        self.sessions.update_session(session).await?;

        Ok(AddCardOutcome {
            payment_id: payment.id,
            provider_intent_id: created.intent_id,
            client_secret: created.client_secret,
        })
    }

    // ── remove_card ────────────────────────────────────────────

    /// Release one pending authorization and drop it from the session.
    ///
    /// The provider cancel is idempotent (already-final holds count as
    /// released). The payment row stays for audit; the reconciler flips it
    /// to `voided` when the provider confirms the cancellation.
    ///
    /// # Errors
    ///
    /// Session errors; `PaymentNotFound` when the intent is not in the
    /// session; transient provider faults.
    pub async fn remove_card(
        &self,
        session_id: &SessionId,
        provider_intent_id: &str,
    ) -> Result<()> {
        let mut session = self.sessions.get_session(session_id).await?;

        if session.payment_by_intent(provider_intent_id).is_none() {
            return Err(SplitPayError::PaymentNotFound);
        }

        self.provider.cancel_authorization(provider_intent_id).await?;

        session
            .payments
            .retain(|p| p.provider_intent_id != provider_intent_id);
        self.sessions.update_session(session).await?;

        tracing::info!(provider_intent_id, "Card removed from checkout");
        Ok(())
    }

    // ── complete ───────────────────────────────────────────────

    /// The atomic fan-out: authorize every card, capture all or release
    /// all, then record the platform order.
    ///
    /// # Errors
    ///
    /// `CardDeclined` (with the failing card's identifiers) after
    /// compensation, `AlreadyProcessing` when a concurrent call owns the
    /// transaction, `PartialCapture` on the capture anomaly,
    /// `OrderSubmissionFailed` when money is captured but the platform
    /// order could not be created.
    pub async fn complete(
        &self,
        session_id: &SessionId,
        cards: &[CardSubmission],
        idempotency_key: Option<&str>,
    ) -> Result<CompleteOutcome> {
        let session = self.sessions.get_session(session_id).await?;
        let transaction = self.require_transaction(session.transaction_id).await?;

        // A buyer retrying after a disconnect lands here with the same key;
        // hand back the recorded order instead of failing the re-submit.
        if transaction.status == TransactionStatus::Completed {
            if let (Some(key), Some(stored)) = (idempotency_key, &transaction.idempotency_key) {
                if key == stored {
                    if let (Some(order_id), Some(order_number)) =
                        (&transaction.order_id, &transaction.order_number)
                    {
                        return Ok(CompleteOutcome {
                            order_id: order_id.clone(),
                            order_number: order_number.clone(),
                        });
                    }
                }
            }
            return Err(SplitPayError::AlreadyCompleted);
        }
        match transaction.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Processing => return Err(SplitPayError::AlreadyProcessing),
            other => {
                return Err(SplitPayError::InvalidTransition(format!(
                    "transaction {} is {other}, checkout cannot complete",
                    transaction.id
                )));
            }
        }

        self.check_submission(&session, &transaction, cards)?;

        if let Some(key) = idempotency_key {
            self.repo.set_idempotency_key(transaction.id, key).await?;
        }

        // CAS gate: exactly one complete() moves pending → processing.
        if !self.repo.mark_processing(transaction.id).await? {
            return Err(SplitPayError::AlreadyProcessing);
        }

        // Phase 1: authorize fan-out, all-settle. No DB write happens until
        // every card has reported, so compensation knows the full picture.
        let confirmations = self.authorize_all(&session, cards).await;

        let mut authorized: Vec<SessionPayment> = Vec::new();
        let mut first_failure: Option<(SessionPayment, SplitPayError)> = None;
        for (payment, outcome) in confirmations {
            match outcome {
                Ok(confirmed) => {
                    self.repo.mark_payment_authorized(payment.payment_id).await?;
                    if let Some(confirmed) = confirmed {
                        self.repo
                            .set_payment_card_details(
                                payment.payment_id,
                                &CardDetails {
                                    provider_method_id: confirmed.card.method_id.clone(),
                                    brand: confirmed.card.brand.clone(),
                                    last_four: confirmed.card.last_four.clone(),
                                    exp_month: confirmed.card.exp_month,
                                    exp_year: confirmed.card.exp_year,
                                },
                            )
                            .await?;
                    }
                    authorized.push(payment);
                }
                Err(err) => {
                    let (code, message) = decline_detail(&err);
                    self.repo
                        .mark_payment_failed(payment.payment_id, code.as_deref(), &message)
                        .await?;
                    if first_failure.is_none() {
                        first_failure = Some((payment, err));
                    }
                }
            }
        }

        if let Some((failed_payment, err)) = first_failure {
            return Err(self
                .compensate_authorizations(&transaction, &authorized, failed_payment, err)
                .await);
        }

        // Phase 2: capture fan-out, only after authorize-all succeeded.
        let captures = self.capture_all(&authorized).await;

        let mut capture_failures: Vec<(SessionPayment, SplitPayError)> = Vec::new();
        for (payment, outcome) in captures {
            match outcome {
                Ok(()) => self.repo.mark_payment_captured(payment.payment_id).await?,
                Err(err) => capture_failures.push((payment, err)),
            }
        }

        if !capture_failures.is_empty() {
            return Err(self
                .handle_partial_capture(&transaction, capture_failures)
                .await);
        }

        self.repo.complete_transaction(transaction.id).await?;
        metrics::counter!("checkout.completed").increment(1);

        // Money is captured; order submission failure no longer rolls
        // anything back. The repair scan retries it at next boot.
        let store = self.active_store(&session.shop_domain).await?;
        let order = submitter::submit_order(
            self.repo.as_ref(),
            self.platform.as_ref(),
            &store,
            transaction.id,
            cards.len(),
        )
        .await;

        self.sessions.delete_session(session_id).await?;

        let order = order?;
        Ok(CompleteOutcome {
            order_id: order.order_id,
            order_number: order.order_number,
        })
    }

    // ── refund ─────────────────────────────────────────────────

    /// Refund `amount_cents`, split proportionally across the captured
    /// payments with exact-sum rounding repair.
    ///
    /// Individual provider failures produce `failed` refund rows without
    /// aborting the other splits; the caller sees every per-payment result.
    ///
    /// # Errors
    ///
    /// `TransactionNotFound`, `InvalidTransition` outside
    /// `completed`/`partially_refunded`, `RefundExceedsRemaining`, and
    /// validation errors.
    pub async fn refund(
        &self,
        transaction_id: TransactionId,
        amount_cents: i64,
        reason: RefundReason,
        initiated_by: RefundInitiator,
    ) -> Result<RefundOutcome> {
        let transaction = self.require_transaction(transaction_id).await?;
        if !transaction.status.is_refundable() {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {transaction_id} is {}, not refundable",
                transaction.status
            )));
        }

        validation::validate_amount(amount_cents, 1, None)?;
        let already_refunded = self.repo.refunded_total(transaction_id).await?;
        let remaining = transaction.total_amount_cents - already_refunded;
        if amount_cents > remaining {
            return Err(SplitPayError::RefundExceedsRemaining {
                requested: amount_cents,
                remaining,
            });
        }

        let captured: Vec<_> = self
            .repo
            .payments_for_transaction(transaction_id)
            .await?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Captured)
            .collect();
        let weights: Vec<i64> = captured.iter().map(|p| p.amount_cents).collect();
        let splits = distribute(amount_cents, &weights);

        let mut results = Vec::new();
        for (payment, split) in captured.iter().zip(splits) {
            if split == 0 {
                continue;
            }

            let (provider_refund_id, status, failure_reason) = match self
                .provider
                .create_refund(&payment.provider_intent_id, split, reason, transaction_id)
                .await
            {
                Ok(created) => (Some(created.refund_id), created.status, None),
                Err(err) => {
                    tracing::warn!(
                        payment_id = %payment.id,
                        amount_cents = split,
                        error = %err,
                        "Refund split rejected by provider"
                    );
                    (None, RefundStatus::Failed, Some(err.to_string()))
                }
            };

            let row = self
                .repo
                .create_refund(NewRefund {
                    transaction_id,
                    payment_id: payment.id,
                    provider_refund_id: provider_refund_id.clone(),
                    amount_cents: split,
                    reason,
                    status,
                    initiated_by,
                    failure_reason: failure_reason.clone(),
                })
                .await?;

            results.push(RefundResult {
                refund_id: row.id,
                payment_id: payment.id,
                provider_refund_id,
                amount_cents: split,
                status,
                failure_reason,
            });
        }

        let succeeded_now: i64 = results
            .iter()
            .filter(|r| r.status == RefundStatus::Succeeded)
            .map(|r| r.amount_cents)
            .sum();
        let total_refunded = already_refunded + succeeded_now;

        let new_status = if succeeded_now == 0 {
            transaction.status
        } else if total_refunded >= transaction.total_amount_cents {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        };
        if new_status != transaction.status {
            self.repo
                .set_transaction_refund_status(transaction_id, new_status)
                .await?;
        }

        // Payments fully covered by succeeded refunds reach their terminal
        // refunded state.
        for payment in &captured {
            let covered: i64 = self
                .repo
                .refunds_for_transaction(transaction_id)
                .await?
                .iter()
                .filter(|r| r.payment_id == payment.id && r.status == RefundStatus::Succeeded)
                .map(|r| r.amount_cents)
                .sum();
            if covered >= payment.amount_cents {
                self.repo.mark_payment_refunded(payment.id).await?;
            }
        }

        tracing::info!(
            transaction_id = %transaction_id,
            amount_cents,
            total_refunded,
            new_status = %new_status,
            "Refund processed"
        );

        Ok(RefundOutcome {
            refunds: results,
            total_refunded_cents: total_refunded,
            new_status,
        })
    }

    // ── internals ──────────────────────────────────────────────

    async fn active_store(&self, shop_domain: &str) -> Result<Store> {
        match self.repo.store_by_domain(shop_domain).await? {
            Some(store) if store.active => Ok(store),
            _ => Err(SplitPayError::StoreNotFound),
        }
    }

    async fn require_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.repo
            .transaction(id)
            .await?
            .ok_or(SplitPayError::TransactionNotFound)
    }

    /// The submitted list must cover the session exactly, sum to the
    /// transaction total, and use 2–5 cards.
    fn check_submission(
        &self,
        session: &CheckoutSession,
        transaction: &Transaction,
        cards: &[CardSubmission],
    ) -> Result<()> {
        let amounts: Vec<i64> = session.payments.iter().map(|p| p.amount_cents).collect();
        validation::validate_payment_amounts(transaction.total_amount_cents, &amounts, 1)?;

        if cards.len() != session.payments.len() {
            return Err(SplitPayError::Validation(format!(
                "submission has {} cards, session has {}",
                cards.len(),
                session.payments.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for card in cards {
            validation::validate_method_id(&card.provider_method_id)?;
            if session.payment_by_intent(&card.provider_intent_id).is_none() {
                return Err(SplitPayError::Validation(format!(
                    "intent {} is not part of this checkout",
                    card.provider_intent_id
                )));
            }
            if !seen.insert(card.provider_intent_id.as_str()) {
                return Err(SplitPayError::Validation(format!(
                    "intent {} submitted twice",
                    card.provider_intent_id
                )));
            }
        }

        Ok(())
    }

    /// Fan out confirmation, one task per card, and wait for all to settle.
    ///
    /// Returns `Ok(None)` for intents the provider already holds (a retried
    /// complete re-confirms nothing), `Ok(Some(_))` for fresh
    /// confirmations.
    async fn authorize_all(
        &self,
        session: &CheckoutSession,
        cards: &[CardSubmission],
    ) -> Vec<(SessionPayment, Result<Option<ConfirmedAuthorization>>)> {
        let tasks = session.payments.iter().map(|payment| {
            let method_id = cards
                .iter()
                .find(|c| c.provider_intent_id == payment.provider_intent_id)
                .map(|c| c.provider_method_id.clone())
                .unwrap_or_default();
            let payment = payment.clone();
            async move {
                let outcome = self.confirm_one(&payment, &method_id).await;
                (payment, outcome)
            }
        });
        join_all(tasks).await
    }

    async fn confirm_one(
        &self,
        payment: &SessionPayment,
        method_id: &str,
    ) -> Result<Option<ConfirmedAuthorization>> {
        // Idempotency: an intent already holding funds is not re-confirmed.
        if let Ok(status) = self
            .provider
            .retrieve_authorization(&payment.provider_intent_id)
            .await
        {
            if status.is_authorized() {
                return Ok(None);
            }
        }

        self.provider
            .confirm_authorization(&payment.provider_intent_id, method_id)
            .await
            .map(Some)
    }

    /// Cancel every successfully authorized sibling in parallel, mark each
    /// voided, fail the transaction, and build the caller-facing decline.
    async fn compensate_authorizations(
        &self,
        transaction: &Transaction,
        authorized: &[SessionPayment],
        failed_payment: SessionPayment,
        err: SplitPayError,
    ) -> SplitPayError {
        metrics::counter!("checkout.compensated").increment(1);
        tracing::warn!(
            transaction_id = %transaction.id,
            failed_intent = %failed_payment.provider_intent_id,
            authorized_count = authorized.len(),
            "Authorization failed, releasing sibling holds"
        );

        let cancels = authorized.iter().map(|payment| {
            let intent = payment.provider_intent_id.clone();
            async move { (payment, self.provider.cancel_authorization(&intent).await) }
        });
        for (payment, outcome) in join_all(cancels).await {
            match outcome {
                Ok(()) => {
                    if let Err(db_err) = self.repo.mark_payment_voided(payment.payment_id).await {
                        tracing::error!(
                            payment_id = %payment.payment_id,
                            error = %db_err,
                            "Failed to record voided payment"
                        );
                    }
                }
                Err(cancel_err) => {
                    // Best effort: the hold expires provider-side; the
                    // reconciler catches the eventual cancellation event.
                    tracing::error!(
                        payment_id = %payment.payment_id,
                        error = %cancel_err,
                        "Compensation cancel failed"
                    );
                }
            }
        }

        let decline = as_decline(&failed_payment, err);
        let reason = format!("Payment failed: {}", decline.message);
        if let Err(db_err) = self.repo.fail_transaction(transaction.id, &reason).await {
            tracing::error!(
                transaction_id = %transaction.id,
                error = %db_err,
                "Failed to record failed transaction"
            );
        }

        SplitPayError::CardDeclined(decline)
    }

    /// Capture fan-out, one task per authorized card, all-settle.
    async fn capture_all(
        &self,
        authorized: &[SessionPayment],
    ) -> Vec<(SessionPayment, Result<()>)> {
        let tasks = authorized.iter().map(|payment| {
            let intent = payment.provider_intent_id.clone();
            let payment = payment.clone();
            async move {
                let outcome = self
                    .provider
                    .capture_authorization(&intent)
                    .await
                    .map(|_| ());
                (payment, outcome)
            }
        });
        join_all(tasks).await
    }

    /// The partial-capture anomaly: some captures landed, some did not.
    ///
    /// Uncaptured holds are released best-effort, the transaction is
    /// failed, and the operator alert fires: captured money needs manual
    /// reversal and must never be silently lost.
    async fn handle_partial_capture(
        &self,
        transaction: &Transaction,
        failures: Vec<(SessionPayment, SplitPayError)>,
    ) -> SplitPayError {
        metrics::counter!("checkout.partial_capture").increment(1);
        tracing::error!(
            transaction_id = %transaction.id,
            failed_captures = failures.len(),
            "Partial capture: operator intervention required"
        );

        let cancels = failures.iter().map(|(payment, _)| {
            let intent = payment.provider_intent_id.clone();
            async move { (payment, self.provider.cancel_authorization(&intent).await) }
        });
        for (payment, outcome) in join_all(cancels).await {
            match outcome {
                Ok(()) => {
                    if let Err(db_err) = self.repo.mark_payment_voided(payment.payment_id).await {
                        tracing::error!(
                            payment_id = %payment.payment_id,
                            error = %db_err,
                            "Failed to record voided payment"
                        );
                    }
                }
                Err(cancel_err) => tracing::error!(
                    payment_id = %payment.payment_id,
                    error = %cancel_err,
                    "Post-capture-failure cancel failed"
                ),
            }
        }

        let reason = "Capture failed after authorization";
        if let Err(db_err) = self.repo.fail_transaction(transaction.id, reason).await {
            tracing::error!(
                transaction_id = %transaction.id,
                error = %db_err,
                "Failed to record failed transaction"
            );
        }

        SplitPayError::PartialCapture(reason.to_string())
    }
}

/// An active store must hold a platform token to act on the merchant's
/// behalf; a missing one is an install-state bug, not a caller error.
fn store_token(store: &Store) -> Result<&str> {
    store.access_token.as_deref().ok_or_else(|| {
        SplitPayError::Internal(format!(
            "active store {} has no access token",
            store.shop_domain
        ))
    })
}

/// Extract provider code and message from a per-card failure.
fn decline_detail(err: &SplitPayError) -> (Option<String>, String) {
    match err {
        SplitPayError::CardDeclined(card) => (card.code.clone(), card.message.clone()),
        SplitPayError::InteractiveRequired => (
            Some("authentication_required".to_string()),
            err.to_string(),
        ),
        other => (None, other.to_string()),
    }
}

/// Shape any per-card failure into the decline the widget renders,
/// carrying the failing card's intent so it can be highlighted.
fn as_decline(payment: &SessionPayment, err: SplitPayError) -> DeclinedCard {
    match err {
        SplitPayError::CardDeclined(mut card) => {
            if card.provider_intent_id.is_empty() {
                card.provider_intent_id = payment.provider_intent_id.clone();
            }
            card
        }
        other => DeclinedCard {
            provider_intent_id: payment.provider_intent_id.clone(),
            message: other.to_string(),
            ..DeclinedCard::default()
        },
    }
}
