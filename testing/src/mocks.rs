//! Scripted mock collaborators.
//!
//! Mocks record every call so tests can assert fan-out and compensation
//! behavior (which intents were confirmed, captured, canceled) and script
//! per-intent outcomes (decline card 2, fail capture 3, reject a refund).

use splitpay_core::Result;
use splitpay_core::error::{DeclinedCard, SplitPayError};
use splitpay_core::types::{RefundReason, RefundStatus, TransactionId};
use splitpay_shopify::{CheckoutInfo, CommercePlatform, CreatedOrder, OrderRequest};
use splitpay_stripe::{
    AuthorizationMetadata, ConfirmedAuthorization, ConfirmedCard, CreatedAuthorization,
    CreatedRefund, IntentStatus, PaymentProvider, ProviderEvent,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Scripted outcome of confirming one intent.
#[derive(Debug, Clone)]
pub enum ConfirmScript {
    /// Confirmation succeeds with these card details.
    Authorize {
        /// Card brand reported back.
        brand: &'static str,
        /// Last four digits reported back.
        last_four: &'static str,
    },
    /// The provider declines the card.
    Decline {
        /// Decline code.
        code: &'static str,
        /// Decline message.
        message: &'static str,
    },
    /// The provider demands a 3-D Secure challenge.
    RequireAction,
    /// Transient network fault.
    Transient,
}

#[derive(Default)]
struct ProviderState {
    counter: usize,
    statuses: HashMap<String, IntentStatus>,
    confirm_scripts: HashMap<String, ConfirmScript>,
    capture_failures: HashMap<String, SplitPayError>,
    cancel_failures: HashMap<String, SplitPayError>,
    refund_failures: HashMap<String, SplitPayError>,
    refund_counter: usize,
    webhook_events: VecDeque<ProviderEvent>,
    created: Vec<String>,
    confirmed: Vec<String>,
    captured: Vec<String>,
    canceled: Vec<String>,
    refunded: Vec<(String, i64)>,
}

/// Scripted [`PaymentProvider`] with recorded calls.
#[derive(Default)]
pub struct MockPaymentProvider {
    state: Mutex<ProviderState>,
}

impl MockPaymentProvider {
    /// Create a provider with no scripts (every operation succeeds).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)] // Poisoned lock means a test already failed
    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap()
    }

    /// Script the confirm outcome for one intent.
    pub fn script_confirm(&self, intent_id: &str, script: ConfirmScript) {
        self.lock()
            .confirm_scripts
            .insert(intent_id.to_string(), script);
    }

    /// Script a capture failure for one intent.
    pub fn fail_capture(&self, intent_id: &str, err: SplitPayError) {
        self.lock()
            .capture_failures
            .insert(intent_id.to_string(), err);
    }

    /// Script a cancel failure for one intent.
    pub fn fail_cancel(&self, intent_id: &str, err: SplitPayError) {
        self.lock()
            .cancel_failures
            .insert(intent_id.to_string(), err);
    }

    /// Script a refund failure for one intent.
    pub fn fail_refund(&self, intent_id: &str, err: SplitPayError) {
        self.lock()
            .refund_failures
            .insert(intent_id.to_string(), err);
    }

    /// Mark an intent as already authorized provider-side (idempotent
    /// complete retry scenario).
    pub fn preauthorize(&self, intent_id: &str) {
        self.lock()
            .statuses
            .insert(intent_id.to_string(), IntentStatus::RequiresCapture);
    }

    /// Queue the event `verify_webhook` returns for a valid signature.
    pub fn push_webhook_event(&self, event: ProviderEvent) {
        self.lock().webhook_events.push_back(event);
    }

    /// Intents confirmed so far, in call order.
    #[must_use]
    pub fn confirmed(&self) -> Vec<String> {
        self.lock().confirmed.clone()
    }

    /// Intents captured so far, in call order.
    #[must_use]
    pub fn captured(&self) -> Vec<String> {
        self.lock().captured.clone()
    }

    /// Intents canceled so far, in call order.
    #[must_use]
    pub fn canceled(&self) -> Vec<String> {
        self.lock().canceled.clone()
    }

    /// Refund calls so far as `(intent_id, amount_cents)`.
    #[must_use]
    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.lock().refunded.clone()
    }
}

impl PaymentProvider for MockPaymentProvider {
    async fn create_authorization(
        &self,
        _amount_cents: i64,
        _currency: &str,
        _metadata: &AuthorizationMetadata,
    ) -> Result<CreatedAuthorization> {
        let mut state = self.lock();
        state.counter += 1;
        let intent_id = format!("pi_mock_{}", state.counter);
        state
            .statuses
            .insert(intent_id.clone(), IntentStatus::RequiresConfirmation);
        state.created.push(intent_id.clone());
        Ok(CreatedAuthorization {
            client_secret: format!("{intent_id}_secret"),
            intent_id,
            status: IntentStatus::RequiresPaymentMethod,
        })
    }

    async fn retrieve_authorization(&self, intent_id: &str) -> Result<IntentStatus> {
        Ok(self
            .lock()
            .statuses
            .get(intent_id)
            .copied()
            .unwrap_or(IntentStatus::RequiresConfirmation))
    }

    async fn confirm_authorization(
        &self,
        intent_id: &str,
        _method_id: &str,
    ) -> Result<ConfirmedAuthorization> {
        let mut state = self.lock();
        state.confirmed.push(intent_id.to_string());
        match state.confirm_scripts.get(intent_id).cloned() {
            None | Some(ConfirmScript::Authorize { .. }) => {
                let card = match state.confirm_scripts.get(intent_id) {
                    Some(ConfirmScript::Authorize { brand, last_four }) => ConfirmedCard {
                        method_id: Some(format!("pm_{intent_id}")),
                        brand: Some((*brand).to_string()),
                        last_four: Some((*last_four).to_string()),
                        exp_month: Some(12),
                        exp_year: Some(2030),
                    },
                    _ => ConfirmedCard {
                        method_id: Some(format!("pm_{intent_id}")),
                        ..ConfirmedCard::default()
                    },
                };
                state
                    .statuses
                    .insert(intent_id.to_string(), IntentStatus::RequiresCapture);
                Ok(ConfirmedAuthorization {
                    intent_id: intent_id.to_string(),
                    status: IntentStatus::RequiresCapture,
                    card,
                })
            }
            Some(ConfirmScript::Decline { code, message }) => {
                Err(SplitPayError::CardDeclined(DeclinedCard {
                    provider_intent_id: intent_id.to_string(),
                    brand: Some("visa".to_string()),
                    last_four: Some("4002".to_string()),
                    code: Some(code.to_string()),
                    message: message.to_string(),
                }))
            }
            Some(ConfirmScript::RequireAction) => Err(SplitPayError::InteractiveRequired),
            Some(ConfirmScript::Transient) => Err(SplitPayError::ProviderTransient(
                "simulated network fault".to_string(),
            )),
        }
    }

    async fn capture_authorization(&self, intent_id: &str) -> Result<IntentStatus> {
        let mut state = self.lock();
        if let Some(err) = state.capture_failures.get(intent_id).cloned() {
            return Err(err);
        }
        state.captured.push(intent_id.to_string());
        state
            .statuses
            .insert(intent_id.to_string(), IntentStatus::Succeeded);
        Ok(IntentStatus::Succeeded)
    }

    async fn cancel_authorization(&self, intent_id: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(err) = state.cancel_failures.get(intent_id).cloned() {
            return Err(err);
        }
        state.canceled.push(intent_id.to_string());
        state
            .statuses
            .insert(intent_id.to_string(), IntentStatus::Canceled);
        Ok(())
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        _reason: RefundReason,
        _transaction_id: TransactionId,
    ) -> Result<CreatedRefund> {
        let mut state = self.lock();
        if let Some(err) = state.refund_failures.get(intent_id).cloned() {
            return Err(err);
        }
        state.refund_counter += 1;
        state.refunded.push((intent_id.to_string(), amount_cents));
        Ok(CreatedRefund {
            refund_id: format!("re_mock_{}", state.refund_counter),
            status: RefundStatus::Succeeded,
        })
    }

    fn verify_webhook(&self, _raw_body: &[u8], signature_header: &str) -> Result<ProviderEvent> {
        if signature_header != "valid" {
            return Err(SplitPayError::InvalidSignature);
        }
        self.lock()
            .webhook_events
            .pop_front()
            .ok_or_else(|| SplitPayError::Provider("no scripted webhook event".into()))
    }
}

#[derive(Default)]
struct PlatformState {
    checkouts: HashMap<String, CheckoutInfo>,
    order_counter: usize,
    fail_orders: bool,
    orders: Vec<OrderRequest>,
}

/// Scripted [`CommercePlatform`] with recorded order submissions.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<PlatformState>,
}

impl MockPlatform {
    /// Create a platform with no checkouts registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)] // Poisoned lock means a test already failed
    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }

    /// Register the authoritative checkout behind a token.
    pub fn set_checkout(&self, checkout_token: &str, info: CheckoutInfo) {
        self.lock()
            .checkouts
            .insert(checkout_token.to_string(), info);
    }

    /// Make order creation fail until cleared.
    pub fn fail_orders(&self, fail: bool) {
        self.lock().fail_orders = fail;
    }

    /// Orders submitted so far.
    #[must_use]
    pub fn orders(&self) -> Vec<OrderRequest> {
        self.lock().orders.clone()
    }
}

impl CommercePlatform for MockPlatform {
    async fn fetch_checkout(
        &self,
        _shop_domain: &str,
        _access_token: &str,
        checkout_token: &str,
    ) -> Result<CheckoutInfo> {
        self.lock()
            .checkouts
            .get(checkout_token)
            .cloned()
            .ok_or(SplitPayError::TransactionNotFound)
    }

    async fn create_order(
        &self,
        _shop_domain: &str,
        _access_token: &str,
        order: &OrderRequest,
    ) -> Result<CreatedOrder> {
        let mut state = self.lock();
        if state.fail_orders {
            return Err(SplitPayError::OrderSubmissionFailed(
                "simulated platform outage".to_string(),
            ));
        }
        state.order_counter += 1;
        state.orders.push(order.clone());
        Ok(CreatedOrder {
            order_id: format!("90000{}", state.order_counter),
            order_number: format!("{}", 1000 + state.order_counter),
        })
    }

    fn verify_webhook(&self, _raw_body: &[u8], hmac_header: &str) -> Result<()> {
        if hmac_header == "valid" {
            Ok(())
        } else {
            Err(SplitPayError::InvalidSignature)
        }
    }
}
