//! Public widget surface (`/api/widget/*`).

use crate::error::ApiError;
use crate::extractors::{ClientIp, UserAgent};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use splitpay_core::repository::Repository;
use splitpay_core::types::{CustomerMeta, SessionId};
use splitpay_core::validation;
use splitpay_orchestrator::CardSubmission;
use splitpay_sessions::SessionStore;
use splitpay_shopify::CommercePlatform;
use splitpay_stripe::PaymentProvider;

/// Request to start a checkout session.
#[derive(Debug, Deserialize)]
pub struct InitRequest {
    /// Merchant shop domain.
    pub shop_domain: String,

    /// Platform checkout token.
    pub checkout_token: String,
}

/// Session facts the widget renders.
#[derive(Debug, Serialize)]
pub struct InitResponse {
    /// Always `true`.
    pub success: bool,

    /// Session handle for subsequent calls.
    pub session_id: String,

    /// The transaction being assembled.
    pub transaction_id: String,

    /// Authoritative checkout total in cents.
    pub total_amount: i64,

    /// ISO-4217 currency.
    pub currency: String,

    /// Per-checkout card limit.
    pub max_cards: u8,

    /// Per-card minimum in cents.
    pub min_amount: i64,
}

/// POST `/api/widget/init`
pub async fn init<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    client_ip: ClientIp,
    user_agent: UserAgent,
    Json(request): Json<InitRequest>,
) -> Result<Json<InitResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    validation::validate_shop_domain(&request.shop_domain)
        .map_err(|e| ApiError::invalid_shop(e.to_string()))?;
    validation::validate_checkout_token(&request.checkout_token)
        .map_err(|e| ApiError::invalid_token(e.to_string()))?;

    let outcome = state
        .orchestrator
        .init(
            &request.shop_domain,
            &request.checkout_token,
            CustomerMeta {
                email: None,
                ip: client_ip.0,
                user_agent: user_agent.0,
            },
        )
        .await?;

    Ok(Json(InitResponse {
        success: true,
        session_id: outcome.session_id.0,
        transaction_id: outcome.transaction_id.to_string(),
        total_amount: outcome.total_amount_cents,
        currency: outcome.currency,
        max_cards: outcome.max_cards,
        min_amount: outcome.min_amount_cents,
    }))
}

/// Request to add a card to the split.
#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    /// Session handle.
    pub session_id: String,

    /// Amount this card covers, in cents.
    pub amount: i64,
}

/// A created card authorization.
#[derive(Debug, Serialize)]
pub struct CreateIntentResponse {
    /// Always `true`.
    pub success: bool,

    /// Provider intent ID.
    pub payment_intent_id: String,

    /// Client secret for browser-side card collection.
    pub client_secret: String,

    /// Durable payment row ID.
    pub payment_id: String,
}

/// POST `/api/widget/create-payment-intent`
pub async fn create_payment_intent<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    if request.amount <= 0 {
        return Err(ApiError::invalid_amount("amount must be positive"));
    }

    let outcome = state
        .orchestrator
        .add_card(&SessionId(request.session_id), request.amount)
        .await?;

    Ok(Json(CreateIntentResponse {
        success: true,
        payment_intent_id: outcome.provider_intent_id,
        client_secret: outcome.client_secret,
        payment_id: outcome.payment_id.to_string(),
    }))
}

/// Request to drop a card from the split.
#[derive(Debug, Deserialize)]
pub struct RemovePaymentRequest {
    /// Session handle.
    pub session_id: String,

    /// Provider intent ID to release.
    pub payment_intent_id: String,
}

/// Empty success envelope.
#[derive(Debug, Serialize)]
pub struct EmptyResponse {
    /// Always `true`.
    pub success: bool,
}

/// POST `/api/widget/remove-payment`
pub async fn remove_payment<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    Json(request): Json<RemovePaymentRequest>,
) -> Result<Json<EmptyResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    validation::validate_intent_id(&request.payment_intent_id)
        .map_err(|e| ApiError::invalid_token(e.to_string()))?;

    state
        .orchestrator
        .remove_card(&SessionId(request.session_id), &request.payment_intent_id)
        .await?;

    Ok(Json(EmptyResponse { success: true }))
}

/// One card in a completion submission.
#[derive(Debug, Deserialize)]
pub struct SubmittedPayment {
    /// Provider intent ID.
    pub payment_intent_id: String,

    /// Provider payment-method ID collected by the browser.
    pub payment_method_id: String,
}

/// Request to run the atomic fan-out.
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    /// Session handle.
    pub session_id: String,

    /// Every card of the split, with its payment method.
    pub payments: Vec<SubmittedPayment>,

    /// Client-supplied idempotency key, making buyer retries safe.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// The created order.
#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    /// Always `true`.
    pub success: bool,

    /// Platform order ID.
    pub order_id: String,

    /// Human-facing order number.
    pub order_number: String,
}

/// POST `/api/widget/complete-checkout`
pub async fn complete_checkout<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    if request.payments.is_empty() {
        return Err(ApiError::missing_params("payments list is required"));
    }

    let cards: Vec<CardSubmission> = request
        .payments
        .into_iter()
        .map(|p| CardSubmission {
            provider_intent_id: p.payment_intent_id,
            provider_method_id: p.payment_method_id,
        })
        .collect();

    let outcome = state
        .orchestrator
        .complete(
            &SessionId(request.session_id),
            &cards,
            request.idempotency_key.as_deref(),
        )
        .await?;

    Ok(Json(CompleteResponse {
        success: true,
        order_id: outcome.order_id,
        order_number: outcome.order_number,
    }))
}
