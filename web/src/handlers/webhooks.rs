//! Inbound webhook routes.
//!
//! Both feeds consume the **raw body**: signature verification runs over
//! the exact bytes received, before any JSON parsing or state change.
//! Invalid signatures are 401 with no mutation. Valid payloads always get
//! a 200, even when processing fails: provider retry storms are worse than
//! a dropped advisory event, so failures are logged and counted instead
//! (`webhooks.swallowed` is the monitored alert).

use crate::error::ApiError;
use crate::handlers::widget::EmptyResponse;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use splitpay_core::repository::Repository;
use splitpay_sessions::SessionStore;
use splitpay_shopify::{CommercePlatform, PlatformEvent};
use splitpay_stripe::PaymentProvider;

/// Provider signature header.
const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Platform HMAC header.
const SHOPIFY_HMAC_HEADER: &str = "x-shopify-hmac-sha256";

/// Platform topic header.
const SHOPIFY_TOPIC_HEADER: &str = "x-shopify-topic";

/// Platform shop-domain header.
const SHOPIFY_SHOP_HEADER: &str = "x-shopify-shop-domain";

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Result<&'h str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("missing {name} header")))
}

/// POST `/api/stripe/webhook`
pub async fn stripe_webhook<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmptyResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let signature = header(&headers, STRIPE_SIGNATURE_HEADER)?;

    // Verification precedes everything; a bad signature mutates nothing.
    let event = state.provider.verify_webhook(&body, signature)?;

    if let Err(err) = state.reconciler.handle_provider_event(event).await {
        metrics::counter!("webhooks.swallowed", "feed" => "provider").increment(1);
        tracing::error!(error = %err, "Provider webhook processing failed (swallowed)");
    }

    Ok(Json(EmptyResponse { success: true }))
}

/// POST `/api/webhooks/shopify`
pub async fn shopify_webhook<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<EmptyResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let hmac = header(&headers, SHOPIFY_HMAC_HEADER)?;
    state.platform.verify_webhook(&body, hmac)?;

    let topic = header(&headers, SHOPIFY_TOPIC_HEADER)?;
    let shop_domain = header(&headers, SHOPIFY_SHOP_HEADER)?;
    let event = PlatformEvent::from_topic(topic);

    if let Err(err) = state
        .reconciler
        .handle_platform_event(shop_domain, event)
        .await
    {
        metrics::counter!("webhooks.swallowed", "feed" => "platform").increment(1);
        tracing::error!(
            shop_domain,
            topic,
            error = %err,
            "Platform webhook processing failed (swallowed)"
        );
    }

    Ok(Json(EmptyResponse { success: true }))
}
