//! Route table.

use crate::handlers::{admin, health, webhooks, widget};
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use splitpay_core::repository::Repository;
use splitpay_sessions::SessionStore;
use splitpay_shopify::CommercePlatform;
use splitpay_stripe::PaymentProvider;
use tower_http::trace::TraceLayer;

/// Build the full application router.
///
/// Webhook routes consume the raw body (signature verification needs the
/// exact bytes), everything else is JSON.
pub fn router<R, P, C, S>(state: AppState<R, P, C, S>) -> Router
where
    R: Repository + Send + Sync + 'static,
    P: PaymentProvider + Send + Sync + 'static,
    C: CommercePlatform + Send + Sync + 'static,
    S: SessionStore + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health::health))
        // Public widget surface
        .route("/api/widget/init", post(widget::init))
        .route(
            "/api/widget/create-payment-intent",
            post(widget::create_payment_intent),
        )
        .route("/api/widget/remove-payment", post(widget::remove_payment))
        .route(
            "/api/widget/complete-checkout",
            post(widget::complete_checkout),
        )
        // Admin surface
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/transactions", get(admin::list_transactions))
        .route("/api/admin/transactions/:id", get(admin::transaction_detail))
        .route("/api/admin/refund", post(admin::refund))
        .route("/api/admin/stores", get(admin::stores))
        .route("/api/admin/settings", put(admin::update_settings))
        // Webhooks (raw body)
        .route("/api/stripe/webhook", post(webhooks::stripe_webhook))
        .route("/api/webhooks/shopify", post(webhooks::shopify_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
