//! # SplitPay Web
//!
//! Axum HTTP surface over the orchestrator:
//!
//! - **Widget** (`/api/widget/*`): init, create-payment-intent,
//!   remove-payment, complete-checkout. Declines come back as 402 with a
//!   `failedCard` object so the widget can highlight the failing card.
//! - **Admin** (`/api/admin/*`): stats, transaction listing/detail,
//!   refunds, store settings. Guarded by the `X-Session-Token` header
//!   (HMAC-bound to one shop).
//! - **Webhooks**: `/api/stripe/webhook` and `/api/webhooks/shopify`,
//!   both verified over the raw body before any state change.
//!
//! Every response is `{"success": true, …}` or
//! `{"success": false, "error": {"code", "message"}}` with the stable
//! error-code table clients switch on.

pub mod admin_token;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, ApiError>;
