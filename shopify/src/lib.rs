//! Commerce-platform client.
//!
//! Three concerns cross this boundary: fetching the authoritative checkout
//! total at session init (the widget is never trusted for amounts), creating
//! the platform order after capture-all succeeds, and verifying platform
//! webhook deliveries (HMAC-SHA256 over the raw body, base64-encoded).

mod client;
mod webhook;

pub use client::{ShopifyClient, ADMIN_API_VERSION};
pub use webhook::{parse_decimal_cents, verify_platform_hmac};

use splitpay_core::Result;
use splitpay_core::types::TransactionId;

/// Authoritative checkout facts fetched from the platform at init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInfo {
    /// Checkout total in cents.
    pub total_amount_cents: i64,

    /// ISO-4217 currency code.
    pub currency: String,

    /// Customer email, when the checkout carries one.
    pub customer_email: Option<String>,
}

/// Inputs for creating the platform order after capture-all.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Local transaction the order settles.
    pub transaction_id: TransactionId,

    /// Order total in cents.
    pub total_amount_cents: i64,

    /// ISO-4217 currency code.
    pub currency: String,

    /// Customer email, when known.
    pub customer_email: Option<String>,

    /// How many cards the total was split across.
    pub payment_count: usize,
}

/// The platform order created for a completed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    /// Platform order ID.
    pub order_id: String,

    /// Human-facing order number.
    pub order_number: String,
}

/// Platform webhook topics this service consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// Merchant removed the app; deactivate the store.
    AppUninstalled,
    /// Advisory only; money state never changes on platform order events.
    OrdersCreate,
    /// Advisory only.
    OrdersRefunded,
    /// GDPR: purge one customer's PII.
    CustomersRedact,
    /// GDPR: purge the whole shop (uninstall + PII purge).
    ShopRedact,
    /// GDPR: data access request; acknowledged, nothing stored beyond rows.
    CustomersDataRequest,
    /// Any other topic.
    Unhandled(String),
}

impl PlatformEvent {
    /// Map a webhook topic header to an event.
    #[must_use]
    pub fn from_topic(topic: &str) -> Self {
        match topic {
            "app/uninstalled" => Self::AppUninstalled,
            "orders/create" => Self::OrdersCreate,
            "orders/refunded" => Self::OrdersRefunded,
            "customers/redact" => Self::CustomersRedact,
            "shop/redact" => Self::ShopRedact,
            "customers/data_request" => Self::CustomersDataRequest,
            other => Self::Unhandled(other.to_string()),
        }
    }
}

/// Boundary to the commerce platform.
pub trait CommercePlatform: Send + Sync {
    /// Fetch the authoritative checkout total and customer facts.
    fn fetch_checkout(
        &self,
        shop_domain: &str,
        access_token: &str,
        checkout_token: &str,
    ) -> impl Future<Output = Result<CheckoutInfo>> + Send;

    /// Create the order recording a completed split payment.
    fn create_order(
        &self,
        shop_domain: &str,
        access_token: &str,
        order: &OrderRequest,
    ) -> impl Future<Output = Result<CreatedOrder>> + Send;

    /// Verify a platform webhook delivery (raw body, `X-Shopify-Hmac-Sha256`).
    ///
    /// # Errors
    ///
    /// [`splitpay_core::SplitPayError::InvalidSignature`] on mismatch;
    /// callers must reply 401 without touching state.
    fn verify_webhook(&self, raw_body: &[u8], hmac_header: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_mapping() {
        assert_eq!(PlatformEvent::from_topic("app/uninstalled"), PlatformEvent::AppUninstalled);
        assert_eq!(PlatformEvent::from_topic("shop/redact"), PlatformEvent::ShopRedact);
        assert_eq!(
            PlatformEvent::from_topic("products/update"),
            PlatformEvent::Unhandled("products/update".into())
        );
    }
}
