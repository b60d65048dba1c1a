//! Live client against the platform Admin REST API.

use crate::webhook::{parse_decimal_cents, verify_platform_hmac};
use crate::{CheckoutInfo, CommercePlatform, CreatedOrder, OrderRequest};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use splitpay_core::Result;
use splitpay_core::error::SplitPayError;
use splitpay_core::money::format_cents;
use std::time::Duration;

/// Admin API version every request is pinned to.
pub const ADMIN_API_VERSION: &str = "2024-01";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Admin REST client authenticated per-request with the store's token.
#[derive(Clone)]
pub struct ShopifyClient {
    http: Client,
    api_secret: String,
    /// Overrides `https://{shop}` for tests.
    base_url_override: Option<String>,
}

impl ShopifyClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Config`] if the HTTP client cannot be
    /// constructed.
    pub fn new(api_secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SplitPayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_secret: api_secret.into(),
            base_url_override: None,
        })
    }

    /// Point all requests at a fixed base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url_override = Some(base_url.into());
        self
    }

    fn base_url(&self, shop_domain: &str) -> String {
        self.base_url_override
            .clone()
            .unwrap_or_else(|| format!("https://{shop_domain}"))
    }
}

impl CommercePlatform for ShopifyClient {
    async fn fetch_checkout(
        &self,
        shop_domain: &str,
        access_token: &str,
        checkout_token: &str,
    ) -> Result<CheckoutInfo> {
        let url = format!(
            "{}/admin/api/{ADMIN_API_VERSION}/checkouts/{checkout_token}.json",
            self.base_url(shop_domain)
        );

        let response = self
            .http
            .get(&url)
            .header("X-Shopify-Access-Token", access_token)
            .send()
            .await
            .map_err(|e| SplitPayError::ProviderTransient(format!("checkout fetch failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SplitPayError::TransactionNotFound);
        }
        if !status.is_success() {
            return Err(SplitPayError::Provider(format!(
                "checkout fetch returned HTTP {status}"
            )));
        }

        let envelope: CheckoutEnvelope = response
            .json()
            .await
            .map_err(|e| SplitPayError::Provider(format!("malformed checkout payload: {e}")))?;

        Ok(CheckoutInfo {
            total_amount_cents: parse_decimal_cents(&envelope.checkout.total_price)?,
            currency: envelope.checkout.currency,
            customer_email: envelope.checkout.email,
        })
    }

    async fn create_order(
        &self,
        shop_domain: &str,
        access_token: &str,
        order: &OrderRequest,
    ) -> Result<CreatedOrder> {
        let url = format!(
            "{}/admin/api/{ADMIN_API_VERSION}/orders.json",
            self.base_url(shop_domain)
        );

        let payload = json!({
            "order": {
                "currency": order.currency,
                "email": order.customer_email,
                "financial_status": "paid",
                "note": format!(
                    "Split payment across {} cards, total {}",
                    order.payment_count,
                    format_cents(order.total_amount_cents),
                ),
                "tags": "split-payment",
                "transactions": [{
                    "kind": "sale",
                    "status": "success",
                    "amount": format_cents(order.total_amount_cents),
                }],
                "metafields": [
                    {
                        "namespace": "splitpay",
                        "key": "split_payment",
                        "type": "boolean",
                        "value": "true",
                    },
                    {
                        "namespace": "splitpay",
                        "key": "transaction_id",
                        "type": "single_line_text_field",
                        "value": order.transaction_id.to_string(),
                    },
                    {
                        "namespace": "splitpay",
                        "key": "payment_count",
                        "type": "number_integer",
                        "value": order.payment_count.to_string(),
                    },
                ],
            }
        });

        let response = self
            .http
            .post(&url)
            .header("X-Shopify-Access-Token", access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                SplitPayError::OrderSubmissionFailed(format!("order create failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SplitPayError::OrderSubmissionFailed(format!(
                "order create returned HTTP {status}: {body}"
            )));
        }

        let envelope: OrderEnvelope = response.json().await.map_err(|e| {
            SplitPayError::OrderSubmissionFailed(format!("malformed order payload: {e}"))
        })?;

        tracing::info!(
            shop_domain,
            order_id = envelope.order.id,
            order_number = envelope.order.order_number,
            transaction_id = %order.transaction_id,
            "Platform order created"
        );

        Ok(CreatedOrder {
            order_id: envelope.order.id.to_string(),
            order_number: envelope.order.order_number.to_string(),
        })
    }

    fn verify_webhook(&self, raw_body: &[u8], hmac_header: &str) -> Result<()> {
        verify_platform_hmac(raw_body, hmac_header, &self.api_secret)
    }
}

// ── Narrow response structs ────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CheckoutEnvelope {
    checkout: CheckoutBody,
}

#[derive(Debug, Deserialize)]
struct CheckoutBody {
    total_price: String,
    currency: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: OrderBody,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: i64,
    order_number: i64,
}
