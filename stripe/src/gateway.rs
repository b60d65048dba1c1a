//! Live gateway against the provider's REST API.

use crate::webhook::{parse_event, verify_signature};
use crate::{
    AuthorizationMetadata, ConfirmedAuthorization, ConfirmedCard, CreatedAuthorization,
    CreatedRefund, IntentStatus, PaymentProvider, ProviderEvent,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use splitpay_core::Result;
use splitpay_core::error::{DeclinedCard, SplitPayError};
use splitpay_core::types::{RefundReason, RefundStatus, TransactionId};
use std::time::Duration;

/// Production API base.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Per-operation timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transient-fault retries after the first attempt.
const MAX_RETRIES: u32 = 2;

/// Base backoff between retries; doubles per attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Payment Intents gateway with manual capture.
#[derive(Clone)]
pub struct StripeGateway {
    http: Client,
    base_url: String,
    secret_key: String,
    webhook_secret: String,
}

impl StripeGateway {
    /// Create a gateway against the production API.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Config`] if the HTTP client cannot be
    /// constructed.
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Result<Self> {
        Self::with_base_url(secret_key, webhook_secret, STRIPE_API_BASE)
    }

    /// Create a gateway against an alternate base URL (tests, mocks).
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Config`] if the HTTP client cannot be
    /// constructed.
    pub fn with_base_url(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SplitPayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
        })
    }

    /// POST a form to `path`, retrying transient faults.
    async fn post_form(&self, path: &str, params: &[(String, String)]) -> Result<IntentResponse> {
        self.request_with_retry(path, Some(params)).await
    }

    /// GET `path`, retrying transient faults.
    async fn get(&self, path: &str) -> Result<IntentResponse> {
        self.request_with_retry(path, None).await
    }

    async fn request_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0;
        loop {
            let request = match form {
                Some(params) => self.http.post(&url).form(params),
                None => self.http.get(&url),
            }
            .basic_auth(&self.secret_key, None::<&str>);

            let err = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.bytes().await.map_err(|e| {
                        SplitPayError::ProviderTransient(format!("failed to read response: {e}"))
                    })?;
                    if status.is_success() {
                        return serde_json::from_slice(&body).map_err(|e| {
                            SplitPayError::Provider(format!("malformed provider response: {e}"))
                        });
                    }
                    classify_http_error(status, &body)
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    SplitPayError::ProviderTransient(format!("provider request failed: {e}"))
                }
                Err(e) => SplitPayError::Provider(format!("provider request failed: {e}")),
            };

            if !err.is_retryable() || attempt >= MAX_RETRIES {
                return Err(err);
            }
            attempt += 1;
            let backoff = RETRY_BACKOFF * 2_u32.pow(attempt - 1);
            tracing::warn!(
                path,
                attempt,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Transient provider fault, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Map a non-2xx provider response to the error taxonomy.
fn classify_http_error(status: StatusCode, body: &[u8]) -> SplitPayError {
    let parsed: Option<ErrorEnvelope> = serde_json::from_slice(body).ok();
    let detail = parsed.map(|e| e.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("provider returned HTTP {status}"));

    if status.is_server_error() {
        return SplitPayError::ProviderTransient(message);
    }

    match detail {
        Some(d) if d.kind.as_deref() == Some("card_error") => {
            SplitPayError::CardDeclined(DeclinedCard {
                provider_intent_id: d
                    .payment_intent
                    .map(|pi| pi.id)
                    .unwrap_or_default(),
                code: d.decline_code.or(d.code),
                message,
                ..DeclinedCard::default()
            })
        }
        // Keep the stable `code`: it is the only part of the error body
        // the provider guarantees; `message` wording is free text.
        Some(d) => SplitPayError::ProviderRejected {
            code: d.code,
            message,
        },
        None => SplitPayError::Provider(message),
    }
}

/// Stable code for "the intent is already in a final state" rejections.
const UNEXPECTED_STATE_CODE: &str = "payment_intent_unexpected_state";

/// Collapse a cancel failure into the idempotent success the caller
/// expects when the intent already reached a final state.
fn cancel_disposition(err: SplitPayError) -> Result<()> {
    match err {
        SplitPayError::ProviderRejected {
            code: Some(code), ..
        } if code == UNEXPECTED_STATE_CODE => Ok(()),
        other => Err(other),
    }
}

impl PaymentProvider for StripeGateway {
    async fn create_authorization(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &AuthorizationMetadata,
    ) -> Result<CreatedAuthorization> {
        let params = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            // The hold must never auto-capture: sibling cards can still fail.
            ("capture_method".to_string(), "manual".to_string()),
            (
                "metadata[transaction_id]".to_string(),
                metadata.transaction_id.to_string(),
            ),
            (
                "metadata[card_index]".to_string(),
                metadata.card_index.to_string(),
            ),
        ];

        let response = self.post_form("/payment_intents", &params).await?;
        let status = IntentStatus::parse(&response.status)?;
        let client_secret = response.client_secret.ok_or_else(|| {
            SplitPayError::Provider("payment intent missing client_secret".into())
        })?;

        tracing::info!(
            intent_id = %response.id,
            amount_cents,
            transaction_id = %metadata.transaction_id,
            "Created manual-capture authorization"
        );

        Ok(CreatedAuthorization {
            intent_id: response.id,
            client_secret,
            status,
        })
    }

    async fn retrieve_authorization(&self, intent_id: &str) -> Result<IntentStatus> {
        let response = self.get(&format!("/payment_intents/{intent_id}")).await?;
        IntentStatus::parse(&response.status)
    }

    async fn confirm_authorization(
        &self,
        intent_id: &str,
        method_id: &str,
    ) -> Result<ConfirmedAuthorization> {
        let params = vec![("payment_method".to_string(), method_id.to_string())];
        let response = self
            .post_form(&format!("/payment_intents/{intent_id}/confirm"), &params)
            .await
            .map_err(|err| attach_intent(err, intent_id))?;

        let status = IntentStatus::parse(&response.status)?;
        if status == IntentStatus::RequiresAction {
            // 3-D Secure challenge: fail closed, the widget resolves it
            // before calling complete again.
            return Err(SplitPayError::InteractiveRequired);
        }
        if !status.is_authorized() {
            return Err(SplitPayError::CardDeclined(DeclinedCard {
                provider_intent_id: intent_id.to_string(),
                message: format!("authorization ended in unexpected state {status:?}"),
                ..DeclinedCard::default()
            }));
        }

        let card = response
            .charges
            .and_then(|charges| charges.data.into_iter().next())
            .and_then(|charge| charge.payment_method_details)
            .and_then(|details| details.card)
            .map(|card| ConfirmedCard {
                method_id: response.payment_method.clone(),
                brand: card.brand,
                last_four: card.last4,
                exp_month: card.exp_month,
                exp_year: card.exp_year,
            })
            .unwrap_or_else(|| ConfirmedCard {
                method_id: response.payment_method.clone(),
                ..ConfirmedCard::default()
            });

        Ok(ConfirmedAuthorization {
            intent_id: response.id,
            status,
            card,
        })
    }

    async fn capture_authorization(&self, intent_id: &str) -> Result<IntentStatus> {
        let response = self
            .post_form(&format!("/payment_intents/{intent_id}/capture"), &[])
            .await?;
        IntentStatus::parse(&response.status)
    }

    async fn cancel_authorization(&self, intent_id: &str) -> Result<()> {
        match self
            .post_form(&format!("/payment_intents/{intent_id}/cancel"), &[])
            .await
        {
            Ok(_) => Ok(()),
            // Canceling an intent that already reached a final state is a
            // success for our purposes; the provider signals it with the
            // stable `payment_intent_unexpected_state` code.
            Err(err) => match cancel_disposition(err) {
                Ok(()) => {
                    tracing::debug!(intent_id, "Cancel on finalized intent treated as success");
                    Ok(())
                }
                Err(err) => Err(err),
            },
        }
    }

    async fn create_refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: RefundReason,
        transaction_id: TransactionId,
    ) -> Result<CreatedRefund> {
        let params = vec![
            ("payment_intent".to_string(), intent_id.to_string()),
            ("amount".to_string(), amount_cents.to_string()),
            ("reason".to_string(), reason.as_str().to_string()),
            (
                "metadata[transaction_id]".to_string(),
                transaction_id.to_string(),
            ),
        ];

        let response: RefundResponse = self.request_with_retry("/refunds", Some(&params)).await?;
        let status = match response.status.as_deref() {
            Some("succeeded") => RefundStatus::Succeeded,
            Some("pending") => RefundStatus::Pending,
            Some("failed") => RefundStatus::Failed,
            Some(other) => {
                return Err(SplitPayError::Provider(format!(
                    "unknown refund status '{other}'"
                )));
            }
            None => {
                return Err(SplitPayError::Provider("refund missing status".into()));
            }
        };

        Ok(CreatedRefund {
            refund_id: response.id,
            status,
        })
    }

    fn verify_webhook(&self, raw_body: &[u8], signature_header: &str) -> Result<ProviderEvent> {
        verify_signature(
            raw_body,
            signature_header,
            &self.webhook_secret,
            chrono_now_unix(),
        )?;
        parse_event(raw_body)
    }
}

fn chrono_now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Enrich a decline raised by the confirm endpoint with its intent ID.
fn attach_intent(err: SplitPayError, intent_id: &str) -> SplitPayError {
    match err {
        SplitPayError::CardDeclined(mut card) => {
            if card.provider_intent_id.is_empty() {
                card.provider_intent_id = intent_id.to_string();
            }
            SplitPayError::CardDeclined(card)
        }
        other => other,
    }
}

// ── Narrow response structs ────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    status: String,
    client_secret: Option<String>,
    payment_method: Option<String>,
    charges: Option<ChargeList>,
}

#[derive(Debug, Deserialize)]
struct ChargeList {
    #[serde(default)]
    data: Vec<ChargeEntry>,
}

#[derive(Debug, Deserialize)]
struct ChargeEntry {
    payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodDetails {
    card: Option<CardEntry>,
}

#[derive(Debug, Deserialize)]
struct CardEntry {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<i16>,
    exp_year: Option<i16>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
    payment_intent: Option<ErrorIntentRef>,
}

#[derive(Debug, Deserialize)]
struct ErrorIntentRef {
    id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;

    #[test]
    fn test_card_error_maps_to_decline() {
        let body = br#"{"error":{
            "type":"card_error",
            "code":"card_declined",
            "decline_code":"insufficient_funds",
            "message":"Your card has insufficient funds.",
            "payment_intent":{"id":"pi_77"}
        }}"#;
        let err = classify_http_error(StatusCode::PAYMENT_REQUIRED, body);
        let SplitPayError::CardDeclined(card) = err else {
            panic!("expected a decline");
        };
        assert_eq!(card.provider_intent_id, "pi_77");
        assert_eq!(card.code.as_deref(), Some("insufficient_funds"));
        assert_eq!(card.message, "Your card has insufficient funds.");
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = classify_http_error(StatusCode::BAD_GATEWAY, b"upstream sad");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_client_errors_are_terminal() {
        let body = br#"{"error":{"type":"invalid_request_error","message":"No such payment_intent"}}"#;
        let err = classify_http_error(StatusCode::NOT_FOUND, body);
        assert_eq!(
            err,
            SplitPayError::ProviderRejected {
                code: None,
                message: "No such payment_intent".into(),
            }
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unparseable_error_body_keeps_status() {
        let err = classify_http_error(StatusCode::BAD_REQUEST, b"<html>");
        assert!(matches!(err, SplitPayError::Provider(m) if m.contains("400")));
    }

    // The provider's real already-final-state rejection: an
    // `invalid_request_error` whose message contains neither "already" nor
    // "unexpected state". Only the `code` identifies it.
    const FINALIZED_CANCEL_BODY: &[u8] = br#"{"error":{
        "type":"invalid_request_error",
        "code":"payment_intent_unexpected_state",
        "message":"This PaymentIntent could not be canceled because it has a status of succeeded. Only a PaymentIntent with one of the following statuses may be canceled: requires_payment_method, requires_capture, requires_confirmation, requires_action, processing."
    }}"#;

    #[test]
    fn test_invalid_request_error_keeps_stable_code() {
        let err = classify_http_error(StatusCode::BAD_REQUEST, FINALIZED_CANCEL_BODY);
        let SplitPayError::ProviderRejected { code, message } = err else {
            panic!("expected a coded rejection, got {err:?}");
        };
        assert_eq!(code.as_deref(), Some("payment_intent_unexpected_state"));
        assert!(message.contains("could not be canceled"));
    }

    #[test]
    fn test_cancel_on_finalized_intent_is_success() {
        let err = classify_http_error(StatusCode::BAD_REQUEST, FINALIZED_CANCEL_BODY);
        assert_eq!(cancel_disposition(err), Ok(()));
    }

    #[test]
    fn test_cancel_disposition_passes_other_errors_through() {
        let body = br#"{"error":{
            "type":"invalid_request_error",
            "code":"resource_missing",
            "message":"No such payment_intent: 'pi_nope'"
        }}"#;
        let err = classify_http_error(StatusCode::NOT_FOUND, body);
        assert!(cancel_disposition(err).is_err());

        let transient = classify_http_error(StatusCode::BAD_GATEWAY, b"upstream sad");
        assert!(cancel_disposition(transient).is_err());
    }
}
