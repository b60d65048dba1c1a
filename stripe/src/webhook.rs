//! Webhook signature verification and event parsing.
//!
//! The provider signs each delivery with
//! `Stripe-Signature: t=<unix>,v1=<hex hmac>[,v1=…]` where the MAC is
//! HMAC-SHA256 over `"{t}.{raw body}"`. Verification runs before any JSON
//! parsing and uses constant-time comparison; stale timestamps are rejected
//! to blunt replay.

use crate::ProviderEvent;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use splitpay_core::Result;
use splitpay_core::error::SplitPayError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// One refund entry reported on a `charge.refunded` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundUpdate {
    /// Provider refund ID.
    pub refund_id: String,

    /// Provider-reported refund status string (`succeeded`, `failed`, …).
    pub status: String,
}

/// Verify `signature_header` over `raw_body` and check timestamp freshness.
///
/// # Errors
///
/// Returns [`SplitPayError::InvalidSignature`] on malformed headers, stale
/// timestamps, or MAC mismatch. The error carries no detail on purpose.
pub fn verify_signature(
    raw_body: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for pair in signature_header.split(',') {
        match pair.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let (Some(timestamp), false) = (timestamp, candidates.is_empty()) else {
        return Err(SplitPayError::InvalidSignature);
    };

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SplitPayError::InvalidSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SplitPayError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    let expected = hex_digest(&mac.finalize().into_bytes());

    if candidates
        .iter()
        .any(|candidate| constant_time_eq(candidate.as_bytes(), expected.as_bytes()))
    {
        Ok(())
    } else {
        Err(SplitPayError::InvalidSignature)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ── Narrow event envelope ──────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    id: Option<String>,
    payment_intent: Option<String>,
    last_payment_error: Option<LastPaymentError>,
    refunds: Option<RefundList>,
    reason: Option<String>,
    charge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundList {
    #[serde(default)]
    data: Vec<RefundObject>,
}

#[derive(Debug, Deserialize)]
struct RefundObject {
    id: String,
    status: Option<String>,
}

/// Parse a verified payload into a [`ProviderEvent`].
///
/// # Errors
///
/// Returns [`SplitPayError::Provider`] when the payload is not valid JSON
/// or a handled event is missing its identifying fields.
pub fn parse_event(raw_body: &[u8]) -> Result<ProviderEvent> {
    let envelope: EventEnvelope = serde_json::from_slice(raw_body)
        .map_err(|e| SplitPayError::Provider(format!("malformed webhook payload: {e}")))?;

    let object = envelope.data.object;
    match envelope.event_type.as_str() {
        "payment_intent.succeeded" => Ok(ProviderEvent::PaymentIntentSucceeded {
            intent_id: object.id.ok_or_else(|| {
                SplitPayError::Provider("payment_intent.succeeded without intent id".into())
            })?,
        }),
        "payment_intent.payment_failed" => {
            let (code, message) = object
                .last_payment_error
                .map(|e| (e.code, e.message))
                .unwrap_or((None, None));
            Ok(ProviderEvent::PaymentIntentFailed {
                intent_id: object.id.ok_or_else(|| {
                    SplitPayError::Provider("payment_intent.payment_failed without intent id".into())
                })?,
                code,
                message,
            })
        }
        "charge.refunded" => Ok(ProviderEvent::ChargeRefunded {
            intent_id: object.payment_intent,
            refunds: object
                .refunds
                .map(|list| {
                    list.data
                        .into_iter()
                        .map(|r| RefundUpdate {
                            refund_id: r.id,
                            status: r.status.unwrap_or_else(|| "pending".to_string()),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }),
        "charge.dispute.created" => Ok(ProviderEvent::DisputeCreated {
            charge_id: object.charge.or(object.id).ok_or_else(|| {
                SplitPayError::Provider("charge.dispute.created without charge id".into())
            })?,
            reason: object.reason,
        }),
        other => Ok(ProviderEvent::Unhandled {
            event_type: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(body: &[u8], timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        format!("t={timestamp},v1={}", hex_digest(&mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_verifies() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(body, 1_700_000_000, SECRET);
        assert!(verify_signature(body, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"{}";
        let header = sign(body, 1_700_000_000, "whsec_other");
        assert_eq!(
            verify_signature(body, &header, SECRET, 1_700_000_000).unwrap_err(),
            SplitPayError::InvalidSignature
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(b"original", 1_700_000_000, SECRET);
        assert!(verify_signature(b"tampered", &header, SECRET, 1_700_000_000).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let body = b"{}";
        let header = sign(body, 1_700_000_000, SECRET);
        let later = 1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(verify_signature(body, &header, SECRET, later).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature(b"{}", "garbage", SECRET, 0).is_err());
        assert!(verify_signature(b"{}", "t=abc,v1=", SECRET, 0).is_err());
        assert!(verify_signature(b"{}", "v1=deadbeef", SECRET, 0).is_err());
    }

    #[test]
    fn test_second_v1_candidate_accepted() {
        // Key-roll deliveries carry one signature per active secret.
        let body = b"{}";
        let good = sign(body, 1_700_000_000, SECRET);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1=badbadbad,v1={good_sig}");
        assert!(verify_signature(body, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn test_parse_intent_succeeded() {
        let body = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;
        assert_eq!(
            parse_event(body).unwrap(),
            ProviderEvent::PaymentIntentSucceeded { intent_id: "pi_123".into() }
        );
    }

    #[test]
    fn test_parse_intent_failed_carries_error() {
        let body = br#"{
            "type":"payment_intent.payment_failed",
            "data":{"object":{
                "id":"pi_9",
                "last_payment_error":{"code":"card_declined","message":"Your card was declined."}
            }}
        }"#;
        assert_eq!(
            parse_event(body).unwrap(),
            ProviderEvent::PaymentIntentFailed {
                intent_id: "pi_9".into(),
                code: Some("card_declined".into()),
                message: Some("Your card was declined.".into()),
            }
        );
    }

    #[test]
    fn test_parse_charge_refunded_collects_refunds() {
        let body = br#"{
            "type":"charge.refunded",
            "data":{"object":{
                "id":"ch_1",
                "payment_intent":"pi_55",
                "refunds":{"data":[
                    {"id":"re_1","status":"succeeded"},
                    {"id":"re_2","status":"failed"}
                ]}
            }}
        }"#;
        let ProviderEvent::ChargeRefunded { intent_id, refunds } = parse_event(body).unwrap()
        else {
            panic!("wrong event variant");
        };
        assert_eq!(intent_id.as_deref(), Some("pi_55"));
        assert_eq!(refunds.len(), 2);
        assert_eq!(refunds[0].refund_id, "re_1");
        assert_eq!(refunds[1].status, "failed");
    }

    #[test]
    fn test_parse_unknown_event_is_unhandled() {
        let body = br#"{"type":"invoice.created","data":{"object":{"id":"in_1"}}}"#;
        assert_eq!(
            parse_event(body).unwrap(),
            ProviderEvent::Unhandled { event_type: "invoice.created".into() }
        );
    }
}
