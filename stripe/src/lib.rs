//! Payment-provider adapter.
//!
//! Thin boundary to the external card provider: create / confirm / capture /
//! cancel authorizations, create refunds, verify webhook signatures. Every
//! authorization is created with **manual capture** (a hold, not a charge)
//! so the orchestrator can release all sibling holds when any card
//! in a split fails.
//!
//! Provider payloads are weakly typed JSON; this crate parses them into
//! narrow structs at the boundary and rejects unknown status strings
//! explicitly rather than mapping them silently.

mod gateway;
mod webhook;

pub use gateway::{StripeGateway, STRIPE_API_BASE};
pub use webhook::{verify_signature, RefundUpdate, SIGNATURE_TOLERANCE_SECS};

use splitpay_core::Result;
use splitpay_core::error::SplitPayError;
use splitpay_core::types::{RefundReason, RefundStatus, TransactionId};

/// Provider-side state of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    /// Created, no payment method attached yet.
    RequiresPaymentMethod,
    /// Method attached, confirm not called.
    RequiresConfirmation,
    /// Interactive challenge (3-D Secure) outstanding.
    RequiresAction,
    /// Provider-side processing in flight.
    Processing,
    /// The hold is in place, awaiting manual capture.
    RequiresCapture,
    /// Captured (or auto-completed).
    Succeeded,
    /// The intent was canceled.
    Canceled,
}

impl IntentStatus {
    /// Parse a provider status string, rejecting unknown values.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Provider`] for status strings this
    /// integration does not know.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "requires_payment_method" => Ok(Self::RequiresPaymentMethod),
            "requires_confirmation" => Ok(Self::RequiresConfirmation),
            "requires_action" => Ok(Self::RequiresAction),
            "processing" => Ok(Self::Processing),
            "requires_capture" => Ok(Self::RequiresCapture),
            "succeeded" => Ok(Self::Succeeded),
            "canceled" => Ok(Self::Canceled),
            other => Err(SplitPayError::Provider(format!(
                "unknown payment intent status '{other}'"
            ))),
        }
    }

    /// Whether this state counts as a successful authorization.
    #[must_use]
    pub const fn is_authorized(self) -> bool {
        matches!(self, Self::RequiresCapture | Self::Succeeded)
    }
}

/// Result of creating an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAuthorization {
    /// Provider intent ID.
    pub intent_id: String,

    /// Client secret the browser uses to collect card data directly from
    /// the provider (the PAN never crosses this system).
    pub client_secret: String,

    /// Initial intent status.
    pub status: IntentStatus,
}

/// Card fields reported by the provider at confirm time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmedCard {
    /// Payment-method ID used.
    pub method_id: Option<String>,

    /// Card brand.
    pub brand: Option<String>,

    /// Last four digits.
    pub last_four: Option<String>,

    /// Expiry month.
    pub exp_month: Option<i16>,

    /// Expiry year.
    pub exp_year: Option<i16>,
}

/// Result of confirming an authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedAuthorization {
    /// Provider intent ID.
    pub intent_id: String,

    /// Status after confirmation.
    pub status: IntentStatus,

    /// Card details, when the provider reported them.
    pub card: ConfirmedCard,
}

/// Result of creating a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRefund {
    /// Provider refund ID.
    pub refund_id: String,

    /// Provider-reported refund status.
    pub status: RefundStatus,
}

/// Metadata attached to a provider authorization, for cross-referencing
/// from the provider dashboard back to local records.
#[derive(Debug, Clone)]
pub struct AuthorizationMetadata {
    /// Local transaction the card belongs to.
    pub transaction_id: TransactionId,

    /// Zero-based card position inside the split.
    pub card_index: usize,
}

/// Events this integration consumes from the provider webhook feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// An intent completed capture.
    PaymentIntentSucceeded {
        /// Provider intent ID.
        intent_id: String,
    },

    /// An intent failed payment.
    PaymentIntentFailed {
        /// Provider intent ID.
        intent_id: String,
        /// Provider error code.
        code: Option<String>,
        /// Provider error message.
        message: Option<String>,
    },

    /// A charge was (partially) refunded; carries per-refund updates.
    ChargeRefunded {
        /// Provider intent ID the charge belongs to.
        intent_id: Option<String>,
        /// Refund rows reported on the charge.
        refunds: Vec<RefundUpdate>,
    },

    /// A dispute was opened. Logged and flagged, no state change.
    DisputeCreated {
        /// Provider charge ID.
        charge_id: String,
        /// Dispute reason, when given.
        reason: Option<String>,
    },

    /// Any event type this integration does not act on.
    Unhandled {
        /// The raw event type string.
        event_type: String,
    },
}

/// Boundary to the external card provider.
///
/// All network operations carry their own ≈30 s timeout and are retried at
/// most twice on transient faults; 4xx provider errors are never retried.
pub trait PaymentProvider: Send + Sync {
    /// Create a manual-capture authorization for `amount_cents`.
    fn create_authorization(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &AuthorizationMetadata,
    ) -> impl Future<Output = Result<CreatedAuthorization>> + Send;

    /// Fetch the current provider-side status of an intent.
    fn retrieve_authorization(
        &self,
        intent_id: &str,
    ) -> impl Future<Output = Result<IntentStatus>> + Send;

    /// Confirm an authorization with a payment method.
    ///
    /// `requires_capture` and `succeeded` are the success states;
    /// `requires_action` is reported as
    /// [`SplitPayError::InteractiveRequired`] (fail closed), declines as
    /// [`SplitPayError::CardDeclined`].
    fn confirm_authorization(
        &self,
        intent_id: &str,
        method_id: &str,
    ) -> impl Future<Output = Result<ConfirmedAuthorization>> + Send;

    /// Capture a held authorization.
    fn capture_authorization(
        &self,
        intent_id: &str,
    ) -> impl Future<Output = Result<IntentStatus>> + Send;

    /// Release a hold. Idempotent: the provider error meaning "already in a
    /// final state" is treated as success.
    fn cancel_authorization(&self, intent_id: &str)
    -> impl Future<Output = Result<()>> + Send;

    /// Create a (partial) refund against a captured intent.
    fn create_refund(
        &self,
        intent_id: &str,
        amount_cents: i64,
        reason: RefundReason,
        transaction_id: TransactionId,
    ) -> impl Future<Output = Result<CreatedRefund>> + Send;

    /// Verify a webhook payload's signature and parse the event.
    ///
    /// CPU-only (constant-time HMAC comparison); invalid signatures are
    /// [`SplitPayError::InvalidSignature`] and must cause a 401 without any
    /// state change.
    fn verify_webhook(&self, raw_body: &[u8], signature_header: &str) -> Result<ProviderEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_status_parse() {
        assert_eq!(
            IntentStatus::parse("requires_capture").ok(),
            Some(IntentStatus::RequiresCapture)
        );
        assert_eq!(IntentStatus::parse("succeeded").ok(), Some(IntentStatus::Succeeded));
        assert!(IntentStatus::parse("on_hold_forever").is_err());
    }

    #[test]
    fn test_authorized_states() {
        assert!(IntentStatus::RequiresCapture.is_authorized());
        assert!(IntentStatus::Succeeded.is_authorized());
        assert!(!IntentStatus::RequiresAction.is_authorized());
        assert!(!IntentStatus::Canceled.is_authorized());
        assert!(!IntentStatus::Processing.is_authorized());
    }
}
