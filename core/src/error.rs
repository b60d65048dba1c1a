//! Error taxonomy for the split-payment core.
//!
//! Validation failures, not-found lookups, provider declines and
//! infrastructure faults are distinct kinds: the HTTP layer maps each kind
//! to its own status code and client error code, and the orchestrator
//! decides compensation behavior from the kind alone.

use thiserror::Error;

/// Result type alias for split-payment operations.
pub type Result<T> = std::result::Result<T, SplitPayError>;

/// Card details attached to a decline so the widget can highlight the
/// failing card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeclinedCard {
    /// Provider intent ID of the failing payment.
    pub provider_intent_id: String,

    /// Card brand, when known.
    pub brand: Option<String>,

    /// Last four digits, when known.
    pub last_four: Option<String>,

    /// Provider decline code (e.g. `insufficient_funds`).
    pub code: Option<String>,

    /// Provider decline message.
    pub message: String,
}

/// Comprehensive error taxonomy for split-payment orchestration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SplitPayError {
    // ═══════════════════════════════════════════════════════════
    // Client input
    // ═══════════════════════════════════════════════════════════

    /// Request data failed structural validation. Never mutates state.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A required parameter was absent.
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    // ═══════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════

    /// No active store for the shop domain.
    #[error("Store not found")]
    StoreNotFound,

    /// Transaction does not exist.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Payment does not exist.
    #[error("Payment not found")]
    PaymentNotFound,

    /// Session does not exist or has expired server-side.
    #[error("Session not found")]
    SessionNotFound,

    /// Session exists but is past its TTL.
    #[error("Session has expired")]
    SessionExpired,

    // ═══════════════════════════════════════════════════════════
    // Checkout state
    // ═══════════════════════════════════════════════════════════

    /// The checkout token already has a completed transaction.
    #[error("Checkout has already been completed")]
    AlreadyCompleted,

    /// Another `complete()` call owns this transaction.
    #[error("Checkout is already being processed")]
    AlreadyProcessing,

    /// Card count would exceed the store's configured limit.
    #[error("Too many cards: limit is {limit}")]
    TooManyCards {
        /// Effective per-checkout card limit.
        limit: u8,
    },

    /// A status change violated the legal transition set.
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Refund amount exceeds what remains refundable.
    #[error("Refund of {requested} cents exceeds remaining refundable {remaining} cents")]
    RefundExceedsRemaining {
        /// Requested refund amount.
        requested: i64,
        /// Remaining refundable amount.
        remaining: i64,
    },

    // ═══════════════════════════════════════════════════════════
    // Provider outcomes
    // ═══════════════════════════════════════════════════════════

    /// The provider declined a card.
    #[error("Card declined: {}", .0.message)]
    CardDeclined(DeclinedCard),

    /// The provider demanded an interactive challenge (3-D Secure); the
    /// orchestrator fails closed and the widget must resolve it first.
    #[error("Payment requires interactive authentication")]
    InteractiveRequired,

    /// Transient provider fault (network, timeout, 5xx). Retryable.
    #[error("Payment provider unavailable: {0}")]
    ProviderTransient(String),

    /// Terminal provider error (4xx other than a decline).
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// Terminal provider rejection carrying the provider's stable
    /// machine-readable code (e.g. `payment_intent_unexpected_state`).
    ///
    /// Only `code` is a contract; `message` wording is free text and must
    /// never be matched on.
    #[error("Payment provider error: {message}")]
    ProviderRejected {
        /// Stable provider error code, when the provider sent one.
        code: Option<String>,
        /// Human-readable detail (not stable across provider versions).
        message: String,
    },

    /// Webhook signature did not verify.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    // ═══════════════════════════════════════════════════════════
    // Post-capture anomalies
    // ═══════════════════════════════════════════════════════════

    /// Some captures succeeded and some failed; manual reversal needed.
    #[error("Capture failed after authorization: {0}")]
    PartialCapture(String),

    /// Money captured but the platform order could not be created.
    #[error("Order submission failed: {0}")]
    OrderSubmissionFailed(String),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Environment configuration is incomplete or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unclassified internal fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SplitPayError {
    /// Whether this error was caused by bad client input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::MissingParameter(_))
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient(_))
    }

    /// Whether this is a card decline carrying card identifiers.
    #[must_use]
    pub const fn is_decline(&self) -> bool {
        matches!(self, Self::CardDeclined(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        assert!(SplitPayError::Validation("bad".into()).is_validation());
        assert!(SplitPayError::MissingParameter("shop_domain").is_validation());
        assert!(SplitPayError::ProviderTransient("timeout".into()).is_retryable());
        assert!(!SplitPayError::Provider("no such intent".into()).is_retryable());
        assert!(
            !SplitPayError::ProviderRejected {
                code: Some("payment_intent_unexpected_state".into()),
                message: "cannot cancel".into(),
            }
            .is_retryable()
        );
        assert!(
            SplitPayError::CardDeclined(DeclinedCard {
                message: "insufficient funds".into(),
                ..DeclinedCard::default()
            })
            .is_decline()
        );
    }

    #[test]
    fn test_decline_display_uses_provider_message() {
        let err = SplitPayError::CardDeclined(DeclinedCard {
            provider_intent_id: "pi_123".into(),
            message: "Your card was declined.".into(),
            ..DeclinedCard::default()
        });
        assert_eq!(err.to_string(), "Card declined: Your card was declined.");
    }
}
