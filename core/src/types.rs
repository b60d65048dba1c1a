//! Domain records and status machines.
//!
//! Every entity the durable store persists lives here, together with the
//! status enums and their legal transitions. Status strings round-trip
//! through `as_str()`/`parse()` pairs; an unknown string is an error, never
//! a silent default.

use crate::error::{Result, SplitPayError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Store (installed merchant) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub Uuid);

/// Transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

/// Payment (single card charge) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub Uuid);

/// Refund identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefundId(pub Uuid);

/// Checkout-session identifier (opaque, unguessable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

macro_rules! impl_uuid_display {
    ($($id:ident),*) => {
        $(impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        })*
    };
}

impl_uuid_display!(StoreId, TransactionId, PaymentId, RefundId);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════
// Status machines
// ═══════════════════════════════════════════════════════════

/// Transaction lifecycle.
///
/// `pending → processing → (completed | failed)`; from `completed` refunds
/// may move it to `partially_refunded` or `refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created, cards still being added.
    Pending,
    /// A `complete()` call owns this transaction.
    Processing,
    /// All cards captured and an order is assigned (or assignment is in
    /// progress under the post-capture task).
    Completed,
    /// Authorization or capture failed; no money was kept.
    Failed,
    /// Some captured money has been refunded.
    PartiallyRefunded,
    /// The full total has been refunded.
    Refunded,
}

impl TransactionStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded",
        }
    }

    /// Parse a status from its database string.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::InvalidTransition`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "partially_refunded" => Ok(Self::PartiallyRefunded),
            "refunded" => Ok(Self::Refunded),
            other => Err(SplitPayError::InvalidTransition(format!(
                "unknown transaction status '{other}'"
            ))),
        }
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
                | (Self::Completed, Self::PartiallyRefunded | Self::Refunded)
                | (Self::PartiallyRefunded, Self::PartiallyRefunded | Self::Refunded)
        )
    }

    /// Whether refunds may be issued in this state.
    #[must_use]
    pub const fn is_refundable(self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyRefunded)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment (single card) lifecycle.
///
/// `pending → authorized → (captured | voided)`, or `pending → failed`, or
/// `captured → refunded`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Authorization created, not yet confirmed.
    Pending,
    /// The hold is in place; capture or void will follow.
    Authorized,
    /// The charge is final.
    Captured,
    /// The hold was released without charging.
    Voided,
    /// The provider declined or errored the authorization.
    Failed,
    /// Fully refunded after capture.
    Refunded,
}

impl PaymentStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Captured => "captured",
            Self::Voided => "voided",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Parse a status from its database string.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::InvalidTransition`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "authorized" => Ok(Self::Authorized),
            "captured" => Ok(Self::Captured),
            "voided" => Ok(Self::Voided),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(SplitPayError::InvalidTransition(format!(
                "unknown payment status '{other}'"
            ))),
        }
    }

    /// Terminal states are never left once entered.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Captured | Self::Voided | Self::Failed | Self::Refunded)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Re-asserting the current state is allowed everywhere: the reconciler
    /// replays provider events and idempotent re-writes must not error.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        if self as u8 == next as u8 {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Authorized | Self::Failed)
                | (Self::Authorized, Self::Captured | Self::Voided)
                | (Self::Captured, Self::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refund lifecycle as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Submitted, provider outcome unknown.
    Pending,
    /// Money returned to the cardholder.
    Succeeded,
    /// The provider rejected the refund.
    Failed,
}

impl RefundStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parse a status from its database string.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::InvalidTransition`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(SplitPayError::InvalidTransition(format!(
                "unknown refund status '{other}'"
            ))),
        }
    }
}

/// Why a refund was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    /// Duplicate charge.
    Duplicate,
    /// Suspected fraud.
    Fraudulent,
    /// Customer asked for their money back.
    RequestedByCustomer,
}

impl RefundReason {
    /// Database / provider string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Fraudulent => "fraudulent",
            Self::RequestedByCustomer => "requested_by_customer",
        }
    }

    /// Parse a reason from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Validation`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "duplicate" => Ok(Self::Duplicate),
            "fraudulent" => Ok(Self::Fraudulent),
            "requested_by_customer" => Ok(Self::RequestedByCustomer),
            other => Err(SplitPayError::Validation(format!(
                "unknown refund reason '{other}'"
            ))),
        }
    }
}

/// Which actor initiated a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundInitiator {
    /// Merchant admin through the dashboard API.
    Admin,
    /// Provider webhook reconciliation.
    Webhook,
    /// System-initiated (e.g. partial-capture reversal).
    Automatic,
}

impl RefundInitiator {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Webhook => "webhook",
            Self::Automatic => "automatic",
        }
    }

    /// Parse an initiator from its database string.
    ///
    /// # Errors
    ///
    /// Returns [`SplitPayError::Validation`] for unknown strings.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Self::Admin),
            "webhook" => Ok(Self::Webhook),
            "automatic" => Ok(Self::Automatic),
            other => Err(SplitPayError::Validation(format!(
                "unknown refund initiator '{other}'"
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Durable records
// ═══════════════════════════════════════════════════════════

/// Per-merchant settings, persisted as free-form JSON with recognized keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Maximum cards per checkout, clamped to `[2, 5]`.
    #[serde(default = "StoreSettings::default_max_cards")]
    pub max_cards: u8,

    /// Minimum per-card amount in cents, at least 100.
    #[serde(default = "StoreSettings::default_min_amount_cents")]
    pub min_amount_cents: i64,

    /// Unrecognized keys are preserved round-trip.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl StoreSettings {
    const fn default_max_cards() -> u8 {
        5
    }

    const fn default_min_amount_cents() -> i64 {
        100
    }

    /// Effective card limit: the configured value clamped into `[2, 5]`.
    #[must_use]
    pub const fn effective_max_cards(&self) -> u8 {
        if self.max_cards < 2 {
            2
        } else if self.max_cards > 5 {
            5
        } else {
            self.max_cards
        }
    }

    /// Effective per-card minimum: never below 100 cents.
    #[must_use]
    pub const fn effective_min_amount_cents(&self) -> i64 {
        if self.min_amount_cents < 100 {
            100
        } else {
            self.min_amount_cents
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_cards: Self::default_max_cards(),
            min_amount_cents: Self::default_min_amount_cents(),
            extra: HashMap::new(),
        }
    }
}

/// One installed merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    /// Store ID.
    pub id: StoreId,

    /// Merchant shop domain (unique), e.g. `example.myshopify.com`.
    pub shop_domain: String,

    /// Platform access token; encrypted at rest, cleared on uninstall.
    pub access_token: Option<String>,

    /// Merchant settings.
    pub settings: StoreSettings,

    /// Soft-delete flag; inactive stores reject all checkout traffic.
    pub active: bool,

    /// Install timestamp.
    pub installed_at: DateTime<Utc>,

    /// Uninstall timestamp, if the app was removed.
    pub uninstalled_at: Option<DateTime<Utc>>,
}

/// Customer metadata captured with a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerMeta {
    /// Customer email, if the checkout had one.
    pub email: Option<String>,

    /// Client IP address.
    pub ip: Option<String>,

    /// Client user agent.
    pub user_agent: Option<String>,
}

/// One checkout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID.
    pub id: TransactionId,

    /// Owning store.
    pub store_id: StoreId,

    /// Platform checkout token (opaque).
    pub checkout_token: String,

    /// Platform order ID, set after capture-all.
    pub order_id: Option<String>,

    /// Platform order number, set after capture-all.
    pub order_number: Option<String>,

    /// Authoritative checkout total in cents.
    pub total_amount_cents: i64,

    /// ISO-4217 currency code.
    pub currency: String,

    /// Lifecycle status.
    pub status: TransactionStatus,

    /// Human-readable failure reason, when `failed`.
    pub failure_reason: Option<String>,

    /// Client-supplied idempotency key for `complete()` retries.
    pub idempotency_key: Option<String>,

    /// Customer metadata (purged on GDPR redaction).
    pub customer: CustomerMeta,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp (trigger-maintained).
    pub updated_at: DateTime<Utc>,
}

/// One card charge inside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment ID.
    pub id: PaymentId,

    /// Owning transaction.
    pub transaction_id: TransactionId,

    /// Provider intent ID (globally unique).
    pub provider_intent_id: String,

    /// Provider payment-method ID, set at confirm time.
    pub provider_method_id: Option<String>,

    /// Amount in cents this card covers.
    pub amount_cents: i64,

    /// Card brand as reported by the provider.
    pub card_brand: Option<String>,

    /// Last four digits.
    pub card_last_four: Option<String>,

    /// Expiry month.
    pub card_exp_month: Option<i16>,

    /// Expiry year.
    pub card_exp_year: Option<i16>,

    /// Lifecycle status.
    pub status: PaymentStatus,

    /// Provider decline/error code, when failed.
    pub failure_code: Option<String>,

    /// Provider decline/error message, when failed.
    pub failure_message: Option<String>,

    /// When the hold was confirmed.
    pub authorized_at: Option<DateTime<Utc>>,

    /// When the hold was captured.
    pub captured_at: Option<DateTime<Utc>>,

    /// When the hold was released.
    pub voided_at: Option<DateTime<Utc>>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp (trigger-maintained).
    pub updated_at: DateTime<Utc>,
}

/// One partial refund against one payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    /// Refund ID.
    pub id: RefundId,

    /// Owning transaction.
    pub transaction_id: TransactionId,

    /// The payment this refund draws from.
    pub payment_id: PaymentId,

    /// Provider refund ID (globally unique), when the provider accepted it.
    pub provider_refund_id: Option<String>,

    /// Refunded amount in cents.
    pub amount_cents: i64,

    /// Why the refund was issued.
    pub reason: RefundReason,

    /// Provider-reported status.
    pub status: RefundStatus,

    /// Which actor initiated it.
    pub initiated_by: RefundInitiator,

    /// Failure detail, when the provider rejected the refund.
    pub failure_reason: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last update timestamp (trigger-maintained).
    pub updated_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════
// Ephemeral session
// ═══════════════════════════════════════════════════════════

/// A pending card authorization tracked inside a checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayment {
    /// The durable payment row.
    pub payment_id: PaymentId,

    /// Provider intent ID.
    pub provider_intent_id: String,

    /// Amount in cents.
    pub amount_cents: i64,
}

/// Short-lived record coordinating one widget lifecycle.
///
/// Lives only in the session cache; losing it aborts an in-flight checkout
/// but never loses captured money (the durable rows are the record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Unguessable session ID.
    pub session_id: SessionId,

    /// The transaction being assembled.
    pub transaction_id: TransactionId,

    /// Owning shop domain.
    pub shop_domain: String,

    /// Platform checkout token.
    pub checkout_token: String,

    /// Cards added so far.
    pub payments: Vec<SessionPayment>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Hard expiry, 30 minutes after creation.
    pub expires_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Whether the session is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Cents already allocated to cards in this session.
    #[must_use]
    pub fn allocated_cents(&self) -> i64 {
        self.payments.iter().map(|p| p.amount_cents).sum()
    }

    /// Cents still unallocated against the transaction total.
    #[must_use]
    pub fn remaining_cents(&self, total_amount_cents: i64) -> i64 {
        total_amount_cents - self.allocated_cents()
    }

    /// Find a session payment by provider intent ID.
    #[must_use]
    pub fn payment_by_intent(&self, provider_intent_id: &str) -> Option<&SessionPayment> {
        self.payments
            .iter()
            .find(|p| p.provider_intent_id == provider_intent_id)
    }
}

// ═══════════════════════════════════════════════════════════
// Query envelopes
// ═══════════════════════════════════════════════════════════

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page.
    pub items: Vec<T>,

    /// Total matching rows.
    pub total: i64,

    /// 1-based page number.
    pub page: i64,

    /// Total page count.
    pub pages: i64,
}

impl<T> Page<T> {
    /// Build a page envelope from a row window and the total count.
    #[must_use]
    pub fn new(items: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        let pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        Self { items, total, page, pages }
    }
}

/// Filters for the admin transaction listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    /// Restrict to one store.
    pub store_id: Option<StoreId>,

    /// Restrict to one status.
    pub status: Option<TransactionStatus>,

    /// Created at or after.
    pub start_date: Option<DateTime<Utc>>,

    /// Created at or before.
    pub end_date: Option<DateTime<Utc>>,

    /// 1-based page number (default 1).
    pub page: i64,

    /// Page size (default 20, capped at 100).
    pub limit: i64,
}

impl TransactionFilter {
    /// Normalized page number (at least 1).
    #[must_use]
    pub const fn page_or_default(&self) -> i64 {
        if self.page < 1 { 1 } else { self.page }
    }

    /// Normalized page size (1..=100, default 20).
    #[must_use]
    pub const fn limit_or_default(&self) -> i64 {
        if self.limit < 1 {
            20
        } else if self.limit > 100 {
            100
        } else {
            self.limit
        }
    }
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// All transactions ever created for the store.
    pub total_transactions: i64,

    /// Transactions that reached `completed` (including later refunds).
    pub completed_transactions: i64,

    /// Transactions that ended `failed`.
    pub failed_transactions: i64,

    /// Cents captured across completed transactions.
    pub total_captured_cents: i64,

    /// Cents successfully refunded.
    pub total_refunded_cents: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn test_transaction_status_round_trip() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Processing,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::PartiallyRefunded,
            TransactionStatus::Refunded,
        ] {
            assert_eq!(TransactionStatus::parse(status.as_str()).ok(), Some(status));
        }
        assert!(TransactionStatus::parse("sideways").is_err());
    }

    #[test]
    fn test_transaction_transitions() {
        use TransactionStatus as T;
        assert!(T::Pending.can_transition_to(T::Processing));
        assert!(T::Processing.can_transition_to(T::Completed));
        assert!(T::Processing.can_transition_to(T::Failed));
        assert!(T::Completed.can_transition_to(T::PartiallyRefunded));
        assert!(T::PartiallyRefunded.can_transition_to(T::Refunded));
        assert!(!T::Pending.can_transition_to(T::Completed));
        assert!(!T::Failed.can_transition_to(T::Processing));
        assert!(!T::Refunded.can_transition_to(T::PartiallyRefunded));
    }

    #[test]
    fn test_payment_transitions_no_regression() {
        use PaymentStatus as P;
        assert!(P::Pending.can_transition_to(P::Authorized));
        assert!(P::Pending.can_transition_to(P::Failed));
        assert!(P::Authorized.can_transition_to(P::Captured));
        assert!(P::Authorized.can_transition_to(P::Voided));
        assert!(P::Captured.can_transition_to(P::Refunded));
        // Idempotent re-assertion is fine.
        assert!(P::Captured.can_transition_to(P::Captured));
        // Regressions are not.
        assert!(!P::Captured.can_transition_to(P::Authorized));
        assert!(!P::Captured.can_transition_to(P::Pending));
        assert!(!P::Voided.can_transition_to(P::Authorized));
        assert!(!P::Failed.can_transition_to(P::Authorized));
        assert!(!P::Authorized.can_transition_to(P::Pending));
    }

    #[test]
    fn test_payment_terminal_states() {
        use PaymentStatus as P;
        for status in [P::Captured, P::Voided, P::Failed, P::Refunded] {
            assert!(status.is_terminal());
        }
        assert!(!P::Pending.is_terminal());
        assert!(!P::Authorized.is_terminal());
    }

    #[test]
    fn test_store_settings_defaults_and_clamps() {
        let settings = StoreSettings::default();
        assert_eq!(settings.effective_max_cards(), 5);
        assert_eq!(settings.effective_min_amount_cents(), 100);

        let settings = StoreSettings { max_cards: 9, min_amount_cents: 1, ..StoreSettings::default() };
        assert_eq!(settings.effective_max_cards(), 5);
        assert_eq!(settings.effective_min_amount_cents(), 100);

        let settings = StoreSettings { max_cards: 1, ..StoreSettings::default() };
        assert_eq!(settings.effective_max_cards(), 2);
    }

    #[test]
    fn test_store_settings_preserves_unknown_keys() {
        let json = r#"{"max_cards": 3, "theme": "dark"}"#;
        let settings: StoreSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.max_cards, 3);
        assert_eq!(settings.min_amount_cents, 100);
        assert_eq!(settings.extra["theme"], serde_json::json!("dark"));
    }

    #[test]
    fn test_session_balance_accounting() {
        let now = Utc::now();
        let session = CheckoutSession {
            session_id: SessionId("s".into()),
            transaction_id: TransactionId(Uuid::new_v4()),
            shop_domain: "x.myshopify.com".into(),
            checkout_token: "t".into(),
            payments: vec![
                SessionPayment {
                    payment_id: PaymentId(Uuid::new_v4()),
                    provider_intent_id: "pi_a".into(),
                    amount_cents: 10000,
                },
                SessionPayment {
                    payment_id: PaymentId(Uuid::new_v4()),
                    provider_intent_id: "pi_b".into(),
                    amount_cents: 2500,
                },
            ],
            created_at: now,
            expires_at: now + chrono::Duration::minutes(30),
        };
        assert_eq!(session.allocated_cents(), 12500);
        assert_eq!(session.remaining_cents(15000), 2500);
        assert!(session.payment_by_intent("pi_b").is_some());
        assert!(session.payment_by_intent("pi_c").is_none());
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + chrono::Duration::minutes(31)));
    }

    #[test]
    fn test_page_math() {
        let page = Page::new(vec![1, 2, 3], 47, 2, 20);
        assert_eq!(page.pages, 3);
        let empty: Page<i32> = Page::new(vec![], 0, 1, 20);
        assert_eq!(empty.pages, 0);
    }

    #[test]
    fn test_filter_normalization() {
        let filter = TransactionFilter { page: 0, limit: 500, ..TransactionFilter::default() };
        assert_eq!(filter.page_or_default(), 1);
        assert_eq!(filter.limit_or_default(), 100);
        let filter = TransactionFilter::default();
        assert_eq!(filter.limit_or_default(), 20);
    }
}
