//! The durable-store query surface.
//!
//! [`Repository`] is the finite set of named operations the orchestrator,
//! reconciler and admin surface are allowed to perform. The production
//! implementation lives in `splitpay-postgres`; tests use the in-memory
//! implementation from `splitpay-testing`. Each method is atomic: compound
//! writes (find-or-create, guarded status transitions, completion checks)
//! happen inside one database transaction in the implementation.

use crate::error::Result;
use crate::types::{
    CustomerMeta, Page, Payment, PaymentId, Refund, RefundId, RefundInitiator, RefundReason,
    RefundStatus, Store, StoreId, StoreSettings, StoreStats, Transaction, TransactionFilter,
    TransactionId, TransactionStatus,
};

/// Inputs for creating a store row.
#[derive(Debug, Clone)]
pub struct NewStore {
    /// Merchant shop domain.
    pub shop_domain: String,

    /// Platform access token.
    pub access_token: String,

    /// Initial settings (defaults if the merchant never configured any).
    pub settings: StoreSettings,
}

/// Inputs for creating a transaction row.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Owning store.
    pub store_id: StoreId,

    /// Platform checkout token.
    pub checkout_token: String,

    /// Authoritative checkout total in cents.
    pub total_amount_cents: i64,

    /// ISO-4217 currency code.
    pub currency: String,

    /// Customer metadata.
    pub customer: CustomerMeta,
}

/// Inputs for creating a payment row.
#[derive(Debug, Clone)]
pub struct NewPayment {
    /// Owning transaction.
    pub transaction_id: TransactionId,

    /// Provider intent ID (globally unique).
    pub provider_intent_id: String,

    /// Amount in cents.
    pub amount_cents: i64,
}

/// Card fields learned from the provider at confirm time.
#[derive(Debug, Clone, Default)]
pub struct CardDetails {
    /// Provider payment-method ID.
    pub provider_method_id: Option<String>,

    /// Card brand.
    pub brand: Option<String>,

    /// Last four digits.
    pub last_four: Option<String>,

    /// Expiry month.
    pub exp_month: Option<i16>,

    /// Expiry year.
    pub exp_year: Option<i16>,
}

/// Inputs for creating a refund row.
#[derive(Debug, Clone)]
pub struct NewRefund {
    /// Owning transaction.
    pub transaction_id: TransactionId,

    /// The payment refunded against.
    pub payment_id: PaymentId,

    /// Provider refund ID, when the provider accepted the refund.
    pub provider_refund_id: Option<String>,

    /// Amount in cents.
    pub amount_cents: i64,

    /// Refund reason.
    pub reason: RefundReason,

    /// Provider-reported status at creation.
    pub status: RefundStatus,

    /// Initiating actor.
    pub initiated_by: RefundInitiator,

    /// Failure detail when the provider rejected the refund outright.
    pub failure_reason: Option<String>,
}

/// Named operations over the durable store.
///
/// Status-mutating payment operations enforce the legal transition set
/// ([`crate::types::PaymentStatus::can_transition_to`]): an illegal
/// transition is an error, an idempotent re-assertion is a no-op success.
pub trait Repository: Send + Sync {
    // ── Stores ─────────────────────────────────────────────────

    /// Insert a store (fresh install).
    fn create_store(
        &self, new: NewStore
    ) -> impl Future<Output = Result<Store>> + Send;

    /// Fetch a store by ID.
    fn store_by_id(
        &self, id: StoreId
    ) -> impl Future<Output = Result<Option<Store>>> + Send;

    /// Fetch a store by shop domain.
    fn store_by_domain(
        &self, shop_domain: &str
    ) -> impl Future<Output = Result<Option<Store>>> + Send;

    /// Reinstall: reactivate and replace the access token.
    fn reactivate_store(
        &self, id: StoreId, access_token: &str
    ) -> impl Future<Output = Result<Store>> + Send;

    /// Uninstall: flag inactive, clear the token, stamp `uninstalled_at`.
    fn deactivate_store(
        &self, id: StoreId
    ) -> impl Future<Output = Result<()>> + Send;

    /// Replace a store's settings.
    fn update_store_settings(
        &self, id: StoreId, settings: &StoreSettings
    ) -> impl Future<Output = Result<Store>> + Send;

    /// List stores, newest installs first.
    fn list_stores(
        &self, page: i64, limit: i64
    ) -> impl Future<Output = Result<Page<Store>>> + Send;

    // ── Transactions ───────────────────────────────────────────

    /// Insert a transaction in `pending`.
    fn create_transaction(
        &self, new: NewTransaction
    ) -> impl Future<Output = Result<Transaction>> + Send;

    /// Fetch a transaction by ID.
    fn transaction(
        &self, id: TransactionId
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send;

    /// Newest `pending` transaction for `(store, checkout_token)`.
    fn latest_pending_transaction(
        &self,
        store_id: StoreId,
        checkout_token: &str,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send;

    /// Any `completed` (or later) transaction for `(store, checkout_token)`.
    fn completed_transaction(
        &self,
        store_id: StoreId,
        checkout_token: &str,
    ) -> impl Future<Output = Result<Option<Transaction>>> + Send;

    /// Compare-and-set `pending → processing`.
    ///
    /// Returns `false` when the row was not in `pending`: a concurrent
    /// `complete()` owns the transaction and the caller must back off.
    fn mark_processing(
        &self, id: TransactionId
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Record the idempotency key a `complete()` call carried.
    fn set_idempotency_key(
        &self, id: TransactionId, key: &str
    ) -> impl Future<Output = Result<()>> + Send;

    /// Move a `processing` transaction to `failed` with a reason.
    fn fail_transaction(
        &self, id: TransactionId, reason: &str
    ) -> impl Future<Output = Result<()>> + Send;

    /// Move a `processing` transaction to `completed`.
    ///
    /// The implementation verifies, in the same transaction as the update,
    /// that at least two payments exist, that every payment is `captured`,
    /// and that captured amounts sum exactly to the transaction total.
    fn complete_transaction(
        &self, id: TransactionId
    ) -> impl Future<Output = Result<()>> + Send;

    /// Write the platform order ids after submission.
    fn set_transaction_order(
        &self,
        id: TransactionId,
        order_id: &str,
        order_number: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Advance a refundable transaction to `partially_refunded`/`refunded`.
    fn set_transaction_refund_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Admin listing with filters and pagination, newest first.
    fn list_transactions(
        &self, filter: &TransactionFilter
    ) -> impl Future<Output = Result<Page<Transaction>>> + Send;

    /// `completed` transactions with no order assigned (crash-repair scan).
    fn transactions_missing_orders(
        &self
    ) -> impl Future<Output = Result<Vec<Transaction>>> + Send;

    /// GDPR redaction: null out customer PII on a store's transactions.
    ///
    /// Returns the number of rows touched.
    fn purge_customer_pii(
        &self, store_id: StoreId
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Aggregate counters for the admin dashboard.
    fn store_stats(
        &self, store_id: StoreId
    ) -> impl Future<Output = Result<StoreStats>> + Send;

    // ── Payments ───────────────────────────────────────────────

    /// Insert a payment in `pending`.
    fn create_payment(
        &self, new: NewPayment
    ) -> impl Future<Output = Result<Payment>> + Send;

    /// Fetch a payment by ID.
    fn payment(
        &self, id: PaymentId
    ) -> impl Future<Output = Result<Option<Payment>>> + Send;

    /// Fetch a payment by provider intent ID.
    fn payment_by_intent(
        &self, provider_intent_id: &str
    ) -> impl Future<Output = Result<Option<Payment>>> + Send;

    /// All payments of a transaction, oldest first.
    fn payments_for_transaction(
        &self, id: TransactionId
    ) -> impl Future<Output = Result<Vec<Payment>>> + Send;

    /// `pending → authorized`, stamping `authorized_at`.
    fn mark_payment_authorized(
        &self, id: PaymentId
    ) -> impl Future<Output = Result<()>> + Send;

    /// `authorized → captured`, stamping `captured_at`.
    fn mark_payment_captured(
        &self, id: PaymentId
    ) -> impl Future<Output = Result<()>> + Send;

    /// `authorized → voided`, stamping `voided_at`.
    fn mark_payment_voided(
        &self, id: PaymentId
    ) -> impl Future<Output = Result<()>> + Send;

    /// `pending → failed` with the provider's code and message.
    fn mark_payment_failed(
        &self,
        id: PaymentId,
        code: Option<&str>,
        message: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// `captured → refunded` once refunds cover the full amount.
    fn mark_payment_refunded(
        &self, id: PaymentId
    ) -> impl Future<Output = Result<()>> + Send;

    /// Record card fields learned at confirm time.
    fn set_payment_card_details(
        &self, id: PaymentId, details: &CardDetails
    ) -> impl Future<Output = Result<()>> + Send;

    // ── Refunds ────────────────────────────────────────────────

    /// Insert a refund row.
    fn create_refund(
        &self, new: NewRefund
    ) -> impl Future<Output = Result<Refund>> + Send;

    /// Fetch a refund by provider refund ID.
    fn refund_by_provider_id(
        &self, provider_refund_id: &str
    ) -> impl Future<Output = Result<Option<Refund>>> + Send;

    /// Update a refund's provider-reported status.
    fn set_refund_status(
        &self,
        id: RefundId,
        status: RefundStatus,
        failure_reason: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Sum of `succeeded` refund amounts for a transaction.
    fn refunded_total(
        &self, transaction_id: TransactionId
    ) -> impl Future<Output = Result<i64>> + Send;

    /// All refunds of a transaction, oldest first.
    fn refunds_for_transaction(
        &self, id: TransactionId
    ) -> impl Future<Output = Result<Vec<Refund>>> + Send;
}
