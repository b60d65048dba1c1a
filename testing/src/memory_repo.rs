//! In-memory repository with the production store's semantics.
//!
//! Enforces the same uniqueness, status-transition and completion-invariant
//! rules as the `PostgreSQL` implementation so orchestrator tests exercise
//! real store behavior without a database.

use chrono::Utc;
use splitpay_core::error::SplitPayError;
use splitpay_core::repository::{
    CardDetails, NewPayment, NewRefund, NewStore, NewTransaction, Repository,
};
use splitpay_core::types::{
    CustomerMeta, Page, Payment, PaymentId, PaymentStatus, Refund, RefundId, RefundStatus, Store,
    StoreId, StoreSettings, StoreStats, Transaction, TransactionFilter, TransactionId,
    TransactionStatus,
};
use splitpay_core::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    stores: HashMap<StoreId, Store>,
    transactions: HashMap<TransactionId, Transaction>,
    payments: HashMap<PaymentId, Payment>,
    refunds: HashMap<RefundId, Refund>,
}

/// In-memory [`Repository`] for tests.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

impl InMemoryRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::unwrap_used)] // Poisoned lock means a test already failed
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

impl Repository for InMemoryRepository {
    async fn create_store(&self, new: NewStore) -> Result<Store> {
        let mut inner = self.lock();
        if inner.stores.values().any(|s| s.shop_domain == new.shop_domain) {
            return Err(SplitPayError::Database(format!(
                "duplicate shop_domain {}",
                new.shop_domain
            )));
        }
        let store = Store {
            id: StoreId(Uuid::new_v4()),
            shop_domain: new.shop_domain,
            access_token: Some(new.access_token),
            settings: new.settings,
            active: true,
            installed_at: Utc::now(),
            uninstalled_at: None,
        };
        inner.stores.insert(store.id, store.clone());
        Ok(store)
    }

    async fn store_by_id(&self, id: StoreId) -> Result<Option<Store>> {
        Ok(self.lock().stores.get(&id).cloned())
    }

    async fn store_by_domain(&self, shop_domain: &str) -> Result<Option<Store>> {
        Ok(self
            .lock()
            .stores
            .values()
            .find(|s| s.shop_domain == shop_domain)
            .cloned())
    }

    async fn reactivate_store(&self, id: StoreId, access_token: &str) -> Result<Store> {
        let mut inner = self.lock();
        let store = inner
            .stores
            .get_mut(&id)
            .ok_or(SplitPayError::StoreNotFound)?;
        store.active = true;
        store.access_token = Some(access_token.to_string());
        store.uninstalled_at = None;
        Ok(store.clone())
    }

    async fn deactivate_store(&self, id: StoreId) -> Result<()> {
        let mut inner = self.lock();
        let store = inner
            .stores
            .get_mut(&id)
            .ok_or(SplitPayError::StoreNotFound)?;
        store.active = false;
        store.access_token = None;
        store.uninstalled_at = Some(Utc::now());
        Ok(())
    }

    async fn update_store_settings(
        &self,
        id: StoreId,
        settings: &StoreSettings,
    ) -> Result<Store> {
        let mut inner = self.lock();
        let store = inner
            .stores
            .get_mut(&id)
            .ok_or(SplitPayError::StoreNotFound)?;
        store.settings = settings.clone();
        Ok(store.clone())
    }

    async fn list_stores(&self, page: i64, limit: i64) -> Result<Page<Store>> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let inner = self.lock();
        let mut stores: Vec<Store> = inner.stores.values().cloned().collect();
        stores.sort_by(|a, b| b.installed_at.cmp(&a.installed_at));
        let total = i64::try_from(stores.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from((page - 1) * limit).unwrap_or(usize::MAX);
        let items = stores
            .into_iter()
            .skip(offset)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok(Page::new(items, total, page, limit))
    }

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction> {
        let now = Utc::now();
        let transaction = Transaction {
            id: TransactionId(Uuid::new_v4()),
            store_id: new.store_id,
            checkout_token: new.checkout_token,
            order_id: None,
            order_number: None,
            total_amount_cents: new.total_amount_cents,
            currency: new.currency,
            status: TransactionStatus::Pending,
            failure_reason: None,
            idempotency_key: None,
            customer: new.customer,
            created_at: now,
            updated_at: now,
        };
        self.lock()
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.lock().transactions.get(&id).cloned())
    }

    async fn latest_pending_transaction(
        &self,
        store_id: StoreId,
        checkout_token: &str,
    ) -> Result<Option<Transaction>> {
        let inner = self.lock();
        Ok(inner
            .transactions
            .values()
            .filter(|t| {
                t.store_id == store_id
                    && t.checkout_token == checkout_token
                    && t.status == TransactionStatus::Pending
            })
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn completed_transaction(
        &self,
        store_id: StoreId,
        checkout_token: &str,
    ) -> Result<Option<Transaction>> {
        let inner = self.lock();
        Ok(inner
            .transactions
            .values()
            .filter(|t| {
                t.store_id == store_id
                    && t.checkout_token == checkout_token
                    && matches!(
                        t.status,
                        TransactionStatus::Completed
                            | TransactionStatus::PartiallyRefunded
                            | TransactionStatus::Refunded
                    )
            })
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn mark_processing(&self, id: TransactionId) -> Result<bool> {
        let mut inner = self.lock();
        let Some(transaction) = inner.transactions.get_mut(&id) else {
            return Ok(false);
        };
        if transaction.status != TransactionStatus::Pending {
            return Ok(false);
        }
        transaction.status = TransactionStatus::Processing;
        transaction.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_idempotency_key(&self, id: TransactionId, key: &str) -> Result<()> {
        let mut inner = self.lock();
        let transaction = inner
            .transactions
            .get_mut(&id)
            .ok_or(SplitPayError::TransactionNotFound)?;
        transaction.idempotency_key = Some(key.to_string());
        Ok(())
    }

    async fn fail_transaction(&self, id: TransactionId, reason: &str) -> Result<()> {
        let mut inner = self.lock();
        let transaction = inner
            .transactions
            .get_mut(&id)
            .ok_or(SplitPayError::TransactionNotFound)?;
        if !matches!(
            transaction.status,
            TransactionStatus::Pending | TransactionStatus::Processing
        ) {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} cannot move to failed"
            )));
        }
        transaction.status = TransactionStatus::Failed;
        transaction.failure_reason = Some(reason.to_string());
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn complete_transaction(&self, id: TransactionId) -> Result<()> {
        let mut inner = self.lock();
        let payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| p.transaction_id == id)
            .cloned()
            .collect();
        let transaction = inner
            .transactions
            .get_mut(&id)
            .ok_or(SplitPayError::TransactionNotFound)?;

        if transaction.status != TransactionStatus::Processing {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} is {}, not processing",
                transaction.status
            )));
        }

        let captured: Vec<&Payment> = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Captured)
            .collect();
        let captured_sum: i64 = captured.iter().map(|p| p.amount_cents).sum();
        if captured.len() < 2
            || captured.len() != payments.len()
            || captured_sum != transaction.total_amount_cents
        {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} cannot complete: {}/{} captured, {captured_sum} of {} cents",
                captured.len(),
                payments.len(),
                transaction.total_amount_cents
            )));
        }

        transaction.status = TransactionStatus::Completed;
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn set_transaction_order(
        &self,
        id: TransactionId,
        order_id: &str,
        order_number: &str,
    ) -> Result<()> {
        let mut inner = self.lock();
        let transaction = inner
            .transactions
            .get_mut(&id)
            .ok_or(SplitPayError::TransactionNotFound)?;
        transaction.order_id = Some(order_id.to_string());
        transaction.order_number = Some(order_number.to_string());
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn set_transaction_refund_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<()> {
        let mut inner = self.lock();
        let transaction = inner
            .transactions
            .get_mut(&id)
            .ok_or(SplitPayError::TransactionNotFound)?;
        if !transaction.status.can_transition_to(status) {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id}: {} -> {status} is not allowed",
                transaction.status
            )));
        }
        transaction.status = status;
        transaction.updated_at = Utc::now();
        Ok(())
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Page<Transaction>> {
        let page = filter.page_or_default();
        let limit = filter.limit_or_default();
        let inner = self.lock();
        let mut matching: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| filter.store_id.is_none_or(|id| t.store_id == id))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.start_date.is_none_or(|d| t.created_at >= d))
            .filter(|t| filter.end_date.is_none_or(|d| t.created_at <= d))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);
        let offset = usize::try_from((page - 1) * limit).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();
        Ok(Page::new(items, total, page, limit))
    }

    async fn transactions_missing_orders(&self) -> Result<Vec<Transaction>> {
        let inner = self.lock();
        let mut stranded: Vec<Transaction> = inner
            .transactions
            .values()
            .filter(|t| t.status == TransactionStatus::Completed && t.order_id.is_none())
            .cloned()
            .collect();
        stranded.sort_by_key(|t| t.created_at);
        Ok(stranded)
    }

    async fn purge_customer_pii(&self, store_id: StoreId) -> Result<u64> {
        let mut inner = self.lock();
        let mut purged = 0;
        for transaction in inner
            .transactions
            .values_mut()
            .filter(|t| t.store_id == store_id)
        {
            if transaction.customer != CustomerMeta::default() {
                transaction.customer = CustomerMeta::default();
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn store_stats(&self, store_id: StoreId) -> Result<StoreStats> {
        let inner = self.lock();
        let mut stats = StoreStats::default();
        for transaction in inner.transactions.values().filter(|t| t.store_id == store_id) {
            stats.total_transactions += 1;
            match transaction.status {
                TransactionStatus::Completed
                | TransactionStatus::PartiallyRefunded
                | TransactionStatus::Refunded => {
                    stats.completed_transactions += 1;
                    stats.total_captured_cents += transaction.total_amount_cents;
                }
                TransactionStatus::Failed => stats.failed_transactions += 1,
                TransactionStatus::Pending | TransactionStatus::Processing => {}
            }
        }
        for refund in inner.refunds.values() {
            if refund.status == RefundStatus::Succeeded
                && inner
                    .transactions
                    .get(&refund.transaction_id)
                    .is_some_and(|t| t.store_id == store_id)
            {
                stats.total_refunded_cents += refund.amount_cents;
            }
        }
        Ok(stats)
    }

    async fn create_payment(&self, new: NewPayment) -> Result<Payment> {
        let mut inner = self.lock();
        if inner
            .payments
            .values()
            .any(|p| p.provider_intent_id == new.provider_intent_id)
        {
            return Err(SplitPayError::Database(format!(
                "duplicate provider_intent_id {}",
                new.provider_intent_id
            )));
        }
        let now = Utc::now();
        let payment = Payment {
            id: PaymentId(Uuid::new_v4()),
            transaction_id: new.transaction_id,
            provider_intent_id: new.provider_intent_id,
            provider_method_id: None,
            amount_cents: new.amount_cents,
            card_brand: None,
            card_last_four: None,
            card_exp_month: None,
            card_exp_year: None,
            status: PaymentStatus::Pending,
            failure_code: None,
            failure_message: None,
            authorized_at: None,
            captured_at: None,
            voided_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.lock().payments.get(&id).cloned())
    }

    async fn payment_by_intent(&self, provider_intent_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .values()
            .find(|p| p.provider_intent_id == provider_intent_id)
            .cloned())
    }

    async fn payments_for_transaction(&self, id: TransactionId) -> Result<Vec<Payment>> {
        let inner = self.lock();
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| p.transaction_id == id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn mark_payment_authorized(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Authorized, None)
    }

    async fn mark_payment_captured(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Captured, None)
    }

    async fn mark_payment_voided(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Voided, None)
    }

    async fn mark_payment_failed(
        &self,
        id: PaymentId,
        code: Option<&str>,
        message: &str,
    ) -> Result<()> {
        self.transition_payment(
            id,
            PaymentStatus::Failed,
            Some((code.map(ToString::to_string), message.to_string())),
        )
    }

    async fn mark_payment_refunded(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Refunded, None)
    }

    async fn set_payment_card_details(
        &self,
        id: PaymentId,
        details: &CardDetails,
    ) -> Result<()> {
        let mut inner = self.lock();
        let payment = inner
            .payments
            .get_mut(&id)
            .ok_or(SplitPayError::PaymentNotFound)?;
        payment.provider_method_id = details.provider_method_id.clone();
        payment.card_brand = details.brand.clone();
        payment.card_last_four = details.last_four.clone();
        payment.card_exp_month = details.exp_month;
        payment.card_exp_year = details.exp_year;
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn create_refund(&self, new: NewRefund) -> Result<Refund> {
        let mut inner = self.lock();
        if let Some(provider_id) = &new.provider_refund_id {
            if inner
                .refunds
                .values()
                .any(|r| r.provider_refund_id.as_ref() == Some(provider_id))
            {
                return Err(SplitPayError::Database(format!(
                    "duplicate provider_refund_id {provider_id}"
                )));
            }
        }
        let now = Utc::now();
        let refund = Refund {
            id: RefundId(Uuid::new_v4()),
            transaction_id: new.transaction_id,
            payment_id: new.payment_id,
            provider_refund_id: new.provider_refund_id,
            amount_cents: new.amount_cents,
            reason: new.reason,
            status: new.status,
            initiated_by: new.initiated_by,
            failure_reason: new.failure_reason,
            created_at: now,
            updated_at: now,
        };
        inner.refunds.insert(refund.id, refund.clone());
        Ok(refund)
    }

    async fn refund_by_provider_id(&self, provider_refund_id: &str) -> Result<Option<Refund>> {
        Ok(self
            .lock()
            .refunds
            .values()
            .find(|r| r.provider_refund_id.as_deref() == Some(provider_refund_id))
            .cloned())
    }

    async fn set_refund_status(
        &self,
        id: RefundId,
        status: RefundStatus,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let refund = inner
            .refunds
            .get_mut(&id)
            .ok_or_else(|| SplitPayError::Internal(format!("refund {id} not found")))?;
        refund.status = status;
        refund.failure_reason = failure_reason.map(ToString::to_string);
        refund.updated_at = Utc::now();
        Ok(())
    }

    async fn refunded_total(&self, transaction_id: TransactionId) -> Result<i64> {
        Ok(self
            .lock()
            .refunds
            .values()
            .filter(|r| r.transaction_id == transaction_id && r.status == RefundStatus::Succeeded)
            .map(|r| r.amount_cents)
            .sum())
    }

    async fn refunds_for_transaction(&self, id: TransactionId) -> Result<Vec<Refund>> {
        let inner = self.lock();
        let mut refunds: Vec<Refund> = inner
            .refunds
            .values()
            .filter(|r| r.transaction_id == id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at);
        Ok(refunds)
    }
}

impl InMemoryRepository {
    fn transition_payment(
        &self,
        id: PaymentId,
        target: PaymentStatus,
        failure: Option<(Option<String>, String)>,
    ) -> Result<()> {
        let mut inner = self.lock();
        let payment = inner
            .payments
            .get_mut(&id)
            .ok_or(SplitPayError::PaymentNotFound)?;

        if payment.status == target {
            return Ok(());
        }
        if !payment.status.can_transition_to(target) {
            return Err(SplitPayError::InvalidTransition(format!(
                "payment {id}: {} -> {target} is not allowed",
                payment.status
            )));
        }

        let now = Utc::now();
        payment.status = target;
        payment.updated_at = now;
        match target {
            PaymentStatus::Authorized => payment.authorized_at = Some(now),
            PaymentStatus::Captured => payment.captured_at = Some(now),
            PaymentStatus::Voided => payment.voided_at = Some(now),
            _ => {}
        }
        if let Some((code, message)) = failure {
            payment.failure_code = code;
            payment.failure_message = Some(message);
        }
        Ok(())
    }
}
