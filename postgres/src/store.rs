//! `PostgreSQL` implementation of the repository surface.

use splitpay_core::Result;
use splitpay_core::error::SplitPayError;
use splitpay_core::repository::{
    CardDetails, NewPayment, NewRefund, NewStore, NewTransaction, Repository,
};
use splitpay_core::types::{
    CustomerMeta, Page, Payment, PaymentId, PaymentStatus, Refund, RefundId, RefundInitiator,
    RefundReason, RefundStatus, Store, StoreId, StoreSettings, StoreStats, Transaction,
    TransactionFilter, TransactionId, TransactionStatus,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

/// Repository over a `PostgreSQL` connection pool.
///
/// Compound operations (guarded status transitions, the completion
/// invariant check) run inside a database transaction with the owning row
/// locked `FOR UPDATE`, so concurrent orchestrator and reconciler writes
/// serialize per row rather than per process.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Guarded payment status transition.
    ///
    /// Locks the row, checks the legal-transition set, applies `target`
    /// plus its timestamp column. Re-asserting the current status is a
    /// successful no-op; anything else illegal is `InvalidTransition`.
    async fn transition_payment(
        &self,
        id: PaymentId,
        target: PaymentStatus,
        failure: Option<(Option<&str>, &str)>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT status FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Err(SplitPayError::PaymentNotFound);
        };
        let current = PaymentStatus::parse(row.try_get::<&str, _>("status").map_err(db_err)?)?;

        if current == target {
            tx.commit().await.map_err(db_err)?;
            return Ok(());
        }
        if !current.can_transition_to(target) {
            return Err(SplitPayError::InvalidTransition(format!(
                "payment {id}: {current} -> {target} is not allowed"
            )));
        }

        let stamp_column = match target {
            PaymentStatus::Authorized => Some("authorized_at"),
            PaymentStatus::Captured => Some("captured_at"),
            PaymentStatus::Voided => Some("voided_at"),
            _ => None,
        };

        let sql = match (stamp_column, failure.is_some()) {
            (Some(column), _) => {
                format!("UPDATE payments SET status = $1, {column} = now() WHERE id = $2")
            }
            (None, true) => {
                "UPDATE payments SET status = $1, failure_code = $3, failure_message = $4 \
                 WHERE id = $2"
                    .to_string()
            }
            (None, false) => "UPDATE payments SET status = $1 WHERE id = $2".to_string(),
        };

        let mut query = sqlx::query(&sql).bind(target.as_str()).bind(id.0);
        if let Some((code, message)) = failure {
            query = query.bind(code).bind(message);
        }
        query.execute(&mut *tx).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        tracing::debug!(payment_id = %id, from = %current, to = %target, "Payment transition");
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> SplitPayError {
    SplitPayError::Database(e.to_string())
}

// ── Row mappers ────────────────────────────────────────────────

fn row_to_store(row: &PgRow) -> Result<Store> {
    Ok(Store {
        id: StoreId(row.try_get("id").map_err(db_err)?),
        shop_domain: row.try_get("shop_domain").map_err(db_err)?,
        access_token: row.try_get("access_token").map_err(db_err)?,
        settings: row
            .try_get::<Json<StoreSettings>, _>("settings")
            .map_err(db_err)?
            .0,
        active: row.try_get("active").map_err(db_err)?,
        installed_at: row.try_get("installed_at").map_err(db_err)?,
        uninstalled_at: row.try_get("uninstalled_at").map_err(db_err)?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<Transaction> {
    Ok(Transaction {
        id: TransactionId(row.try_get("id").map_err(db_err)?),
        store_id: StoreId(row.try_get("store_id").map_err(db_err)?),
        checkout_token: row.try_get("checkout_token").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        order_number: row.try_get("order_number").map_err(db_err)?,
        total_amount_cents: row.try_get("total_amount_cents").map_err(db_err)?,
        currency: row.try_get("currency").map_err(db_err)?,
        status: TransactionStatus::parse(row.try_get::<&str, _>("status").map_err(db_err)?)?,
        failure_reason: row.try_get("failure_reason").map_err(db_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(db_err)?,
        customer: CustomerMeta {
            email: row.try_get("customer_email").map_err(db_err)?,
            ip: row.try_get("customer_ip").map_err(db_err)?,
            user_agent: row.try_get("customer_user_agent").map_err(db_err)?,
        },
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_payment(row: &PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId(row.try_get("id").map_err(db_err)?),
        transaction_id: TransactionId(row.try_get("transaction_id").map_err(db_err)?),
        provider_intent_id: row.try_get("provider_intent_id").map_err(db_err)?,
        provider_method_id: row.try_get("provider_method_id").map_err(db_err)?,
        amount_cents: row.try_get("amount_cents").map_err(db_err)?,
        card_brand: row.try_get("card_brand").map_err(db_err)?,
        card_last_four: row.try_get("card_last_four").map_err(db_err)?,
        card_exp_month: row.try_get("card_exp_month").map_err(db_err)?,
        card_exp_year: row.try_get("card_exp_year").map_err(db_err)?,
        status: PaymentStatus::parse(row.try_get::<&str, _>("status").map_err(db_err)?)?,
        failure_code: row.try_get("failure_code").map_err(db_err)?,
        failure_message: row.try_get("failure_message").map_err(db_err)?,
        authorized_at: row.try_get("authorized_at").map_err(db_err)?,
        captured_at: row.try_get("captured_at").map_err(db_err)?,
        voided_at: row.try_get("voided_at").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_refund(row: &PgRow) -> Result<Refund> {
    Ok(Refund {
        id: RefundId(row.try_get("id").map_err(db_err)?),
        transaction_id: TransactionId(row.try_get("transaction_id").map_err(db_err)?),
        payment_id: PaymentId(row.try_get("payment_id").map_err(db_err)?),
        provider_refund_id: row.try_get("provider_refund_id").map_err(db_err)?,
        amount_cents: row.try_get("amount_cents").map_err(db_err)?,
        reason: RefundReason::parse(row.try_get::<&str, _>("reason").map_err(db_err)?)?,
        status: RefundStatus::parse(row.try_get::<&str, _>("status").map_err(db_err)?)?,
        initiated_by: RefundInitiator::parse(
            row.try_get::<&str, _>("initiated_by").map_err(db_err)?,
        )?,
        failure_reason: row.try_get("failure_reason").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

impl Repository for PgStore {
    // ── Stores ─────────────────────────────────────────────────

    async fn create_store(&self, new: NewStore) -> Result<Store> {
        let row = sqlx::query(
            r"
            INSERT INTO stores (id, shop_domain, access_token, settings)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(&new.shop_domain)
        .bind(&new.access_token)
        .bind(Json(&new.settings))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::info!(shop_domain = %new.shop_domain, "Store installed");
        row_to_store(&row)
    }

    async fn store_by_id(&self, id: StoreId) -> Result<Option<Store>> {
        sqlx::query("SELECT * FROM stores WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_store)
            .transpose()
    }

    async fn store_by_domain(&self, shop_domain: &str) -> Result<Option<Store>> {
        sqlx::query("SELECT * FROM stores WHERE shop_domain = $1")
            .bind(shop_domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_store)
            .transpose()
    }

    async fn reactivate_store(&self, id: StoreId, access_token: &str) -> Result<Store> {
        let row = sqlx::query(
            r"
            UPDATE stores
            SET active = TRUE, access_token = $2, uninstalled_at = NULL
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id.0)
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(SplitPayError::StoreNotFound)?;

        tracing::info!(store_id = %id, "Store reactivated");
        row_to_store(&row)
    }

    async fn deactivate_store(&self, id: StoreId) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE stores
            SET active = FALSE, access_token = NULL, uninstalled_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SplitPayError::StoreNotFound);
        }
        tracing::info!(store_id = %id, "Store deactivated");
        Ok(())
    }

    async fn update_store_settings(
        &self,
        id: StoreId,
        settings: &StoreSettings,
    ) -> Result<Store> {
        let row = sqlx::query("UPDATE stores SET settings = $2 WHERE id = $1 RETURNING *")
            .bind(id.0)
            .bind(Json(settings))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(SplitPayError::StoreNotFound)?;
        row_to_store(&row)
    }

    async fn list_stores(&self, page: i64, limit: i64) -> Result<Page<Store>> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stores")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let rows = sqlx::query(
            "SELECT * FROM stores ORDER BY installed_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind((page - 1) * limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let items = rows.iter().map(row_to_store).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total.0, page, limit))
    }

    // ── Transactions ───────────────────────────────────────────

    async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction> {
        let row = sqlx::query(
            r"
            INSERT INTO transactions (
                id, store_id, checkout_token, total_amount_cents, currency,
                customer_email, customer_ip, customer_user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(new.store_id.0)
        .bind(&new.checkout_token)
        .bind(new.total_amount_cents)
        .bind(&new.currency)
        .bind(&new.customer.email)
        .bind(&new.customer.ip)
        .bind(&new.customer.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row_to_transaction(&row)
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        sqlx::query("SELECT * FROM transactions WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_transaction)
            .transpose()
    }

    async fn latest_pending_transaction(
        &self,
        store_id: StoreId,
        checkout_token: &str,
    ) -> Result<Option<Transaction>> {
        sqlx::query(
            r"
            SELECT * FROM transactions
            WHERE store_id = $1 AND checkout_token = $2 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(store_id.0)
        .bind(checkout_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(row_to_transaction)
        .transpose()
    }

    async fn completed_transaction(
        &self,
        store_id: StoreId,
        checkout_token: &str,
    ) -> Result<Option<Transaction>> {
        sqlx::query(
            r"
            SELECT * FROM transactions
            WHERE store_id = $1 AND checkout_token = $2
              AND status IN ('completed', 'partially_refunded', 'refunded')
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(store_id.0)
        .bind(checkout_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(row_to_transaction)
        .transpose()
    }

    async fn mark_processing(&self, id: TransactionId) -> Result<bool> {
        // The CAS gate two concurrent complete() calls race on: exactly one
        // UPDATE sees status = 'pending'.
        let result = sqlx::query(
            "UPDATE transactions SET status = 'processing' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_idempotency_key(&self, id: TransactionId, key: &str) -> Result<()> {
        sqlx::query("UPDATE transactions SET idempotency_key = $2 WHERE id = $1")
            .bind(id.0)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn fail_transaction(&self, id: TransactionId, reason: &str) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE transactions SET status = 'failed', failure_reason = $2
            WHERE id = $1 AND status IN ('pending', 'processing')
            ",
        )
        .bind(id.0)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} cannot move to failed"
            )));
        }
        tracing::warn!(transaction_id = %id, reason, "Transaction failed");
        Ok(())
    }

    async fn complete_transaction(&self, id: TransactionId) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            "SELECT status, total_amount_cents FROM transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(SplitPayError::TransactionNotFound)?;

        let status =
            TransactionStatus::parse(row.try_get::<&str, _>("status").map_err(db_err)?)?;
        let total: i64 = row.try_get("total_amount_cents").map_err(db_err)?;

        if status != TransactionStatus::Processing {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} is {status}, not processing"
            )));
        }

        // Completion invariant: at least two payments, every one captured,
        // and the captured amounts sum exactly to the total.
        let check: (i64, i64, i64) = sqlx::query_as(
            r"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'captured'),
                COALESCE(SUM(amount_cents) FILTER (WHERE status = 'captured'), 0)
            FROM payments
            WHERE transaction_id = $1
            ",
        )
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let (payment_count, captured_count, captured_sum) = check;
        if captured_count < 2 || captured_count != payment_count || captured_sum != total {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} cannot complete: {captured_count}/{payment_count} captured, \
                 {captured_sum} of {total} cents"
            )));
        }

        sqlx::query("UPDATE transactions SET status = 'completed' WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        tracing::info!(transaction_id = %id, amount_cents = captured_sum, "Transaction completed");
        Ok(())
    }

    async fn set_transaction_order(
        &self,
        id: TransactionId,
        order_id: &str,
        order_number: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE transactions SET order_id = $2, order_number = $3 WHERE id = $1",
        )
        .bind(id.0)
        .bind(order_id)
        .bind(order_number)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SplitPayError::TransactionNotFound);
        }
        Ok(())
    }

    async fn set_transaction_refund_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<()> {
        if !matches!(
            status,
            TransactionStatus::PartiallyRefunded | TransactionStatus::Refunded
        ) {
            return Err(SplitPayError::InvalidTransition(format!(
                "{status} is not a refund status"
            )));
        }

        let result = sqlx::query(
            r"
            UPDATE transactions SET status = $2
            WHERE id = $1 AND status IN ('completed', 'partially_refunded')
            ",
        )
        .bind(id.0)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SplitPayError::InvalidTransition(format!(
                "transaction {id} cannot move to {status}"
            )));
        }
        Ok(())
    }

    async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Page<Transaction>> {
        let page = filter.page_or_default();
        let limit = filter.limit_or_default();

        let mut count_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions WHERE TRUE");
        let mut list_query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM transactions WHERE TRUE");

        for builder in [&mut count_query, &mut list_query] {
            if let Some(store_id) = filter.store_id {
                builder.push(" AND store_id = ").push_bind(store_id.0);
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(start) = filter.start_date {
                builder.push(" AND created_at >= ").push_bind(start);
            }
            if let Some(end) = filter.end_date {
                builder.push(" AND created_at <= ").push_bind(end);
            }
        }

        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        list_query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind((page - 1) * limit);
        let rows = list_query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let items = rows
            .iter()
            .map(row_to_transaction)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, total, page, limit))
    }

    async fn transactions_missing_orders(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM transactions
            WHERE status = 'completed' AND order_id IS NULL
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn purge_customer_pii(&self, store_id: StoreId) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE transactions
            SET customer_email = NULL, customer_ip = NULL, customer_user_agent = NULL
            WHERE store_id = $1
              AND (customer_email IS NOT NULL
                   OR customer_ip IS NOT NULL
                   OR customer_user_agent IS NOT NULL)
            ",
        )
        .bind(store_id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        tracing::info!(
            store_id = %store_id,
            rows = result.rows_affected(),
            "Customer PII purged"
        );
        Ok(result.rows_affected())
    }

    async fn store_stats(&self, store_id: StoreId) -> Result<StoreStats> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status IN ('completed', 'partially_refunded', 'refunded')),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COALESCE(SUM(total_amount_cents) FILTER (
                    WHERE status IN ('completed', 'partially_refunded', 'refunded')), 0)
            FROM transactions
            WHERE store_id = $1
            ",
        )
        .bind(store_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let refunded: (i64,) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(r.amount_cents), 0)
            FROM refunds r
            JOIN transactions t ON t.id = r.transaction_id
            WHERE t.store_id = $1 AND r.status = 'succeeded'
            ",
        )
        .bind(store_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(StoreStats {
            total_transactions: row.0,
            completed_transactions: row.1,
            failed_transactions: row.2,
            total_captured_cents: row.3,
            total_refunded_cents: refunded.0,
        })
    }

    // ── Payments ───────────────────────────────────────────────

    async fn create_payment(&self, new: NewPayment) -> Result<Payment> {
        let row = sqlx::query(
            r"
            INSERT INTO payments (id, transaction_id, provider_intent_id, amount_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(new.transaction_id.0)
        .bind(&new.provider_intent_id)
        .bind(new.amount_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row_to_payment(&row)
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        sqlx::query("SELECT * FROM payments WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_payment)
            .transpose()
    }

    async fn payment_by_intent(&self, provider_intent_id: &str) -> Result<Option<Payment>> {
        sqlx::query("SELECT * FROM payments WHERE provider_intent_id = $1")
            .bind(provider_intent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_payment)
            .transpose()
    }

    async fn payments_for_transaction(&self, id: TransactionId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(
            "SELECT * FROM payments WHERE transaction_id = $1 ORDER BY created_at ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_payment).collect()
    }

    async fn mark_payment_authorized(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Authorized, None).await
    }

    async fn mark_payment_captured(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Captured, None).await
    }

    async fn mark_payment_voided(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Voided, None).await
    }

    async fn mark_payment_failed(
        &self,
        id: PaymentId,
        code: Option<&str>,
        message: &str,
    ) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Failed, Some((code, message)))
            .await
    }

    async fn mark_payment_refunded(&self, id: PaymentId) -> Result<()> {
        self.transition_payment(id, PaymentStatus::Refunded, None).await
    }

    async fn set_payment_card_details(
        &self,
        id: PaymentId,
        details: &CardDetails,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE payments
            SET provider_method_id = $2, card_brand = $3, card_last_four = $4,
                card_exp_month = $5, card_exp_year = $6
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .bind(&details.provider_method_id)
        .bind(&details.brand)
        .bind(&details.last_four)
        .bind(details.exp_month)
        .bind(details.exp_year)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SplitPayError::PaymentNotFound);
        }
        Ok(())
    }

    // ── Refunds ────────────────────────────────────────────────

    async fn create_refund(&self, new: NewRefund) -> Result<Refund> {
        let row = sqlx::query(
            r"
            INSERT INTO refunds (
                id, transaction_id, payment_id, provider_refund_id, amount_cents,
                reason, status, initiated_by, failure_reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(new.transaction_id.0)
        .bind(new.payment_id.0)
        .bind(&new.provider_refund_id)
        .bind(new.amount_cents)
        .bind(new.reason.as_str())
        .bind(new.status.as_str())
        .bind(new.initiated_by.as_str())
        .bind(&new.failure_reason)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        metrics::counter!("refunds.created").increment(1);
        row_to_refund(&row)
    }

    async fn refund_by_provider_id(&self, provider_refund_id: &str) -> Result<Option<Refund>> {
        sqlx::query("SELECT * FROM refunds WHERE provider_refund_id = $1")
            .bind(provider_refund_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(row_to_refund)
            .transpose()
    }

    async fn set_refund_status(
        &self,
        id: RefundId,
        status: RefundStatus,
        failure_reason: Option<&str>,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE refunds SET status = $2, failure_reason = $3 WHERE id = $1")
                .bind(id.0)
                .bind(status.as_str())
                .bind(failure_reason)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(SplitPayError::Internal(format!("refund {id} not found")));
        }
        Ok(())
    }

    async fn refunded_total(&self, transaction_id: TransactionId) -> Result<i64> {
        let total: (i64,) = sqlx::query_as(
            r"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM refunds
            WHERE transaction_id = $1 AND status = 'succeeded'
            ",
        )
        .bind(transaction_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(total.0)
    }

    async fn refunds_for_transaction(&self, id: TransactionId) -> Result<Vec<Refund>> {
        let rows = sqlx::query(
            "SELECT * FROM refunds WHERE transaction_id = $1 ORDER BY created_at ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_refund).collect()
    }
}
