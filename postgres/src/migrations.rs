//! Ordered, idempotent schema migrations.
//!
//! Each migration runs inside its own transaction and is recorded in
//! `schema_versions` only on success, so a partial failure aborts without
//! recording and the whole runner is safe to re-run. Versions apply in
//! ascending order; re-running an applied version is a no-op.

use splitpay_core::Result;
use splitpay_core::error::SplitPayError;
use sqlx::PgPool;

/// One schema migration.
struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "base tables",
        sql: r"
            CREATE TABLE stores (
                id UUID PRIMARY KEY,
                shop_domain TEXT NOT NULL UNIQUE,
                access_token TEXT,
                settings JSONB NOT NULL DEFAULT '{}'::jsonb,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                installed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                uninstalled_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE TABLE transactions (
                id UUID PRIMARY KEY,
                store_id UUID NOT NULL REFERENCES stores(id),
                checkout_token TEXT NOT NULL,
                order_id TEXT,
                order_number TEXT,
                total_amount_cents BIGINT NOT NULL CHECK (total_amount_cents >= 0),
                currency TEXT NOT NULL DEFAULT 'USD',
                status TEXT NOT NULL DEFAULT 'pending',
                failure_reason TEXT,
                idempotency_key TEXT,
                customer_email TEXT,
                customer_ip TEXT,
                customer_user_agent TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE TABLE payments (
                id UUID PRIMARY KEY,
                transaction_id UUID NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                provider_intent_id TEXT NOT NULL UNIQUE,
                provider_method_id TEXT,
                amount_cents BIGINT NOT NULL CHECK (amount_cents > 0),
                card_brand TEXT,
                card_last_four TEXT,
                card_exp_month SMALLINT,
                card_exp_year SMALLINT,
                status TEXT NOT NULL DEFAULT 'pending',
                failure_code TEXT,
                failure_message TEXT,
                authorized_at TIMESTAMPTZ,
                captured_at TIMESTAMPTZ,
                voided_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE TABLE refunds (
                id UUID PRIMARY KEY,
                transaction_id UUID NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                payment_id UUID NOT NULL REFERENCES payments(id) ON DELETE CASCADE,
                provider_refund_id TEXT UNIQUE,
                amount_cents BIGINT NOT NULL CHECK (amount_cents > 0),
                reason TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                initiated_by TEXT NOT NULL,
                failure_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );

            CREATE INDEX idx_transactions_store_id ON transactions(store_id);
            CREATE INDEX idx_transactions_status ON transactions(status);
            CREATE INDEX idx_transactions_created_at ON transactions(created_at DESC);
            CREATE INDEX idx_transactions_order_id ON transactions(order_id);
            CREATE INDEX idx_payments_transaction_id ON payments(transaction_id);
            CREATE INDEX idx_refunds_transaction_id ON refunds(transaction_id);
            CREATE INDEX idx_stores_shop_domain ON stores(shop_domain);
        ",
    },
    Migration {
        version: 2,
        name: "updated_at triggers",
        sql: r"
            CREATE OR REPLACE FUNCTION refresh_updated_at() RETURNS trigger AS $$
            BEGIN
                NEW.updated_at = now();
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql;

            CREATE TRIGGER trg_stores_updated_at
                BEFORE UPDATE ON stores
                FOR EACH ROW EXECUTE FUNCTION refresh_updated_at();
            CREATE TRIGGER trg_transactions_updated_at
                BEFORE UPDATE ON transactions
                FOR EACH ROW EXECUTE FUNCTION refresh_updated_at();
            CREATE TRIGGER trg_payments_updated_at
                BEFORE UPDATE ON payments
                FOR EACH ROW EXECUTE FUNCTION refresh_updated_at();
            CREATE TRIGGER trg_refunds_updated_at
                BEFORE UPDATE ON refunds
                FOR EACH ROW EXECUTE FUNCTION refresh_updated_at();
        ",
    },
];

/// Apply all pending migrations in ascending version order.
///
/// # Errors
///
/// Returns [`SplitPayError::Database`] if any statement fails; the failing
/// migration's transaction rolls back and its version is not recorded.
pub async fn apply_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| SplitPayError::Database(format!("failed to create schema_versions: {e}")))?;

    let applied: Vec<(i32,)> = sqlx::query_as("SELECT version FROM schema_versions")
        .fetch_all(pool)
        .await
        .map_err(|e| SplitPayError::Database(e.to_string()))?;
    let applied: std::collections::HashSet<i32> = applied.into_iter().map(|(v,)| v).collect();

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| SplitPayError::Database(e.to_string()))?;

        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                SplitPayError::Database(format!(
                    "migration {} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;

        sqlx::query("INSERT INTO schema_versions (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| SplitPayError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SplitPayError::Database(e.to_string()))?;

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
    }

    Ok(())
}
