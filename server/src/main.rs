//! SplitPay service binary.
//!
//! Startup order matters: configuration, database pool, migrations, then
//! the order-repair scan (the post-capture crash window is closed before
//! traffic is accepted), and only then the listener.

use anyhow::Context;
use splitpay_core::{AppConfig, SystemClock};
use splitpay_orchestrator::{CheckoutOrchestrator, repair_unsubmitted_orders};
use splitpay_postgres::{PgStore, apply_migrations};
use splitpay_sessions::InMemorySessionStore;
use splitpay_shopify::ShopifyClient;
use splitpay_stripe::StripeGateway;
use splitpay_web::{AppState, router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// Database connection-pool size.
const DB_POOL_SIZE: u32 = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_SIZE)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;
    apply_migrations(&pool).await.context("applying migrations")?;

    let repo = Arc::new(PgStore::new(pool));
    let provider = Arc::new(
        StripeGateway::new(&config.stripe_secret_key, &config.stripe_webhook_secret)
            .context("building payment gateway")?,
    );
    let platform =
        Arc::new(ShopifyClient::new(&config.shopify_api_secret).context("building platform client")?);
    let sessions = Arc::new(InMemorySessionStore::new());

    // Close the post-capture / pre-order crash window before serving.
    let repaired = repair_unsubmitted_orders(repo.as_ref(), platform.as_ref())
        .await
        .context("order repair scan")?;
    if repaired > 0 {
        tracing::info!(repaired, "Recovered stranded orders at boot");
    }

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        Arc::clone(&repo),
        Arc::clone(&provider),
        Arc::clone(&platform),
        sessions,
        Arc::new(SystemClock),
    ));
    let state = AppState::new(
        orchestrator,
        repo,
        provider,
        platform,
        config.shopify_api_secret.clone(),
    );

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "SplitPay listening");

    axum::serve(listener, router(state))
        .await
        .context("serving")?;

    Ok(())
}
