//! Admin dashboard surface (`/api/admin/*`).
//!
//! Every route requires a valid `X-Session-Token` header; the token binds
//! the caller to one shop and all queries are scoped to that store.

use crate::admin_token::{self, SESSION_TOKEN_HEADER};
use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use splitpay_core::repository::Repository;
use splitpay_core::types::{
    Payment, Refund, RefundInitiator, RefundReason, Store, StoreStats, Transaction,
    TransactionFilter, TransactionId, TransactionStatus, StoreSettings,
};
use splitpay_orchestrator::RefundResult;
use splitpay_sessions::SessionStore;
use splitpay_shopify::CommercePlatform;
use splitpay_stripe::PaymentProvider;
use uuid::Uuid;

/// Resolve the admin token to the caller's store.
async fn require_store<R, P, C, S>(
    state: &AppState<R, P, C, S>,
    headers: &HeaderMap,
) -> Result<Store, ApiError>
where
    R: Repository,
{
    let token = headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing session token"))?;

    let shop_domain = admin_token::verify(token, &state.admin_secret)
        .map_err(|_| ApiError::unauthorized("invalid session token"))?;

    match state.repo.store_by_domain(&shop_domain).await? {
        Some(store) if store.active => Ok(store),
        Some(_) => Err(ApiError::forbidden("store is inactive")),
        None => Err(ApiError::unauthorized("unknown store")),
    }
}

/// Dashboard counters.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Always `true`.
    pub success: bool,

    /// Aggregates for the caller's store.
    pub stats: StoreStats,
}

/// GET `/api/admin/stats`
pub async fn stats<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let store = require_store(&state, &headers).await?;
    let stats = state.repo.store_stats(store.id).await?;
    Ok(Json(StatsResponse { success: true, stats }))
}

/// Query parameters for the transaction listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// 1-based page (default 1).
    #[serde(default)]
    pub page: Option<i64>,

    /// Page size (default 20, capped at 100).
    #[serde(default)]
    pub limit: Option<i64>,

    /// Status filter.
    #[serde(default)]
    pub status: Option<String>,

    /// Created at or after (RFC 3339).
    #[serde(default, rename = "startDate")]
    pub start_date: Option<DateTime<Utc>>,

    /// Created at or before (RFC 3339).
    #[serde(default, rename = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
}

/// One page of transactions.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Always `true`.
    pub success: bool,

    /// Matching transactions, newest first.
    pub items: Vec<Transaction>,

    /// Total matching rows.
    pub total: i64,

    /// 1-based page number.
    pub page: i64,

    /// Total page count.
    pub pages: i64,
}

/// GET `/api/admin/transactions`
pub async fn list_transactions<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let store = require_store(&state, &headers).await?;

    let status = query
        .status
        .as_deref()
        .map(TransactionStatus::parse)
        .transpose()
        .map_err(|e| ApiError::invalid_token(e.to_string()))?;

    let page = state
        .repo
        .list_transactions(&TransactionFilter {
            store_id: Some(store.id),
            status,
            start_date: query.start_date,
            end_date: query.end_date,
            page: query.page.unwrap_or(1),
            limit: query.limit.unwrap_or(20),
        })
        .await?;

    Ok(Json(ListResponse {
        success: true,
        items: page.items,
        total: page.total,
        page: page.page,
        pages: page.pages,
    }))
}

/// A transaction with its payments and refunds.
#[derive(Debug, Serialize)]
pub struct DetailResponse {
    /// Always `true`.
    pub success: bool,

    /// The transaction.
    pub transaction: Transaction,

    /// Its payments, oldest first.
    pub payments: Vec<Payment>,

    /// Its refunds, oldest first.
    pub refunds: Vec<Refund>,
}

/// GET `/api/admin/transactions/:id`
pub async fn transaction_detail<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DetailResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let store = require_store(&state, &headers).await?;
    let id = TransactionId(
        Uuid::parse_str(&id)
            .map_err(|_| ApiError::invalid_token("malformed transaction id"))?,
    );

    let transaction = state
        .repo
        .transaction(id)
        .await?
        .filter(|t| t.store_id == store.id)
        .ok_or_else(|| {
            ApiError::new(
                http::StatusCode::NOT_FOUND,
                "TRANSACTION_NOT_FOUND",
                "Transaction not found".into(),
            )
        })?;

    let payments = state.repo.payments_for_transaction(id).await?;
    let refunds = state.repo.refunds_for_transaction(id).await?;

    Ok(Json(DetailResponse {
        success: true,
        transaction,
        payments,
        refunds,
    }))
}

/// Request to refund part of a completed transaction.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// Transaction to refund.
    pub transaction_id: String,

    /// Amount in cents.
    pub amount: i64,

    /// Refund reason.
    pub reason: String,
}

/// Per-payment refund results.
#[derive(Debug, Serialize)]
pub struct RefundResponse {
    /// Always `true`.
    pub success: bool,

    /// Per-split results.
    pub refunds: Vec<RefundResult>,

    /// Total cents refunded over the transaction's lifetime.
    pub total_refunded: i64,

    /// Transaction status after the refund.
    pub new_status: TransactionStatus,
}

/// POST `/api/admin/refund`
pub async fn refund<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
    Json(request): Json<RefundRequest>,
) -> Result<Json<RefundResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let store = require_store(&state, &headers).await?;

    let id = TransactionId(
        Uuid::parse_str(&request.transaction_id)
            .map_err(|_| ApiError::invalid_token("malformed transaction id"))?,
    );
    let reason = RefundReason::parse(&request.reason)
        .map_err(|e| ApiError::invalid_token(e.to_string()))?;
    if request.amount <= 0 {
        return Err(ApiError::invalid_amount("amount must be positive"));
    }

    // Admins only reach their own transactions.
    if state
        .repo
        .transaction(id)
        .await?
        .is_none_or(|t| t.store_id != store.id)
    {
        return Err(ApiError::new(
            http::StatusCode::NOT_FOUND,
            "TRANSACTION_NOT_FOUND",
            "Transaction not found".into(),
        ));
    }

    let outcome = state
        .orchestrator
        .refund(id, request.amount, reason, RefundInitiator::Admin)
        .await?;

    Ok(Json(RefundResponse {
        success: true,
        refunds: outcome.refunds,
        total_refunded: outcome.total_refunded_cents,
        new_status: outcome.new_status,
    }))
}

/// Store listing (support tooling).
#[derive(Debug, Serialize)]
pub struct StoresResponse {
    /// Always `true`.
    pub success: bool,

    /// The caller's store record.
    pub stores: Vec<Store>,
}

/// GET `/api/admin/stores`
pub async fn stores<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
) -> Result<Json<StoresResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let mut store = require_store(&state, &headers).await?;
    // The access token never leaves the server.
    store.access_token = None;
    Ok(Json(StoresResponse {
        success: true,
        stores: vec![store],
    }))
}

/// Request to replace store settings.
#[derive(Debug, Deserialize)]
pub struct SettingsRequest {
    /// New settings (recognized keys validated, unknown keys preserved).
    pub settings: StoreSettings,
}

/// The stored settings after the update.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// Always `true`.
    pub success: bool,

    /// Settings as persisted.
    pub settings: StoreSettings,
}

/// PUT `/api/admin/settings`
pub async fn update_settings<R, P, C, S>(
    State(state): State<AppState<R, P, C, S>>,
    headers: HeaderMap,
    Json(request): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, ApiError>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    let store = require_store(&state, &headers).await?;

    if !(2..=5).contains(&request.settings.max_cards) {
        return Err(ApiError::invalid_amount("max_cards must be between 2 and 5"));
    }
    if request.settings.min_amount_cents < 100 {
        return Err(ApiError::invalid_amount("min_amount_cents must be at least 100"));
    }

    let updated = state
        .repo
        .update_store_settings(store.id, &request.settings)
        .await?;

    Ok(Json(SettingsResponse {
        success: true,
        settings: updated.settings,
    }))
}
