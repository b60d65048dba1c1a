//! Order submission after capture-all.
//!
//! Runs in the post-capture window: money is already held by the merchant,
//! so failure here never rolls anything back; it fires the operator alert
//! and leaves the transaction `completed` with no order for the repair scan
//! to pick up.

use splitpay_core::Result;
use splitpay_core::error::SplitPayError;
use splitpay_core::repository::Repository;
use splitpay_core::types::{Store, TransactionId};
use splitpay_shopify::{CommercePlatform, CreatedOrder, OrderRequest};

/// Create the platform order for a completed transaction and write the
/// order ids back.
///
/// # Errors
///
/// Returns [`SplitPayError::OrderSubmissionFailed`] when the platform call
/// or the write-back fails; the transaction stays `completed`.
pub async fn submit_order<R: Repository, C: CommercePlatform>(
    repo: &R,
    platform: &C,
    store: &Store,
    transaction_id: TransactionId,
    payment_count: usize,
) -> Result<CreatedOrder> {
    let transaction = repo
        .transaction(transaction_id)
        .await?
        .ok_or(SplitPayError::TransactionNotFound)?;

    let access_token = store.access_token.as_deref().ok_or_else(|| {
        SplitPayError::OrderSubmissionFailed(format!(
            "store {} has no access token",
            store.shop_domain
        ))
    })?;

    let request = OrderRequest {
        transaction_id,
        total_amount_cents: transaction.total_amount_cents,
        currency: transaction.currency.clone(),
        customer_email: transaction.customer.email.clone(),
        payment_count,
    };

    let order = match platform
        .create_order(&store.shop_domain, access_token, &request)
        .await
    {
        Ok(order) => order,
        Err(err) => {
            metrics::counter!("orders.submission_failed").increment(1);
            tracing::error!(
                transaction_id = %transaction_id,
                shop_domain = %store.shop_domain,
                error = %err,
                "Order submission failed; captured funds await order repair"
            );
            return Err(SplitPayError::OrderSubmissionFailed(err.to_string()));
        }
    };

    repo.set_transaction_order(transaction_id, &order.order_id, &order.order_number)
        .await?;

    tracing::info!(
        transaction_id = %transaction_id,
        order_id = %order.order_id,
        order_number = %order.order_number,
        "Order recorded for completed transaction"
    );
    Ok(order)
}
