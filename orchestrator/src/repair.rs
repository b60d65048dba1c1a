//! Startup repair of the post-capture / pre-order crash window.
//!
//! If the service dies between capture-all and order creation, money is
//! captured but no order exists. This scan runs at boot, before the
//! listener starts, and retries order creation for every `completed`
//! transaction with a null `order_id`.

use splitpay_core::Result;
use splitpay_core::repository::Repository;
use splitpay_shopify::CommercePlatform;

use crate::submitter::submit_order;

/// Retry order creation for completed transactions missing one.
///
/// Returns the number of orders successfully recorded. Per-transaction
/// failures are logged and counted, not propagated: the next boot retries
/// again and an operator alert already fired.
///
/// # Errors
///
/// Only the initial listing query can fail the scan as a whole.
pub async fn repair_unsubmitted_orders<R: Repository, C: CommercePlatform>(
    repo: &R,
    platform: &C,
) -> Result<usize> {
    let stranded = repo.transactions_missing_orders().await?;
    if stranded.is_empty() {
        return Ok(0);
    }

    tracing::warn!(
        count = stranded.len(),
        "Found completed transactions without orders, repairing"
    );

    let mut repaired = 0;
    for transaction in stranded {
        let store = match repo.store_by_id(transaction.store_id).await? {
            Some(store) => store,
            None => {
                tracing::error!(
                    transaction_id = %transaction.id,
                    store_id = %transaction.store_id,
                    "Stranded transaction references a missing store"
                );
                continue;
            }
        };

        let payment_count = repo.payments_for_transaction(transaction.id).await?.len();

        match submit_order(repo, platform, &store, transaction.id, payment_count).await {
            Ok(order) => {
                repaired += 1;
                tracing::info!(
                    transaction_id = %transaction.id,
                    order_id = %order.order_id,
                    "Stranded transaction repaired"
                );
            }
            Err(err) => {
                tracing::error!(
                    transaction_id = %transaction.id,
                    error = %err,
                    "Order repair failed, will retry next boot"
                );
            }
        }
    }

    Ok(repaired)
}
