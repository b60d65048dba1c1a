//! Webhook reconciliation.
//!
//! The provider is the system of record for card state; events pushed here
//! re-sync local rows. Two rules are absolute: signatures are verified
//! before this module ever runs, and a payment never regresses out of a
//! terminal state: an event that arrives after the orchestrator already
//! settled a payment is an idempotent no-op, not a rollback.

use splitpay_core::Result;
use splitpay_core::repository::Repository;
use splitpay_core::types::{PaymentStatus, RefundStatus};
use splitpay_shopify::PlatformEvent;
use splitpay_stripe::ProviderEvent;
use std::sync::Arc;

/// Applies provider and platform events to the durable store.
pub struct Reconciler<R> {
    repo: Arc<R>,
}

impl<R: Repository> Reconciler<R> {
    /// Create a reconciler over the durable store.
    pub const fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Apply one provider event.
    ///
    /// # Errors
    ///
    /// Database faults propagate; the webhook HTTP layer logs them, bumps
    /// the swallow metric and still replies 200 (provider retry storms are
    /// worse than a dropped advisory event; the alert is the signal).
    pub async fn handle_provider_event(&self, event: ProviderEvent) -> Result<()> {
        match event {
            ProviderEvent::PaymentIntentSucceeded { intent_id } => {
                self.sync_payment_captured(&intent_id).await
            }
            ProviderEvent::PaymentIntentFailed {
                intent_id,
                code,
                message,
            } => self.sync_payment_failed(&intent_id, code, message).await,
            ProviderEvent::ChargeRefunded { intent_id, refunds } => {
                for update in refunds {
                    let Some(refund) =
                        self.repo.refund_by_provider_id(&update.refund_id).await?
                    else {
                        tracing::warn!(
                            provider_refund_id = %update.refund_id,
                            intent_id = ?intent_id,
                            "Refund event for unknown refund row"
                        );
                        continue;
                    };
                    let status = RefundStatus::parse(&update.status)?;
                    self.repo.set_refund_status(refund.id, status, None).await?;
                    tracing::info!(
                        refund_id = %refund.id,
                        provider_refund_id = %update.refund_id,
                        status = status.as_str(),
                        "Refund status reconciled"
                    );
                }
                Ok(())
            }
            ProviderEvent::DisputeCreated { charge_id, reason } => {
                // Flag only: disputes are an operator workflow, never an
                // automatic money-state change.
                metrics::counter!("disputes.created").increment(1);
                tracing::warn!(charge_id, reason = ?reason, "Dispute opened on a charge");
                Ok(())
            }
            ProviderEvent::Unhandled { event_type } => {
                tracing::debug!(event_type, "Ignoring unhandled provider event");
                Ok(())
            }
        }
    }

    /// Apply one platform event for `shop_domain`.
    ///
    /// # Errors
    ///
    /// Database faults propagate (same swallow-at-HTTP policy as provider
    /// events).
    pub async fn handle_platform_event(
        &self,
        shop_domain: &str,
        event: PlatformEvent,
    ) -> Result<()> {
        match event {
            PlatformEvent::AppUninstalled => self.deactivate(shop_domain, false).await,
            PlatformEvent::CustomersRedact | PlatformEvent::ShopRedact => {
                // Redaction is uninstall plus purge of customer PII.
                self.deactivate(shop_domain, true).await
            }
            PlatformEvent::CustomersDataRequest => {
                tracing::info!(shop_domain, "GDPR data request acknowledged");
                Ok(())
            }
            PlatformEvent::OrdersCreate | PlatformEvent::OrdersRefunded => {
                // Advisory only: platform order events never mutate money
                // state here.
                tracing::info!(shop_domain, event = ?event, "Platform order event");
                Ok(())
            }
            PlatformEvent::Unhandled(topic) => {
                tracing::debug!(shop_domain, topic, "Ignoring unhandled platform topic");
                Ok(())
            }
        }
    }

    /// Reconcile a capture reported by the provider.
    ///
    /// Handles the race where the event outruns (or repeats) the
    /// orchestrator's own capture write.
    async fn sync_payment_captured(&self, intent_id: &str) -> Result<()> {
        let Some(payment) = self.repo.payment_by_intent(intent_id).await? else {
            tracing::warn!(intent_id, "Capture event for unknown intent");
            return Ok(());
        };

        match payment.status {
            PaymentStatus::Captured | PaymentStatus::Refunded => Ok(()),
            PaymentStatus::Authorized => {
                self.repo.mark_payment_captured(payment.id).await?;
                tracing::info!(intent_id, payment_id = %payment.id, "Capture reconciled");
                Ok(())
            }
            PaymentStatus::Pending => {
                // Event outran the orchestrator's authorize write; walk the
                // legal path rather than jumping states.
                self.repo.mark_payment_authorized(payment.id).await?;
                self.repo.mark_payment_captured(payment.id).await?;
                tracing::info!(intent_id, payment_id = %payment.id, "Capture reconciled from pending");
                Ok(())
            }
            PaymentStatus::Voided | PaymentStatus::Failed => {
                tracing::error!(
                    intent_id,
                    payment_id = %payment.id,
                    status = payment.status.as_str(),
                    "Capture event for a payment in a terminal failure state"
                );
                Ok(())
            }
        }
    }

    async fn sync_payment_failed(
        &self,
        intent_id: &str,
        code: Option<String>,
        message: Option<String>,
    ) -> Result<()> {
        let Some(payment) = self.repo.payment_by_intent(intent_id).await? else {
            tracing::warn!(intent_id, "Failure event for unknown intent");
            return Ok(());
        };

        if payment.status != PaymentStatus::Pending {
            // Terminal or already-held payments keep their state.
            tracing::debug!(
                intent_id,
                status = payment.status.as_str(),
                "Failure event ignored for non-pending payment"
            );
            return Ok(());
        }

        let message = message.unwrap_or_else(|| "payment failed".to_string());
        self.repo
            .mark_payment_failed(payment.id, code.as_deref(), &message)
            .await?;
        tracing::info!(intent_id, payment_id = %payment.id, "Failure reconciled");
        Ok(())
    }

    async fn deactivate(&self, shop_domain: &str, purge_pii: bool) -> Result<()> {
        let Some(store) = self.repo.store_by_domain(shop_domain).await? else {
            tracing::warn!(shop_domain, "Platform event for unknown store");
            return Ok(());
        };

        if store.active {
            self.repo.deactivate_store(store.id).await?;
        }
        if purge_pii {
            let purged = self.repo.purge_customer_pii(store.id).await?;
            tracing::info!(shop_domain, purged, "Store redacted");
        } else {
            tracing::info!(shop_domain, "Store uninstalled");
        }
        Ok(())
    }
}
