//! Shared application state for HTTP handlers.

use splitpay_core::repository::Repository;
use splitpay_orchestrator::{CheckoutOrchestrator, Reconciler};
use splitpay_sessions::SessionStore;
use splitpay_shopify::CommercePlatform;
use splitpay_stripe::PaymentProvider;
use std::sync::Arc;

/// State shared across all HTTP handlers.
///
/// Generic over the four collaborator seams so the same router serves
/// production (PostgreSQL, live provider, live platform) and tests (mocks
/// throughout).
pub struct AppState<R, P, C, S> {
    /// The checkout state machine.
    pub orchestrator: Arc<CheckoutOrchestrator<R, P, C, S>>,

    /// Webhook reconciliation.
    pub reconciler: Arc<Reconciler<R>>,

    /// Durable store (admin queries go straight here).
    pub repo: Arc<R>,

    /// Payment provider (webhook signature verification).
    pub provider: Arc<P>,

    /// Commerce platform (webhook signature verification).
    pub platform: Arc<C>,

    /// Secret the admin session tokens are signed with.
    pub admin_secret: String,
}

impl<R, P, C, S> Clone for AppState<R, P, C, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            reconciler: Arc::clone(&self.reconciler),
            repo: Arc::clone(&self.repo),
            provider: Arc::clone(&self.provider),
            platform: Arc::clone(&self.platform),
            admin_secret: self.admin_secret.clone(),
        }
    }
}

impl<R, P, C, S> AppState<R, P, C, S>
where
    R: Repository,
    P: PaymentProvider,
    C: CommercePlatform,
    S: SessionStore,
{
    /// Assemble state from its collaborators.
    #[must_use]
    pub fn new(
        orchestrator: Arc<CheckoutOrchestrator<R, P, C, S>>,
        repo: Arc<R>,
        provider: Arc<P>,
        platform: Arc<C>,
        admin_secret: String,
    ) -> Self {
        Self {
            orchestrator,
            reconciler: Arc::new(Reconciler::new(Arc::clone(&repo))),
            repo,
            provider,
            platform,
            admin_secret,
        }
    }
}
