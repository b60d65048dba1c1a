//! In-process session store.

use crate::SessionStore;
use splitpay_core::clock::{Clock, SystemClock};
use splitpay_core::types::{CheckoutSession, SessionId};
use splitpay_core::{Result, SplitPayError};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Session store backed by an in-process map.
///
/// Expired entries are dropped on read; there is no background sweeper.
/// The map is single-writer many-reader under a `tokio::sync::RwLock`.
pub struct InMemorySessionStore<C = SystemClock> {
    sessions: RwLock<HashMap<SessionId, CheckoutSession>>,
    clock: C,
}

impl InMemorySessionStore<SystemClock> {
    /// Create a store on the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemorySessionStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemorySessionStore<C> {
    /// Create a store on an injected clock (tests).
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live entries (expired-but-unswept included).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl<C: Clock> SessionStore for InMemorySessionStore<C> {
    async fn create_session(&self, session: CheckoutSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Err(SplitPayError::Internal(
                "session id collision".into(),
            ));
        }
        tracing::debug!(
            session_id = %session.session_id,
            transaction_id = %session.transaction_id,
            expires_at = %session.expires_at,
            "Session created"
        );
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_id: &SessionId) -> Result<CheckoutSession> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(session) if !session.is_expired(now) => return Ok(session.clone()),
                Some(_) => {}
                None => return Err(SplitPayError::SessionNotFound),
            }
        }

        // Expired: drop the entry under the write lock, re-checking in case
        // a concurrent writer replaced it.
        let mut sessions = self.sessions.write().await;
        if sessions.get(session_id).is_some_and(|s| s.is_expired(now)) {
            sessions.remove(session_id);
            tracing::debug!(session_id = %session_id, "Session expired on read");
        }
        Err(SplitPayError::SessionExpired)
    }

    async fn update_session(&self, session: CheckoutSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&session.session_id) {
            return Err(SplitPayError::SessionNotFound);
        }
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::{SESSION_TTL_MINUTES, generate_session_id};
    use chrono::{DateTime, Duration, Utc};
    use splitpay_core::types::{TransactionId, SessionPayment, PaymentId};
    use std::sync::Mutex;
    use uuid::Uuid;

    // Local test clock whose time can be advanced.
    struct StepClock(Mutex<DateTime<Utc>>);

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn session_at(now: DateTime<Utc>) -> CheckoutSession {
        CheckoutSession {
            session_id: generate_session_id(),
            transaction_id: TransactionId(Uuid::new_v4()),
            shop_domain: "demo.myshopify.com".into(),
            checkout_token: "c".repeat(32),
            payments: Vec::new(),
            created_at: now,
            expires_at: now + Duration::minutes(SESSION_TTL_MINUTES),
        }
    }

    #[tokio::test]
    async fn test_create_get_round_trip() {
        let store = InMemorySessionStore::new();
        let session = session_at(Utc::now());
        let id = session.session_id.clone();
        store.create_session(session.clone()).await.unwrap();
        assert_eq!(store.get_session(&id).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let store = InMemorySessionStore::new();
        let err = store.get_session(&SessionId("nope".into())).await.unwrap_err();
        assert_eq!(err, SplitPayError::SessionNotFound);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_on_read() {
        let start = Utc::now();
        let clock = StepClock(Mutex::new(start));
        let session = session_at(start);
        let id = session.session_id.clone();

        let store = InMemorySessionStore::with_clock(clock);
        store.create_session(session).await.unwrap();

        *store.clock.0.lock().unwrap() = start + Duration::minutes(SESSION_TTL_MINUTES + 1);
        let err = store.get_session(&id).await.unwrap_err();
        assert_eq!(err, SplitPayError::SessionExpired);
        assert!(store.is_empty().await);

        // A second read sees plain not-found.
        let err = store.get_session(&id).await.unwrap_err();
        assert_eq!(err, SplitPayError::SessionNotFound);
    }

    #[tokio::test]
    async fn test_update_replaces_payment_list() {
        let store = InMemorySessionStore::new();
        let mut session = session_at(Utc::now());
        let id = session.session_id.clone();
        store.create_session(session.clone()).await.unwrap();

        session.payments.push(SessionPayment {
            payment_id: PaymentId(Uuid::new_v4()),
            provider_intent_id: "pi_abc".into(),
            amount_cents: 5000,
        });
        store.update_session(session.clone()).await.unwrap();
        assert_eq!(store.get_session(&id).await.unwrap().payments.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_session_fails() {
        let store = InMemorySessionStore::new();
        let err = store.update_session(session_at(Utc::now())).await.unwrap_err();
        assert_eq!(err, SplitPayError::SessionNotFound);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemorySessionStore::new();
        let session = session_at(Utc::now());
        let id = session.session_id.clone();
        store.create_session(session).await.unwrap();
        store.delete_session(&id).await.unwrap();
        store.delete_session(&id).await.unwrap();
        assert!(store.is_empty().await);
    }
}
