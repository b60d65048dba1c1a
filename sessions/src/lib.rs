//! Checkout-session cache.
//!
//! A session is the short-lived coordination record for one widget
//! lifecycle: which transaction is being assembled and which provider
//! authorizations are pending on it. Sessions expire 30 minutes after
//! creation and losing one only aborts an in-flight checkout; the durable
//! rows, not the cache, are the record of money.
//!
//! [`SessionStore`] is the seam: the in-memory implementation here is
//! correct for a single-instance deployment; a horizontally scaled
//! deployment swaps in a replicated KV with TTL semantics behind the same
//! trait.

mod memory;

pub use memory::InMemorySessionStore;

use rand::RngCore;
use rand::rngs::OsRng;
use splitpay_core::Result;
use splitpay_core::types::{CheckoutSession, SessionId};

/// Session TTL in minutes.
pub const SESSION_TTL_MINUTES: i64 = 30;

/// Number of random bytes in a session ID (≥64 bits of entropy required;
/// this is 256).
const SESSION_ID_BYTES: usize = 32;

/// Generate an unguessable session ID: 32 random bytes, hex-encoded.
#[must_use]
pub fn generate_session_id() -> SessionId {
    let mut bytes = [0_u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let mut encoded = String::with_capacity(SESSION_ID_BYTES * 2);
    for byte in bytes {
        encoded.push_str(&format!("{byte:02x}"));
    }
    SessionId(encoded)
}

/// Session storage.
///
/// Reads past expiry behave as not-found; implementations may drop the
/// entry eagerly or lazily, but must never return an expired session.
pub trait SessionStore: Send + Sync {
    /// Store a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if a session with the same ID already exists.
    fn create_session(&self, session: CheckoutSession)
    -> impl Future<Output = Result<()>> + Send;

    /// Fetch a live session.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if absent, `SessionExpired` if past its TTL.
    fn get_session(
        &self,
        session_id: &SessionId,
    ) -> impl Future<Output = Result<CheckoutSession>> + Send;

    /// Replace a session's record (pending-payment list changed).
    ///
    /// # Errors
    ///
    /// `SessionNotFound` if absent.
    fn update_session(&self, session: CheckoutSession)
    -> impl Future<Output = Result<()>> + Send;

    /// Drop a session. Deleting an absent session is a no-op.
    ///
    /// # Errors
    ///
    /// Implementations backed by external stores may fail on I/O.
    fn delete_session(&self, session_id: &SessionId)
    -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_ids_are_hex_and_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let id = generate_session_id();
            assert_eq!(id.0.len(), SESSION_ID_BYTES * 2);
            assert!(id.0.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(id.0));
        }
    }
}
