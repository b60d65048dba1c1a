//! # SplitPay Testing
//!
//! Testing utilities shared across the workspace:
//! - [`mocks`]: scripted mock implementations of the payment provider and
//!   commerce platform, with recorded call logs for asserting fan-out and
//!   compensation behavior;
//! - [`memory_repo`]: a full in-memory [`splitpay_core::Repository`]
//!   implementation enforcing the same status-transition rules as the
//!   `PostgreSQL` store, so orchestrator scenarios run at memory speed;
//! - [`FixedClock`]: deterministic, advanceable time.

pub mod memory_repo;
pub mod mocks;

pub use memory_repo::InMemoryRepository;
pub use mocks::{ConfirmScript, MockPaymentProvider, MockPlatform};

use chrono::{DateTime, Duration, Utc};
use splitpay_core::clock::Clock;
use std::sync::Mutex;

/// Deterministic clock for tests; advanceable, never wall-time.
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Move the clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (test bug).
    #[allow(clippy::unwrap_used)]
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap();
        *time += by;
    }
}

impl Clock for FixedClock {
    #[allow(clippy::unwrap_used)]
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

/// Create a fixed clock at a stable test epoch (2025-06-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}
