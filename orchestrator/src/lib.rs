//! # SplitPay Orchestrator
//!
//! The payment state machine. One checkout is 2–5 independent card holds
//! that must end in exactly one of two worlds: every card captured and a
//! platform order created, or every hold released and nothing charged.
//!
//! ```text
//!  init ──► add_card* ──► complete ─┬─► authorize fan-out (all settle)
//!     (session, 30 min TTL)         │        │ any failure
//!                                   │        ▼
//!                                   │   cancel every authorized sibling
//!                                   │   transaction → failed
//!                                   │
//!                                   └─► capture fan-out (all settle)
//!                                            │ all captured
//!                                            ▼
//!                                   transaction → completed
//!                                   platform order created, session dropped
//! ```
//!
//! Concurrency rules (binding):
//! - a capture never starts before every authorization reported success;
//! - a compensation cancel only targets intents whose authorization
//!   succeeded;
//! - two concurrent `complete()` calls are serialized by the
//!   `pending → processing` compare-and-set in the store, not by a process
//!   lock, so nothing is held across a network call.
//!
//! The [`reconciler`] applies provider-pushed events (the provider is the
//! system of record for card state), and [`repair`] re-submits platform
//! orders for transactions that captured money but crashed before order
//! creation.

pub mod checkout;
pub mod reconciler;
pub mod repair;
pub mod submitter;

pub use checkout::{
    AddCardOutcome, CardSubmission, CheckoutOrchestrator, CompleteOutcome, InitOutcome,
    RefundOutcome, RefundResult,
};
pub use reconciler::Reconciler;
pub use repair::repair_unsubmitted_orders;
