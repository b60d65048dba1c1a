//! # SplitPay Postgres
//!
//! Durable store for stores, transactions, payments and refunds, plus the
//! ordered migration runner that owns `schema_versions`.
//!
//! Constraints the schema enforces on the database side:
//! - `stores.shop_domain`, `payments.provider_intent_id` and
//!   `refunds.provider_refund_id` are UNIQUE;
//! - payments and refunds cascade-delete with their transaction;
//! - `updated_at` is refreshed by a trigger on every UPDATE.
//!
//! Status transitions are enforced on the application side inside row-locked
//! database transactions (see [`PgStore`]); the `pending → processing`
//! compare-and-set is a conditional UPDATE whose affected-row count decides
//! which of two racing `complete()` calls proceeds.

mod migrations;
mod store;

pub use migrations::apply_migrations;
pub use store::PgStore;
