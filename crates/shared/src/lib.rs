#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Revlens Shared Types
//!
//! Domain records mirrored from the billing provider, plus the Postgres pool
//! and embedded migrations used by every binary in the workspace.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations, DbError};
pub use types::{
    DailyMetricsSnapshot, OrgId, SubscriptionEvent, SubscriptionEventType, UnknownEventType,
};
