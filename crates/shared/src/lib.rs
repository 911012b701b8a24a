#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Propvest shared types
//!
//! Domain types for the subscription paywall and database helpers used by
//! both the billing and API crates.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{
    ParseLabelError, SubscriptionRecord, SubscriptionStatus, SubscriptionTier, UserId,
};
