// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Propvest Billing Module
//!
//! Reconciles locally stored subscription state with Stripe.
//!
//! ## Features
//!
//! - **Webhooks**: Verify Stripe signatures and dispatch checkout/subscription events
//! - **Tier Resolution**: Map Stripe price ids onto internal tiers
//! - **Reconciliation**: Persist tier and status on the user's profile
//! - **Entitlements**: Read-only feature access for the paywall
//! - **Invariants**: Consistency checks over stored subscription state

pub mod entitlement;
pub mod error;
pub mod events;
pub mod invariants;
pub mod profiles;
pub mod signature;
pub mod tiers;
pub mod updater;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

use std::sync::Arc;

// Entitlement
pub use entitlement::{Entitlement, EntitlementFeatures, EntitlementService};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{CheckoutSession, EventPayload, Subscription, WebhookEvent};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Profiles
pub use profiles::{InMemoryProfileStore, PgProfileStore, ProfileStore};

// Tiers
pub use tiers::{PriceIds, TierResolver};

// Updater
pub use updater::{SubscriptionChange, SubscriptionUpdater};

// Webhooks
pub use webhooks::{WebhookConfig, WebhookHandler, WebhookOutcome};

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub entitlements: EntitlementService,
    pub profiles: Arc<dyn ProfileStore>,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a billing service over an explicit store
    pub fn new(config: WebhookConfig, prices: PriceIds, profiles: Arc<dyn ProfileStore>) -> Self {
        let updater = SubscriptionUpdater::new(profiles.clone());

        Self {
            entitlements: EntitlementService::new(profiles.clone()),
            webhooks: WebhookHandler::new(config, TierResolver::new(prices), updater),
            profiles,
        }
    }

    pub fn invariant_checker(&self) -> InvariantChecker {
        InvariantChecker::new(self.profiles.clone())
    }
}
