//! Subscription updater: the only writer of profile subscription columns

use std::sync::Arc;

use time::OffsetDateTime;

use propvest_shared::{SubscriptionStatus, SubscriptionTier, UserId};

use crate::error::BillingResult;
use crate::profiles::ProfileStore;

/// Target subscription state for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub user_id: UserId,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub updated_at: OffsetDateTime,
}

impl SubscriptionChange {
    /// Paid plan purchased or changed
    pub fn activate(user_id: UserId, tier: SubscriptionTier, updated_at: OffsetDateTime) -> Self {
        Self {
            user_id,
            tier,
            status: SubscriptionStatus::Active,
            updated_at,
        }
    }

    /// Subscription ended: back to the free tier
    pub fn cancel(user_id: UserId, updated_at: OffsetDateTime) -> Self {
        Self {
            user_id,
            tier: SubscriptionTier::Free,
            status: SubscriptionStatus::Cancelled,
            updated_at,
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionUpdater {
    store: Arc<dyn ProfileStore>,
}

impl SubscriptionUpdater {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Persist `change` with a single upsert. Re-applying it is harmless.
    pub async fn apply(&self, change: &SubscriptionChange) -> BillingResult<()> {
        self.store.upsert_subscription(change).await?;

        tracing::info!(
            user_id = %change.user_id,
            tier = %change.tier,
            status = %change.status,
            "Profile subscription reconciled"
        );

        Ok(())
    }
}
