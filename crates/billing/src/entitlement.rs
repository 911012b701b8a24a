//! Feature entitlements derived from a user's subscription record

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use propvest_shared::{SubscriptionRecord, SubscriptionStatus, SubscriptionTier, UserId};

use crate::error::BillingResult;
use crate::profiles::ProfileStore;

/// Paywalled features unlocked by a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntitlementFeatures {
    /// `None` means unlimited
    pub saved_deals: Option<u32>,
    pub ai_market_commentary: bool,
    pub deal_alerts: bool,
    pub priority_support: bool,
}

impl EntitlementFeatures {
    pub fn for_tier(tier: SubscriptionTier) -> Self {
        match tier {
            SubscriptionTier::Free => Self {
                saved_deals: Some(5),
                ai_market_commentary: false,
                deal_alerts: false,
                priority_support: false,
            },
            SubscriptionTier::Basic => Self {
                saved_deals: Some(50),
                ai_market_commentary: false,
                deal_alerts: true,
                priority_support: false,
            },
            SubscriptionTier::Pro => Self {
                saved_deals: Some(500),
                ai_market_commentary: true,
                deal_alerts: true,
                priority_support: false,
            },
            SubscriptionTier::Premium => Self {
                saved_deals: None,
                ai_market_commentary: true,
                deal_alerts: true,
                priority_support: true,
            },
        }
    }
}

/// What the paywall shows for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlement {
    pub user_id: UserId,
    pub tier: SubscriptionTier,
    pub status: Option<SubscriptionStatus>,
    pub effective_tier: SubscriptionTier,
    #[serde(with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    pub features: EntitlementFeatures,
}

impl From<SubscriptionRecord> for Entitlement {
    fn from(record: SubscriptionRecord) -> Self {
        let effective_tier = record.effective_tier();
        Self {
            user_id: record.user_id,
            tier: record.subscription_tier,
            status: record.subscription_status,
            effective_tier,
            updated_at: record.updated_at,
            features: EntitlementFeatures::for_tier(effective_tier),
        }
    }
}

/// Read-only view over stored subscription state
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn ProfileStore>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Entitlement for `user_id`; users without a record get the free defaults
    pub async fn get(&self, user_id: &UserId) -> BillingResult<Entitlement> {
        let record = self
            .store
            .get(user_id)
            .await?
            .unwrap_or_else(|| SubscriptionRecord::new_default(user_id.clone()));
        Ok(record.into())
    }
}
