//! Plan identifier to subscription tier mapping

use propvest_shared::SubscriptionTier;

use crate::error::{BillingError, BillingResult};

/// Stripe price ids for each paid tier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceIds {
    pub basic: Option<String>,
    pub pro: Option<String>,
    pub premium: Option<String>,
}

impl PriceIds {
    /// Read `STRIPE_PRICE_BASIC`, `STRIPE_PRICE_PRO` and `STRIPE_PRICE_PREMIUM`
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            basic: read("STRIPE_PRICE_BASIC"),
            pro: read("STRIPE_PRICE_PRO"),
            premium: read("STRIPE_PRICE_PREMIUM"),
        }
    }
}

/// Maps provider plan identifiers onto internal tiers.
///
/// Known identifiers are the configured price ids plus the canonical tier
/// names (`basic`, `pro`, `premium`, any case) used as lookup keys.
/// `free` is never produced: it is not purchasable.
#[derive(Debug, Clone, Default)]
pub struct TierResolver {
    prices: PriceIds,
}

impl TierResolver {
    pub fn new(prices: PriceIds) -> Self {
        Self { prices }
    }

    /// Known tier for `plan_id`, if any
    pub fn lookup(&self, plan_id: &str) -> Option<SubscriptionTier> {
        let plan_id = plan_id.trim();
        if plan_id.is_empty() {
            return None;
        }

        let matches = |configured: &Option<String>| configured.as_deref() == Some(plan_id);
        if matches(&self.prices.premium) {
            return Some(SubscriptionTier::Premium);
        }
        if matches(&self.prices.pro) {
            return Some(SubscriptionTier::Pro);
        }
        if matches(&self.prices.basic) {
            return Some(SubscriptionTier::Basic);
        }

        match plan_id.parse::<SubscriptionTier>() {
            Ok(tier) if tier.is_paid() => Some(tier),
            _ => None,
        }
    }

    /// Resolve a plan, falling back to `basic` for anything unrecognized.
    ///
    /// The fallback silently mis-tiers unknown plans; see [`Self::resolve_strict`].
    pub fn resolve(&self, plan_id: &str) -> SubscriptionTier {
        self.lookup(plan_id).unwrap_or_else(|| {
            tracing::warn!(
                plan_id = %plan_id,
                "Unrecognized plan identifier, falling back to basic tier"
            );
            SubscriptionTier::Basic
        })
    }

    /// Like [`Self::resolve`], with an absent plan also treated as `basic`
    pub fn resolve_optional(&self, plan_id: Option<&str>) -> SubscriptionTier {
        match plan_id {
            Some(plan_id) => self.resolve(plan_id),
            None => {
                tracing::warn!("Event carries no plan identifier, falling back to basic tier");
                SubscriptionTier::Basic
            }
        }
    }

    /// Resolve a plan, rejecting unknown or absent identifiers
    pub fn resolve_strict(&self, plan_id: Option<&str>) -> BillingResult<SubscriptionTier> {
        let plan_id = plan_id.unwrap_or_default();
        self.lookup(plan_id)
            .ok_or_else(|| BillingError::UnknownPlan(plan_id.to_string()))
    }
}
