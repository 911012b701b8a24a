//! Stripe webhook handling
//!
//! Verifies inbound events and reconciles profile subscription state for
//! checkout completion, subscription updates and subscription deletion.
//! Every other event type is acknowledged and ignored.

use std::time::{SystemTime, UNIX_EPOCH};

use time::OffsetDateTime;

use propvest_shared::{SubscriptionStatus, SubscriptionTier, UserId};

use crate::error::{BillingError, BillingResult};
use crate::events::{EventPayload, WebhookEvent};
use crate::signature::{verify_signature, DEFAULT_TOLERANCE_SECS};
use crate::tiers::TierResolver;
use crate::updater::{SubscriptionChange, SubscriptionUpdater};

/// Webhook verification settings
#[derive(Clone)]
pub struct WebhookConfig {
    pub signing_secret: String,
    pub tolerance_secs: u64,
    /// Reject unknown plan identifiers instead of falling back to basic
    pub strict_plans: bool,
}

impl WebhookConfig {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            strict_plans: false,
        }
    }

    /// Read `STRIPE_WEBHOOK_SECRET`, `WEBHOOK_TOLERANCE_SECS` and `STRICT_PLAN_RESOLUTION`
    pub fn from_env() -> BillingResult<Self> {
        let signing_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BillingError::Config("STRIPE_WEBHOOK_SECRET is required".into()))?;

        let tolerance_secs = match std::env::var("WEBHOOK_TOLERANCE_SECS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                BillingError::Config(format!("WEBHOOK_TOLERANCE_SECS is not a number: {}", raw))
            })?,
            Err(_) => DEFAULT_TOLERANCE_SECS,
        };

        let strict_plans = match std::env::var("STRICT_PLAN_RESOLUTION") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                BillingError::Config(format!("STRICT_PLAN_RESOLUTION must be true or false: {}", raw))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            signing_secret,
            tolerance_secs,
            strict_plans,
        })
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("signing_secret", &"[redacted]")
            .field("tolerance_secs", &self.tolerance_secs)
            .field("strict_plans", &self.strict_plans)
            .finish()
    }
}

/// What a delivery did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Profile reconciled
    Applied {
        user_id: UserId,
        tier: SubscriptionTier,
        status: SubscriptionStatus,
    },
    /// Recognized event without a usable user id; nothing to reconcile
    SkippedNoUser { event_type: String },
    /// Event type this service does not act on
    Ignored { event_type: String },
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    config: WebhookConfig,
    resolver: TierResolver,
    updater: SubscriptionUpdater,
}

impl WebhookHandler {
    pub fn new(config: WebhookConfig, resolver: TierResolver, updater: SubscriptionUpdater) -> Self {
        Self {
            config,
            resolver,
            updater,
        }
    }

    /// Verify and parse a Stripe webhook event against the current time
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| {
                tracing::error!("System time error: {}", e);
                BillingError::WebhookSignatureInvalid
            })?
            .as_secs() as i64;

        self.verify_event_at(payload, signature, now)
    }

    /// Verify and parse a Stripe webhook event as of `now` (unix seconds)
    pub fn verify_event_at(
        &self,
        payload: &str,
        signature: &str,
        now: i64,
    ) -> BillingResult<WebhookEvent> {
        verify_signature(
            payload,
            signature,
            &self.config.signing_secret,
            self.config.tolerance_secs,
            now,
        )?;

        let event = WebhookEvent::parse(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse verified webhook event");
            e
        })?;

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type(),
            "Webhook signature verified"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type(),
            "Processing Stripe webhook event"
        );

        match &event.payload {
            EventPayload::CheckoutCompleted(session) => {
                let Some(user_id) = session.user_id() else {
                    return Ok(self.skip_without_user(event));
                };
                let tier = self.resolve_tier(session.plan_id())?;
                self.apply(SubscriptionChange::activate(user_id, tier, now_utc()))
                    .await
            }
            EventPayload::SubscriptionUpdated(subscription) => {
                let Some(user_id) = subscription.user_id() else {
                    return Ok(self.skip_without_user(event));
                };
                let tier = self.resolve_tier(subscription.plan_id())?;
                self.apply(SubscriptionChange::activate(user_id, tier, now_utc()))
                    .await
            }
            EventPayload::SubscriptionDeleted(subscription) => {
                let Some(user_id) = subscription.user_id() else {
                    return Ok(self.skip_without_user(event));
                };
                self.apply(SubscriptionChange::cancel(user_id, now_utc()))
                    .await
            }
            EventPayload::Unhandled { event_type } => {
                tracing::info!(
                    event_type = %event_type,
                    event_id = %event.id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(WebhookOutcome::Ignored {
                    event_type: event_type.clone(),
                })
            }
        }
    }

    /// Verify, parse and handle one delivery
    pub async fn process(&self, payload: &str, signature: &str) -> BillingResult<WebhookOutcome> {
        let event = self.verify_event(payload, signature)?;
        self.handle_event(&event).await
    }

    fn resolve_tier(&self, plan_id: Option<&str>) -> BillingResult<SubscriptionTier> {
        if self.config.strict_plans {
            self.resolver.resolve_strict(plan_id)
        } else {
            Ok(self.resolver.resolve_optional(plan_id))
        }
    }

    async fn apply(&self, change: SubscriptionChange) -> BillingResult<WebhookOutcome> {
        self.updater.apply(&change).await?;
        Ok(WebhookOutcome::Applied {
            user_id: change.user_id,
            tier: change.tier,
            status: change.status,
        })
    }

    fn skip_without_user(&self, event: &WebhookEvent) -> WebhookOutcome {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type(),
            "Webhook event has no user_id in metadata, nothing to reconcile"
        );
        WebhookOutcome::SkippedNoUser {
            event_type: event.event_type().to_string(),
        }
    }
}

fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}
