//! Edge Case Tests for Subscription Reconciliation
//!
//! Tests boundary conditions and races in:
//! - Signature verification at the handler boundary
//! - Event dispatch and user resolution
//! - Tier resolution through the full handler
//! - Persistence failures and concurrent deliveries

#[cfg(test)]
mod support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use propvest_shared::{SubscriptionRecord, UserId};

    use crate::error::{BillingError, BillingResult};
    use crate::profiles::{InMemoryProfileStore, ProfileStore};
    use crate::signature::sign_payload;
    use crate::tiers::{PriceIds, TierResolver};
    use crate::updater::{SubscriptionChange, SubscriptionUpdater};
    use crate::webhooks::{WebhookConfig, WebhookHandler};

    pub const SECRET: &str = "whsec_edge_case_secret";
    pub const NOW: i64 = 1_700_000_000;

    pub fn prices() -> PriceIds {
        PriceIds {
            basic: Some("price_basic".to_string()),
            pro: Some("price_pro".to_string()),
            premium: Some("price_premium".to_string()),
        }
    }

    pub fn handler_with(store: Arc<dyn ProfileStore>, strict_plans: bool) -> WebhookHandler {
        let mut config = WebhookConfig::new(SECRET);
        config.strict_plans = strict_plans;
        WebhookHandler::new(
            config,
            TierResolver::new(prices()),
            SubscriptionUpdater::new(store),
        )
    }

    pub fn handler(store: Arc<InMemoryProfileStore>) -> WebhookHandler {
        handler_with(store, false)
    }

    pub fn sign(body: &str) -> String {
        sign_payload(body, SECRET, NOW).unwrap()
    }

    pub fn checkout_completed(user_id: Option<&str>, price_id: &str) -> String {
        let mut metadata = json!({ "price_id": price_id });
        if let Some(user_id) = user_id {
            metadata["user_id"] = json!(user_id);
        }
        json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "created": NOW,
            "data": { "object": {
                "id": "cs_test",
                "object": "checkout.session",
                "mode": "subscription",
                "metadata": metadata
            }}
        })
        .to_string()
    }

    pub fn subscription_event(event_type: &str, user_id: Option<&str>, price_id: &str) -> String {
        let metadata = match user_id {
            Some(user_id) => json!({ "user_id": user_id }),
            None => json!({}),
        };
        json!({
            "id": format!("evt_{}", event_type),
            "type": event_type,
            "created": NOW,
            "data": { "object": {
                "id": "sub_test",
                "object": "subscription",
                "status": "active",
                "metadata": metadata,
                "items": { "object": "list", "data": [
                    { "id": "si_test", "price": { "id": price_id } }
                ]}
            }}
        })
        .to_string()
    }

    /// Store whose writes always fail, counting attempts
    #[derive(Default)]
    pub struct FailingStore {
        pub attempts: AtomicUsize,
    }

    #[async_trait]
    impl ProfileStore for FailingStore {
        async fn upsert_subscription(&self, _change: &SubscriptionChange) -> BillingResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(BillingError::Database("connection reset".to_string()))
        }

        async fn get(&self, _user_id: &UserId) -> BillingResult<Option<SubscriptionRecord>> {
            Ok(None)
        }

        async fn list(&self) -> BillingResult<Vec<SubscriptionRecord>> {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod signature_boundary_tests {
    use std::sync::Arc;

    use super::support::*;
    use crate::error::BillingError;
    use crate::profiles::InMemoryProfileStore;

    // =========================================================================
    // Tampered body: rejected before parsing, updater never invoked
    // =========================================================================
    #[tokio::test]
    async fn test_tampered_body_never_reaches_updater() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        let body = checkout_completed(Some("u1"), "price_premium");
        let header = sign(&body);
        let tampered = body.replace("price_premium", "price_basic");

        let result = handler.verify_event_at(&tampered, &header, NOW);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
        assert_eq!(store.write_count(), 0);
    }

    // =========================================================================
    // Signed 301s ago: rejected; 300s ago: accepted
    // =========================================================================
    #[tokio::test]
    async fn test_timestamp_tolerance_at_handler() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store);
        let body = checkout_completed(Some("u1"), "price_pro");
        let header = sign(&body);

        assert!(handler.verify_event_at(&body, &header, NOW + 300).is_ok());
        assert!(matches!(
            handler.verify_event_at(&body, &header, NOW + 301),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    // =========================================================================
    // Valid signature over invalid JSON: malformed payload
    // =========================================================================
    #[tokio::test]
    async fn test_signed_garbage_is_malformed() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());
        let body = "{not json";
        let header = sign(body);

        assert!(matches!(
            handler.verify_event_at(body, &header, NOW),
            Err(BillingError::MalformedPayload(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    // =========================================================================
    // Real clock: a header signed long ago is stale
    // =========================================================================
    #[tokio::test]
    async fn test_process_uses_current_time() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());
        let body = checkout_completed(Some("u1"), "price_pro");
        let header = sign(&body);

        let result = handler.process(&body, &header).await;
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
        assert_eq!(store.write_count(), 0);
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::sync::Arc;

    use super::support::*;
    use crate::error::BillingError;
    use crate::events::{SUBSCRIPTION_DELETED, SUBSCRIPTION_UPDATED};
    use crate::profiles::{InMemoryProfileStore, ProfileStore};
    use crate::webhooks::WebhookOutcome;
    use propvest_shared::{SubscriptionStatus, SubscriptionTier, UserId};

    async fn deliver(
        handler: &crate::webhooks::WebhookHandler,
        body: &str,
    ) -> crate::error::BillingResult<WebhookOutcome> {
        let event = handler.verify_event_at(body, &sign(body), NOW)?;
        handler.handle_event(&event).await
    }

    async fn state_of(store: &InMemoryProfileStore, user: &str) -> (SubscriptionTier, Option<SubscriptionStatus>) {
        let record = store
            .get(&UserId::parse(user).unwrap())
            .await
            .unwrap()
            .expect("record should exist");
        (record.subscription_tier, record.subscription_status)
    }

    // =========================================================================
    // checkout.session.completed for premium: premium/active
    // =========================================================================
    #[tokio::test]
    async fn test_checkout_premium_activates_premium() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        let outcome = deliver(&handler, &checkout_completed(Some("u1"), "price_premium"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                user_id: UserId::parse("u1").unwrap(),
                tier: SubscriptionTier::Premium,
                status: SubscriptionStatus::Active,
            }
        );
        assert_eq!(
            state_of(&store, "u1").await,
            (SubscriptionTier::Premium, Some(SubscriptionStatus::Active))
        );
    }

    // =========================================================================
    // subscription.updated: tier follows the current price
    // =========================================================================
    #[tokio::test]
    async fn test_subscription_updated_changes_tier() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        deliver(&handler, &checkout_completed(Some("u1"), "price_basic"))
            .await
            .unwrap();
        deliver(
            &handler,
            &subscription_event(SUBSCRIPTION_UPDATED, Some("u1"), "price_pro"),
        )
        .await
        .unwrap();

        assert_eq!(
            state_of(&store, "u1").await,
            (SubscriptionTier::Pro, Some(SubscriptionStatus::Active))
        );
    }

    // =========================================================================
    // subscription.deleted: free/cancelled regardless of prior tier
    // =========================================================================
    #[tokio::test]
    async fn test_subscription_deleted_downgrades_from_every_tier() {
        for price in ["price_basic", "price_pro", "price_premium"] {
            let store = Arc::new(InMemoryProfileStore::new());
            let handler = handler(store.clone());

            deliver(&handler, &checkout_completed(Some("u1"), price))
                .await
                .unwrap();
            deliver(
                &handler,
                &subscription_event(SUBSCRIPTION_DELETED, Some("u1"), price),
            )
            .await
            .unwrap();

            assert_eq!(
                state_of(&store, "u1").await,
                (SubscriptionTier::Free, Some(SubscriptionStatus::Cancelled)),
                "prior price {}",
                price
            );
        }
    }

    // =========================================================================
    // Deleted event for a user with no prior record still lands as free/cancelled
    // =========================================================================
    #[tokio::test]
    async fn test_subscription_deleted_without_prior_record() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        deliver(
            &handler,
            &subscription_event(SUBSCRIPTION_DELETED, Some("u9"), "price_pro"),
        )
        .await
        .unwrap();

        assert_eq!(
            state_of(&store, "u9").await,
            (SubscriptionTier::Free, Some(SubscriptionStatus::Cancelled))
        );
    }

    // =========================================================================
    // Missing user_id: zero writes, success outcome
    // =========================================================================
    #[tokio::test]
    async fn test_missing_user_id_skips_persistence() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        let checkout = deliver(&handler, &checkout_completed(None, "price_pro"))
            .await
            .unwrap();
        assert!(matches!(checkout, WebhookOutcome::SkippedNoUser { .. }));

        for event_type in [SUBSCRIPTION_UPDATED, SUBSCRIPTION_DELETED] {
            let outcome = deliver(&handler, &subscription_event(event_type, None, "price_pro"))
                .await
                .unwrap();
            assert_eq!(
                outcome,
                WebhookOutcome::SkippedNoUser {
                    event_type: event_type.to_string()
                }
            );
        }

        assert_eq!(store.write_count(), 0);
    }

    // =========================================================================
    // Unrecognized event type: acknowledged, ignored
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_event_type_is_ignored() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        let body = subscription_event("customer.subscription.created", Some("u1"), "price_pro");
        let outcome = deliver(&handler, &body).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "customer.subscription.created".to_string()
            }
        );
        assert_eq!(store.write_count(), 0);
    }

    // =========================================================================
    // Same event twice: same final tier and status
    // =========================================================================
    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());
        let body = checkout_completed(Some("u1"), "price_pro");

        deliver(&handler, &body).await.unwrap();
        let once = state_of(&store, "u1").await;
        deliver(&handler, &body).await.unwrap();
        let twice = state_of(&store, "u1").await;

        assert_eq!(once, twice);
        assert_eq!(store.write_count(), 2);
    }

    // =========================================================================
    // Unknown price: basic by default, rejected in strict mode
    // =========================================================================
    #[tokio::test]
    async fn test_unknown_price_falls_back_to_basic() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        deliver(&handler, &checkout_completed(Some("u1"), "price_from_old_catalog"))
            .await
            .unwrap();

        assert_eq!(
            state_of(&store, "u1").await,
            (SubscriptionTier::Basic, Some(SubscriptionStatus::Active))
        );
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_unknown_price() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler_with(store.clone(), true);

        let result = deliver(&handler, &checkout_completed(Some("u1"), "price_from_old_catalog")).await;

        assert!(matches!(result, Err(BillingError::UnknownPlan(_))));
        assert_eq!(store.write_count(), 0);
    }

    // =========================================================================
    // Strict mode still cancels: deletion needs no plan
    // =========================================================================
    #[tokio::test]
    async fn test_strict_mode_deletion_ignores_plan() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler_with(store.clone(), true);

        deliver(
            &handler,
            &subscription_event(SUBSCRIPTION_DELETED, Some("u1"), "price_unknown"),
        )
        .await
        .unwrap();

        assert_eq!(
            state_of(&store, "u1").await,
            (SubscriptionTier::Free, Some(SubscriptionStatus::Cancelled))
        );
    }
}

#[cfg(test)]
mod persistence_tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::support::*;
    use crate::error::BillingError;

    // =========================================================================
    // Write failure propagates and is marked retryable
    // =========================================================================
    #[tokio::test]
    async fn test_write_failure_propagates() {
        let store = Arc::new(FailingStore::default());
        let handler = handler_with(store.clone(), false);
        let body = checkout_completed(Some("u1"), "price_pro");

        let event = handler.verify_event_at(&body, &sign(&body), NOW).unwrap();
        let err = handler.handle_event(&event).await.unwrap_err();

        assert!(matches!(err, BillingError::Database(_)));
        assert!(err.is_retryable());
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_only_database_errors_are_retryable() {
        assert!(!BillingError::WebhookSignatureInvalid.is_retryable());
        assert!(!BillingError::WebhookSignatureMissing.is_retryable());
        assert!(!BillingError::MalformedPayload("x".into()).is_retryable());
        assert!(!BillingError::UnknownPlan("x".into()).is_retryable());
    }
}

#[cfg(test)]
mod concurrency_tests {
    use std::sync::Arc;

    use tokio::sync::Barrier;

    use super::support::*;
    use crate::events::{SUBSCRIPTION_DELETED, SUBSCRIPTION_UPDATED};
    use crate::profiles::{InMemoryProfileStore, ProfileStore};
    use propvest_shared::{SubscriptionStatus, SubscriptionTier, UserId};

    // =========================================================================
    // Update and delete racing for one user: last write wins, no error
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_update_delete_race_ends_in_a_valid_state() {
        for _ in 0..20 {
            let store = Arc::new(InMemoryProfileStore::new());
            let handler = handler(store.clone());
            let barrier = Arc::new(Barrier::new(2));

            let bodies = [
                subscription_event(SUBSCRIPTION_UPDATED, Some("u1"), "price_pro"),
                subscription_event(SUBSCRIPTION_DELETED, Some("u1"), "price_pro"),
            ];

            let mut handles = Vec::new();
            for body in bodies {
                let handler = handler.clone();
                let barrier = Arc::clone(&barrier);
                handles.push(tokio::spawn(async move {
                    let event = handler.verify_event_at(&body, &sign(&body), NOW)?;
                    barrier.wait().await;
                    handler.handle_event(&event).await
                }));
            }

            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let record = store
                .get(&UserId::parse("u1").unwrap())
                .await
                .unwrap()
                .unwrap();
            let end_state = (record.subscription_tier, record.subscription_status);
            assert!(
                end_state == (SubscriptionTier::Pro, Some(SubscriptionStatus::Active))
                    || end_state == (SubscriptionTier::Free, Some(SubscriptionStatus::Cancelled)),
                "unexpected end state {:?}",
                end_state
            );
            assert_eq!(store.write_count(), 2);
        }
    }

    // =========================================================================
    // Different users never interfere
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_independent_users_reconcile_independently() {
        let store = Arc::new(InMemoryProfileStore::new());
        let handler = handler(store.clone());

        let mut handles = Vec::new();
        for i in 0..10 {
            let handler = handler.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("user-{}", i);
                let body = checkout_completed(Some(&user), "price_premium");
                let event = handler.verify_event_at(&body, &sign(&body), NOW)?;
                handler.handle_event(&event).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 10);
        assert!(records
            .iter()
            .all(|r| r.subscription_tier == SubscriptionTier::Premium
                && r.subscription_status == Some(SubscriptionStatus::Active)));
    }
}
