//! Persistence of the subscription columns of user profiles

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use propvest_shared::{SubscriptionRecord, SubscriptionStatus, SubscriptionTier, UserId};

use crate::error::{BillingError, BillingResult};
use crate::updater::SubscriptionChange;

/// Storage for profile subscription state
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or update the subscription columns for one user
    async fn upsert_subscription(&self, change: &SubscriptionChange) -> BillingResult<()>;

    async fn get(&self, user_id: &UserId) -> BillingResult<Option<SubscriptionRecord>>;

    /// Every stored record, ordered by user id
    async fn list(&self) -> BillingResult<Vec<SubscriptionRecord>>;
}

/// Postgres-backed store over the `profiles` table
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

type ProfileRow = (String, String, Option<String>, OffsetDateTime);

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: ProfileRow) -> BillingResult<SubscriptionRecord> {
        let (user_id, tier, status, updated_at) = row;
        let corrupt = |detail: String| {
            tracing::error!(user_id = %user_id, detail = %detail, "Corrupt profile row");
            BillingError::Database(format!("corrupt profile row for {}: {}", user_id, detail))
        };

        let parsed_id = UserId::parse(&user_id).ok_or_else(|| corrupt("empty user_id".into()))?;
        let subscription_tier = tier
            .parse::<SubscriptionTier>()
            .map_err(|e| corrupt(e.to_string()))?;
        let subscription_status = status
            .as_deref()
            .map(str::parse::<SubscriptionStatus>)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(SubscriptionRecord {
            user_id: parsed_id,
            subscription_tier,
            subscription_status,
            updated_at: Some(updated_at),
        })
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn upsert_subscription(&self, change: &SubscriptionChange) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, subscription_tier, subscription_status, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                subscription_tier = EXCLUDED.subscription_tier,
                subscription_status = EXCLUDED.subscription_status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(change.user_id.as_str())
        .bind(change.tier.as_str())
        .bind(change.status.as_str())
        .bind(change.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                user_id = %change.user_id,
                error = %e,
                "Failed to upsert profile subscription"
            );
            BillingError::Database(e.to_string())
        })?;

        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> BillingResult<Option<SubscriptionRecord>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT user_id, subscription_tier, subscription_status, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::record_from_row).transpose()
    }

    async fn list(&self) -> BillingResult<Vec<SubscriptionRecord>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(
            r#"
            SELECT user_id, subscription_tier, subscription_status, updated_at
            FROM profiles
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::record_from_row).collect()
    }
}

/// Process-local store for tests and local development.
///
/// Counts writes so callers can assert whether persistence was attempted.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    records: Mutex<HashMap<UserId, SubscriptionRecord>>,
    writes: AtomicUsize,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SubscriptionRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.user_id.clone(), r))
            .collect();
        Self {
            records: Mutex::new(map),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `upsert_subscription` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn records(&self) -> MutexGuard<'_, HashMap<UserId, SubscriptionRecord>> {
        // A panic while holding the lock cannot leave a record half-written
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn upsert_subscription(&self, change: &SubscriptionChange) -> BillingResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records().insert(
            change.user_id.clone(),
            SubscriptionRecord {
                user_id: change.user_id.clone(),
                subscription_tier: change.tier,
                subscription_status: Some(change.status),
                updated_at: Some(change.updated_at),
            },
        );
        Ok(())
    }

    async fn get(&self, user_id: &UserId) -> BillingResult<Option<SubscriptionRecord>> {
        Ok(self.records().get(user_id).cloned())
    }

    async fn list(&self) -> BillingResult<Vec<SubscriptionRecord>> {
        let mut records: Vec<_> = self.records().values().cloned().collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }
}
