//! Subscription Invariants Module
//!
//! Consistency checks over stored profile subscription state. Every write
//! sets tier and status together, so out-of-order update and delete
//! deliveries for one user still end in a consistent record (active paid or
//! cancelled free) and are not visible here. These checks find rows edited
//! outside the reconciler or left behind by a partial migration.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use propvest_shared::{SubscriptionRecord, SubscriptionStatus, SubscriptionTier, UserId};

use crate::error::BillingResult;
use crate::profiles::ProfileStore;

pub const CANCELLED_IS_FREE: &str = "cancelled_is_free";
pub const ACTIVE_IS_PAID: &str = "active_is_paid";
pub const UNSUBSCRIBED_IS_FREE: &str = "unsubscribed_is_free";

/// Result of running a single invariant check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    pub user_id: UserId,
    /// Human-readable description of the violation
    pub description: String,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationSeverity {
    /// User keeps paid features they no longer pay for
    High,
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub records_checked: usize,
    pub checks_run: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

pub struct InvariantChecker {
    store: Arc<dyn ProfileStore>,
}

impl InvariantChecker {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    pub fn available_checks() -> Vec<&'static str> {
        vec![CANCELLED_IS_FREE, ACTIVE_IS_PAID, UNSUBSCRIBED_IS_FREE]
    }

    /// Load every record from the store and check it
    pub async fn run(&self) -> BillingResult<InvariantCheckSummary> {
        let records = self.store.list().await?;
        let summary = Self::check_records(&records);

        for violation in &summary.violations {
            tracing::warn!(
                invariant = %violation.invariant,
                user_id = %violation.user_id,
                severity = %violation.severity,
                "Subscription invariant violated: {}",
                violation.description
            );
        }

        Ok(summary)
    }

    /// Apply every check to `records`
    pub fn check_records(records: &[SubscriptionRecord]) -> InvariantCheckSummary {
        let violations: Vec<InvariantViolation> =
            records.iter().filter_map(Self::check_record).collect();

        let checks_failed = violations
            .iter()
            .map(|v| v.invariant.as_str())
            .collect::<HashSet<_>>()
            .len();

        InvariantCheckSummary {
            checked_at: OffsetDateTime::now_utc(),
            records_checked: records.len(),
            checks_run: Self::available_checks().len(),
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        }
    }

    fn check_record(record: &SubscriptionRecord) -> Option<InvariantViolation> {
        let tier = record.subscription_tier;
        let (invariant, severity, description) = match record.subscription_status {
            Some(SubscriptionStatus::Cancelled) if tier != SubscriptionTier::Free => (
                CANCELLED_IS_FREE,
                ViolationSeverity::High,
                format!("Cancelled subscription still on {} tier", tier),
            ),
            Some(SubscriptionStatus::Active) if tier == SubscriptionTier::Free => (
                ACTIVE_IS_PAID,
                ViolationSeverity::Medium,
                "Active subscription on free tier".to_string(),
            ),
            None if tier != SubscriptionTier::Free => (
                UNSUBSCRIBED_IS_FREE,
                ViolationSeverity::Medium,
                format!("No subscription status but {} tier", tier),
            ),
            _ => return None,
        };

        Some(InvariantViolation {
            invariant: invariant.to_string(),
            user_id: record.user_id.clone(),
            description,
            severity,
        })
    }
}
