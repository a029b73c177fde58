use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::catalog::{BrandId, ProgramId, UsagePeriod};

use super::domain::UserId;

/// Counter bucket a usage count is kept under, e.g. `D2025-11-05` or `M2025-11`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey(pub String);

impl PeriodKey {
    pub fn for_period(period: UsagePeriod, at: NaiveDateTime) -> Self {
        match period {
            UsagePeriod::Daily => Self(at.format("D%Y-%m-%d").to_string()),
            UsagePeriod::Monthly => Self(at.format("M%Y-%m").to_string()),
            UsagePeriod::Unlimited => Self("ALL".to_string()),
        }
    }

    /// Daily bucket for one brand, e.g. `D2025-11-05@brand-3`.
    ///
    /// Counters are keyed by user, program and period, so this caps one program's uses at
    /// one brand per day; other programs at the same brand keep their own counts.
    pub fn daily_for_brand(brand: BrandId, at: NaiveDateTime) -> Self {
        Self(format!("{}@{brand}", Self::for_period(UsagePeriod::Daily, at).0))
    }
}

/// A usage the caller should record if the user redeems the attached discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageClaim {
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub period: PeriodKey,
}

/// Usage tracker failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("usage tracker unavailable: {0}")]
    Unavailable(String),
}

/// Contract of the external per-user usage counter service.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn usage_count(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<u32, UsageError>;

    async fn record_usage(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<(), UsageError>;
}

/// How the evaluator treats a tracker it cannot reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageFailurePolicy {
    /// Treat the cap as reached.
    #[default]
    FailClosed,
    /// Allow the program and keep going.
    FailOpen,
}

impl UsageFailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail_closed" | "closed" => Some(Self::FailClosed),
            "fail_open" | "open" => Some(Self::FailOpen),
            _ => None,
        }
    }
}

type UsageKey = (UserId, ProgramId, PeriodKey);

/// Process-local tracker for demos and tests; production deployments talk to the counter
/// service instead.
#[derive(Debug, Default)]
pub struct InMemoryUsageTracker {
    counts: Mutex<HashMap<UsageKey, u32>>,
}

impl InMemoryUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, user: &UserId, program: ProgramId, period: &PeriodKey) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(user.clone(), program, period.clone()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl UsageTracker for InMemoryUsageTracker {
    async fn usage_count(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<u32, UsageError> {
        Ok(self.count(user, program, period))
    }

    async fn record_usage(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<(), UsageError> {
        let mut guard = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        *guard
            .entry((user.clone(), program, period.clone()))
            .or_insert(0) += 1;
        Ok(())
    }
}
