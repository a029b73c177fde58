//! Per-venue discount eligibility.
//!
//! A program applies to a venue when it is active, its provider is active, the venue is in its
//! brand/branch scope and not excluded at branch level, and every gate passes in order:
//! temporal, channel, credential, predicate, usage. Programs that reach a gate and fail it are
//! reported with a reason so callers can explain why a deal is missing.

mod gates;
mod value;

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{
    BrandId, CatalogSnapshot, Channel, DiscountKind, DiscountProgram, ProgramId,
    ProviderCategory, ScopeMatch, ValidatedProgram,
};

use super::domain::{CandidateVenue, TransactionContext, UserId, UserProfile};
use super::usage::{PeriodKey, UsageClaim, UsageFailurePolicy, UsageTracker};

pub(crate) use value::{benefit_rate, benefit_value};

/// Whether a program reduces the bill now or accrues points for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BenefitKind {
    Discount,
    Accrual,
}

/// Credential from the profile that satisfied one required category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedCredential {
    pub category: ProviderCategory,
    pub credential: String,
}

/// Why a program in scope for a venue did not apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    ExcludedAtBranch,
    OutsideValidity {
        valid_from: Option<NaiveDate>,
        valid_to: Option<NaiveDate>,
    },
    DayNotAllowed {
        weekday: String,
    },
    OutsideTimeWindow {
        from: Option<NaiveTime>,
        to: Option<NaiveTime>,
    },
    ChannelMismatch {
        required: Channel,
    },
    MissingCredential {
        category: ProviderCategory,
    },
    BelowMinimumSpend {
        minimum: Decimal,
    },
    AboveMaximumSpend {
        maximum: Decimal,
    },
    ExcludedSubcategory {
        subcategory: String,
    },
    UsageCapReached {
        used: u32,
        limit: u32,
    },
    BrandDailyCapReached {
        used: u32,
        limit: u32,
    },
    UsageTrackerUnavailable,
}

impl RejectionReason {
    pub fn summary(&self) -> String {
        match self {
            RejectionReason::ExcludedAtBranch => "excluded at this branch".to_string(),
            RejectionReason::OutsideValidity {
                valid_from,
                valid_to,
            } => {
                let from = valid_from.map_or_else(|| "open".to_string(), |d| d.to_string());
                let to = valid_to.map_or_else(|| "open".to_string(), |d| d.to_string());
                format!("valid from {from} to {to}")
            }
            RejectionReason::DayNotAllowed { weekday } => format!("not offered on {weekday}"),
            RejectionReason::OutsideTimeWindow { from, to } => {
                let from = from.map_or_else(|| "00:00".to_string(), |t| t.format("%H:%M").to_string());
                let to = to.map_or_else(|| "24:00".to_string(), |t| t.format("%H:%M").to_string());
                format!("available {from}-{to} only")
            }
            RejectionReason::ChannelMismatch { required } => {
                format!("{} purchases only", required.label().to_lowercase())
            }
            RejectionReason::MissingCredential { category } => {
                format!("requires a qualifying {} credential", category.label())
            }
            RejectionReason::BelowMinimumSpend { minimum } => {
                format!("minimum spend {minimum}")
            }
            RejectionReason::AboveMaximumSpend { maximum } => {
                format!("maximum spend {maximum}")
            }
            RejectionReason::ExcludedSubcategory { subcategory } => {
                format!("not valid for {subcategory}")
            }
            RejectionReason::UsageCapReached { used, limit } => {
                format!("usage limit reached ({used}/{limit})")
            }
            RejectionReason::BrandDailyCapReached { used, limit } => {
                format!("daily limit at this brand reached ({used}/{limit})")
            }
            RejectionReason::UsageTrackerUnavailable => {
                "usage could not be verified".to_string()
            }
        }
    }
}

/// Program that applies to the venue, priced for the request's spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount {
    pub program_id: ProgramId,
    pub program_name: String,
    pub provider_name: String,
    pub provider_category: ProviderCategory,
    pub benefit: BenefitKind,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub rate: f64,
    pub matched_credentials: Vec<MatchedCredential>,
    pub combinable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<ProgramId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_menu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage_claims: Vec<UsageClaim>,
}

/// Program in scope for the venue that failed a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedProgram {
    pub program_id: ProgramId,
    pub program_name: String,
    pub reason: RejectionReason,
    pub detail: String,
}

/// Everything the evaluator learned about one venue.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VenueEvaluation {
    pub spend: Decimal,
    /// Sorted by value descending, then program id.
    pub applied: Vec<AppliedDiscount>,
    pub rejected: Vec<RejectedProgram>,
    pub skipped_malformed: usize,
}

impl VenueEvaluation {
    pub fn new(spend: Decimal) -> Self {
        Self {
            spend,
            ..Self::default()
        }
    }

    fn reject(&mut self, program: &DiscountProgram, reason: RejectionReason) {
        self.rejected.push(RejectedProgram {
            program_id: program.id,
            program_name: program.name.clone(),
            detail: reason.summary(),
            reason,
        });
    }

    pub fn discounts(&self) -> impl Iterator<Item = &AppliedDiscount> {
        self.applied
            .iter()
            .filter(|applied| applied.benefit == BenefitKind::Discount)
    }

    pub fn best_discount(&self) -> Option<&AppliedDiscount> {
        self.discounts().next()
    }

    pub fn best_savings(&self) -> Decimal {
        self.best_discount()
            .map_or(Decimal::ZERO, |applied| applied.value)
    }

    pub fn best_rate(&self) -> f64 {
        self.best_discount().map_or(0.0, |applied| applied.rate)
    }

    pub fn best_accrual(&self) -> Decimal {
        self.applied
            .iter()
            .filter(|applied| applied.benefit == BenefitKind::Accrual)
            .map(|applied| applied.value)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    /// Savings from stacking combinable discounts, never below [`Self::best_savings`].
    ///
    /// Combinable discounts are taken largest first, skipping any that conflicts with one
    /// already taken. The total is capped at the spend.
    pub fn stackable_savings(&self) -> Decimal {
        let mut chosen: Vec<&AppliedDiscount> = Vec::new();
        for candidate in self.discounts().filter(|applied| applied.combinable) {
            let conflicting = chosen.iter().any(|held| {
                held.conflicts_with.contains(&candidate.program_id)
                    || candidate.conflicts_with.contains(&held.program_id)
            });
            if !conflicting {
                chosen.push(candidate);
            }
        }

        let stacked = chosen
            .iter()
            .fold(Decimal::ZERO, |total, applied| total.saturating_add(applied.value));
        stacked
            .max(self.best_savings())
            .min(self.spend.max(Decimal::ZERO))
    }
}

/// Evaluates catalog programs against one venue at a time.
#[derive(Clone)]
pub struct EligibilityEvaluator {
    usage: Arc<dyn UsageTracker>,
    policy: UsageFailurePolicy,
}

impl EligibilityEvaluator {
    pub fn new(usage: Arc<dyn UsageTracker>, policy: UsageFailurePolicy) -> Self {
        Self { usage, policy }
    }

    pub fn policy(&self) -> UsageFailurePolicy {
        self.policy
    }

    pub async fn evaluate(
        &self,
        profile: &UserProfile,
        venue: &CandidateVenue,
        context: &TransactionContext,
        snapshot: &CatalogSnapshot,
    ) -> VenueEvaluation {
        let mut evaluation = VenueEvaluation::new(context.spend);
        let brand = venue.brand_id.or_else(|| {
            venue
                .branch_id
                .and_then(|id| snapshot.branch(id))
                .map(|branch| branch.brand_id)
        });

        for program in snapshot.programs_touching(brand, venue.branch_id) {
            if !program.is_active {
                continue;
            }

            let scope = snapshot
                .applicability(program.id)
                .map_or(ScopeMatch::Unrelated, |rule| {
                    rule.matches(brand, venue.branch_id)
                });
            match scope {
                ScopeMatch::Brand | ScopeMatch::Branch => {}
                ScopeMatch::BranchExcluded => {
                    evaluation.reject(program, RejectionReason::ExcludedAtBranch);
                    continue;
                }
                ScopeMatch::BrandExcluded | ScopeMatch::Unrelated => continue,
            }

            let validated = match snapshot.validate(program) {
                Ok(validated) => validated,
                Err(warning) => {
                    warn!(venue = %venue.name, %warning, "skipping malformed program");
                    evaluation.skipped_malformed += 1;
                    continue;
                }
            };
            if !validated.provider.is_active {
                continue;
            }

            match self
                .check(profile, venue, brand, context, snapshot, &validated)
                .await
            {
                Ok(applied) => evaluation.applied.push(applied),
                Err(reason) => evaluation.reject(program, reason),
            }
        }

        evaluation.applied.sort_by(|a, b| {
            b.value
                .cmp(&a.value)
                .then_with(|| a.program_id.cmp(&b.program_id))
        });

        debug!(
            venue = %venue.name,
            applied = evaluation.applied.len(),
            rejected = evaluation.rejected.len(),
            skipped = evaluation.skipped_malformed,
            "venue evaluated"
        );

        evaluation
    }

    async fn check(
        &self,
        profile: &UserProfile,
        venue: &CandidateVenue,
        brand: Option<BrandId>,
        context: &TransactionContext,
        snapshot: &CatalogSnapshot,
        validated: &ValidatedProgram<'_>,
    ) -> Result<AppliedDiscount, RejectionReason> {
        let program = validated.program;

        gates::temporal_gate(program, context.at)?;
        gates::channel_gate(program, context.channel)?;
        let matched_credentials =
            gates::credential_gate(snapshot.required_credentials(program.id), profile)?;
        gates::predicate_gate(program, venue, context)?;
        let usage_claims = self.usage_gate(profile, program, brand, context.at).await?;

        let benefit = if program.is_discount {
            BenefitKind::Discount
        } else {
            BenefitKind::Accrual
        };
        let value = benefit_value(
            &validated.shape,
            program.max_amount,
            context.spend,
            benefit == BenefitKind::Discount,
        );

        Ok(AppliedDiscount {
            program_id: program.id,
            program_name: program.name.clone(),
            provider_name: validated.provider.name.clone(),
            provider_category: validated.provider.category,
            benefit,
            kind: validated.shape.kind(),
            value,
            rate: benefit_rate(value, context.spend),
            matched_credentials,
            combinable: program.combinable,
            conflicts_with: program.conflicts_with.iter().copied().collect(),
            qualification: program.qualification.clone(),
            application_menu: program.application_menu.clone(),
            required_level: program.required_level.clone(),
            usage_claims,
        })
    }

    /// Anonymous profiles have no counters; capped programs apply without claims.
    async fn usage_gate(
        &self,
        profile: &UserProfile,
        program: &DiscountProgram,
        brand: Option<BrandId>,
        at: NaiveDateTime,
    ) -> Result<Vec<UsageClaim>, RejectionReason> {
        let Some(user) = profile.user_id.as_ref() else {
            return Ok(Vec::new());
        };

        let mut claims = Vec::new();

        if let Some(limit) = program.max_usage_count {
            let period = PeriodKey::for_period(program.usage_period, at);
            if let Some(used) = self.read_usage(user, program.id, &period).await? {
                if used >= limit {
                    return Err(RejectionReason::UsageCapReached { used, limit });
                }
            }
            claims.push(UsageClaim {
                user_id: user.clone(),
                program_id: program.id,
                period,
            });
        }

        if let Some(brand) = brand {
            let caps: Vec<u32> = program.daily_brand_caps().collect();
            for limit in caps {
                let period = PeriodKey::daily_for_brand(brand, at);
                if let Some(used) = self.read_usage(user, program.id, &period).await? {
                    if used >= limit {
                        return Err(RejectionReason::BrandDailyCapReached { used, limit });
                    }
                }
                if !claims.iter().any(|claim| claim.period == period) {
                    claims.push(UsageClaim {
                        user_id: user.clone(),
                        program_id: program.id,
                        period,
                    });
                }
            }
        }

        Ok(claims)
    }

    /// `Ok(None)` means the tracker failed and the policy lets the program through.
    async fn read_usage(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<Option<u32>, RejectionReason> {
        match self.usage.usage_count(user, program, period).await {
            Ok(count) => Ok(Some(count)),
            Err(err) => match self.policy {
                UsageFailurePolicy::FailClosed => {
                    warn!(%program, period = %period.0, error = %err, "usage lookup failed; denying capped program");
                    Err(RejectionReason::UsageTrackerUnavailable)
                }
                UsageFailurePolicy::FailOpen => {
                    warn!(%program, period = %period.0, error = %err, "usage lookup failed; allowing capped program");
                    Ok(None)
                }
            },
        }
    }
}

impl std::fmt::Debug for EligibilityEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EligibilityEvaluator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
