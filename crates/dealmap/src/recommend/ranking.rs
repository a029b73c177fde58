use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogSnapshot;

use super::domain::{CandidateVenue, Ownership, PreferenceWeights, UserProfile, VenueTags};
use super::eligibility::{AppliedDiscount, RejectedProgram, VenueEvaluation};

/// Blend of the three normalized ranking signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreWeights {
    pub savings: f64,
    pub distance: f64,
    pub preference: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            savings: 1.0 / 3.0,
            distance: 1.0 / 3.0,
            preference: 1.0 / 3.0,
        }
    }
}

impl ScoreWeights {
    /// Weights scaled to sum to one. Negative or non-finite entries count as zero; an all-zero
    /// set falls back to equal thirds.
    pub fn normalized(&self) -> Self {
        let clean = |value: f64| if value.is_finite() { value.max(0.0) } else { 0.0 };
        let savings = clean(self.savings);
        let distance = clean(self.distance);
        let preference = clean(self.preference);
        let total = savings + distance + preference;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            savings: savings / total,
            distance: distance / total,
            preference: preference / total,
        }
    }
}

/// Normalized signals behind a composite score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub savings: f64,
    pub distance: f64,
    pub preference: f64,
}

/// A venue paired with its evaluation, ready for ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingCandidate {
    pub venue: CandidateVenue,
    pub ownership: Ownership,
    pub evaluation: VenueEvaluation,
}

impl RankingCandidate {
    /// Ownership comes from the venue when the location source knows it, then from the catalog
    /// brand. Venues with no catalog brand are independents.
    pub fn classify(
        venue: CandidateVenue,
        evaluation: VenueEvaluation,
        snapshot: &CatalogSnapshot,
    ) -> Self {
        let ownership = venue.ownership.unwrap_or_else(|| {
            let brand = venue.brand_id.or_else(|| {
                venue
                    .branch_id
                    .and_then(|id| snapshot.branch(id))
                    .map(|branch| branch.brand_id)
            });
            match brand.and_then(|id| snapshot.brand(id)) {
                Some(brand) if brand.is_franchise => Ownership::Franchise,
                _ => Ownership::Independent,
            }
        });

        Self {
            venue,
            ownership,
            evaluation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedVenue {
    pub rank: usize,
    pub venue: CandidateVenue,
    pub ownership: Ownership,
    pub applied_discounts: Vec<AppliedDiscount>,
    pub other_programs: Vec<RejectedProgram>,
    pub best_savings: Decimal,
    pub best_accrual: Decimal,
    pub stackable_savings: Decimal,
    pub best_discount_rate: f64,
    pub composite_score: f64,
    pub components: ScoreComponents,
}

/// Orders evaluated venues by composite score.
#[derive(Debug, Clone, Default)]
pub struct RankingEngine {
    default_weights: ScoreWeights,
}

impl RankingEngine {
    pub fn new(default_weights: ScoreWeights) -> Self {
        Self { default_weights }
    }

    pub fn default_weights(&self) -> ScoreWeights {
        self.default_weights
    }

    /// Filter by the profile's store type, score, and sort into a total order:
    /// composite descending, then best discount rate descending, distance ascending, venue
    /// name, and finally brand/branch identity.
    pub fn rank(
        &self,
        candidates: Vec<RankingCandidate>,
        profile: &UserProfile,
    ) -> Vec<RankedVenue> {
        let before = candidates.len();
        let candidates: Vec<RankingCandidate> = candidates
            .into_iter()
            .filter(|candidate| profile.franchise_filter.admits(candidate.ownership))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let weights = profile
            .score_weights
            .unwrap_or(self.default_weights)
            .normalized();

        let max_savings = candidates
            .iter()
            .map(|candidate| candidate.evaluation.best_savings())
            .max()
            .unwrap_or(Decimal::ZERO);
        let (min_distance, max_distance) = distance_bounds(&candidates);

        let mut scored: Vec<RankedVenue> = candidates
            .into_iter()
            .map(|candidate| {
                let best_savings = candidate.evaluation.best_savings();
                let components = ScoreComponents {
                    savings: savings_score(best_savings, max_savings),
                    distance: distance_score(
                        candidate.venue.distance_meters,
                        min_distance,
                        max_distance,
                    ),
                    preference: preference_score(
                        &profile.preference_weights,
                        &candidate.venue.tags,
                    ),
                };
                let composite_score = weights.savings * components.savings
                    + weights.distance * components.distance
                    + weights.preference * components.preference;

                RankedVenue {
                    rank: 0,
                    ownership: candidate.ownership,
                    best_savings,
                    best_accrual: candidate.evaluation.best_accrual(),
                    stackable_savings: candidate.evaluation.stackable_savings(),
                    best_discount_rate: candidate.evaluation.best_rate(),
                    composite_score,
                    components,
                    applied_discounts: candidate.evaluation.applied,
                    other_programs: candidate.evaluation.rejected,
                    venue: candidate.venue,
                }
            })
            .collect();

        scored.sort_by(compare_ranked);
        for (index, ranked) in scored.iter_mut().enumerate() {
            ranked.rank = index + 1;
        }

        debug!(
            candidates = before,
            ranked = scored.len(),
            filter = ?profile.franchise_filter,
            "venues ranked"
        );

        scored
    }
}

fn compare_ranked(a: &RankedVenue, b: &RankedVenue) -> Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then_with(|| b.best_discount_rate.total_cmp(&a.best_discount_rate))
        .then_with(|| a.venue.distance_meters.total_cmp(&b.venue.distance_meters))
        .then_with(|| a.venue.name.cmp(&b.venue.name))
        .then_with(|| {
            (a.venue.brand_id, a.venue.branch_id).cmp(&(b.venue.brand_id, b.venue.branch_id))
        })
}

fn distance_bounds(candidates: &[RankingCandidate]) -> (f64, f64) {
    candidates
        .iter()
        .map(|candidate| clean_distance(candidate.venue.distance_meters))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
            (lo.min(d), hi.max(d))
        })
}

fn clean_distance(distance: f64) -> f64 {
    if distance.is_finite() {
        distance.max(0.0)
    } else {
        f64::MAX
    }
}

fn savings_score(savings: Decimal, max_savings: Decimal) -> f64 {
    if max_savings <= Decimal::ZERO {
        return 0.0;
    }
    (savings / max_savings).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
}

/// Closest candidate scores 1, farthest 0. A set with one distinct distance scores 1 throughout.
fn distance_score(distance: f64, min: f64, max: f64) -> f64 {
    let spread = max - min;
    if !spread.is_finite() || spread <= f64::EPSILON {
        return 1.0;
    }
    ((max - clean_distance(distance)) / spread).clamp(0.0, 1.0)
}

fn preference_score(weights: &PreferenceWeights, tags: &VenueTags) -> f64 {
    let clamp = |value: f64| {
        if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        }
    };
    let pairs = [
        (weights.cost_sensitivity, tags.cost_effectiveness),
        (weights.ambiance, tags.ambiance),
        (weights.group_affinity, tags.group_friendly),
    ];

    let total_weight: f64 = pairs.iter().map(|(weight, _)| clamp(*weight)).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let dot: f64 = pairs
        .iter()
        .map(|(weight, tag)| clamp(*weight) * clamp(*tag))
        .sum();
    (dot / total_weight).clamp(0.0, 1.0)
}
