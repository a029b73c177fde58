//! Discount eligibility, venue ranking, and the request-scoped orchestration around them.

pub mod collaborators;
pub mod domain;
pub mod eligibility;
pub mod ranking;
mod retry;
pub mod router;
pub mod service;
pub mod usage;

#[cfg(test)]
mod tests;

pub use collaborators::{
    CollaboratorError, Collaborators, LocationQuery, LocationSource, ProfileSource,
};
pub use domain::{
    read_venues_csv, CandidateVenue, Ownership, PreferenceWeights, StoreTypeFilter,
    TransactionContext, UserId, UserProfile, VenueTags,
};
pub use eligibility::{
    AppliedDiscount, BenefitKind, EligibilityEvaluator, MatchedCredential, RejectedProgram,
    RejectionReason, VenueEvaluation,
};
pub use ranking::{RankedVenue, RankingCandidate, RankingEngine, ScoreComponents, ScoreWeights};
pub use retry::RetryPolicy;
pub use router::recommendation_router;
pub use service::{
    RecommendError, Recommendation, RecommendationConfig, RecommendationRequest,
    RecommendationService, UserRecommendationRequest, MAX_SPEND,
};
pub use usage::{
    InMemoryUsageTracker, PeriodKey, UsageClaim, UsageError, UsageFailurePolicy, UsageTracker,
};
