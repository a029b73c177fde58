use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::catalog::{CatalogHandle, CatalogSummary, Channel};

use super::collaborators::{CollaboratorError, Collaborators, LocationQuery};
use super::domain::{CandidateVenue, TransactionContext, UserId, UserProfile};
use super::eligibility::EligibilityEvaluator;
use super::ranking::{RankedVenue, RankingCandidate, RankingEngine, ScoreWeights};
use super::retry::{retry_with_backoff, RetryPolicy};
use super::usage::{UsageClaim, UsageError, UsageFailurePolicy, UsageTracker};

/// Largest spend a request may carry: one trillion KRW.
pub const MAX_SPEND: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Tunables for request handling.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationConfig {
    pub request_deadline: Duration,
    pub max_concurrency: usize,
    pub default_spend: Decimal,
    pub usage_failure_policy: UsageFailurePolicy,
    pub retry: RetryPolicy,
    pub default_weights: ScoreWeights,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_millis(2_000),
            max_concurrency: 16,
            default_spend: Decimal::from(15_000),
            usage_failure_policy: UsageFailurePolicy::FailClosed,
            retry: RetryPolicy::default(),
            default_weights: ScoreWeights::default(),
        }
    }
}

/// Body of a recommendation call with caller-supplied profile and candidates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(default)]
    pub profile: UserProfile,
    #[serde(default)]
    pub venues: Vec<CandidateVenue>,
    #[serde(default)]
    pub at: Option<NaiveDateTime>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub spend: Option<Decimal>,
}

/// Body of a recommendation call resolved through the profile and location collaborators.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecommendationRequest {
    pub location: LocationQuery,
    #[serde(default)]
    pub at: Option<NaiveDateTime>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub spend: Option<Decimal>,
}

/// Ranked venues plus the context they were evaluated under.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub catalog_version: u64,
    pub evaluated_at: NaiveDateTime,
    pub channel: Channel,
    pub spend: Decimal,
    /// Set when the deadline cut evaluation short.
    pub partial: bool,
    pub evaluated: usize,
    pub total_candidates: usize,
    pub skipped_malformed: usize,
    pub venues: Vec<RankedVenue>,
}

/// Composes the catalog snapshot, eligibility evaluator, and ranking engine per request.
pub struct RecommendationService {
    catalog: Arc<CatalogHandle>,
    usage: Arc<dyn UsageTracker>,
    evaluator: EligibilityEvaluator,
    ranking: RankingEngine,
    collaborators: Option<Collaborators>,
    config: RecommendationConfig,
}

impl RecommendationService {
    pub fn new(
        catalog: Arc<CatalogHandle>,
        usage: Arc<dyn UsageTracker>,
        config: RecommendationConfig,
    ) -> Self {
        let evaluator = EligibilityEvaluator::new(usage.clone(), config.usage_failure_policy);
        let ranking = RankingEngine::new(config.default_weights);
        Self {
            catalog,
            usage,
            evaluator,
            ranking,
            collaborators: None,
            config,
        }
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn config(&self) -> &RecommendationConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<CatalogHandle> {
        &self.catalog
    }

    /// Fill in request defaults: local now, offline, and the configured spend.
    pub fn transaction_context(
        &self,
        at: Option<NaiveDateTime>,
        channel: Option<Channel>,
        spend: Option<Decimal>,
    ) -> Result<TransactionContext, RecommendError> {
        let spend = spend.unwrap_or(self.config.default_spend);
        if spend.is_sign_negative() {
            return Err(RecommendError::InvalidRequest(format!(
                "spend must not be negative (got {spend})"
            )));
        }
        if spend > MAX_SPEND {
            return Err(RecommendError::InvalidRequest(format!(
                "spend must not exceed {MAX_SPEND} (got {spend})"
            )));
        }

        Ok(TransactionContext::new(
            at.unwrap_or_else(|| Local::now().naive_local()),
            channel.unwrap_or(Channel::Offline),
            spend,
        ))
    }

    pub async fn handle(
        &self,
        request: RecommendationRequest,
    ) -> Result<Recommendation, RecommendError> {
        let context = self.transaction_context(request.at, request.channel, request.spend)?;
        self.recommend(request.profile, request.venues, context).await
    }

    /// Evaluate every candidate against one catalog snapshot and rank the results.
    ///
    /// Venues still pending when the request deadline passes are dropped and the response is
    /// flagged `partial`.
    pub async fn recommend(
        &self,
        profile: UserProfile,
        venues: Vec<CandidateVenue>,
        context: TransactionContext,
    ) -> Result<Recommendation, RecommendError> {
        let snapshot = self
            .catalog
            .snapshot()
            .ok_or(RecommendError::CatalogUnavailable)?;
        let deadline = Instant::now() + self.config.request_deadline;
        let total_candidates = venues.len();

        let evaluator = &self.evaluator;
        let profile_ref = &profile;
        let context_ref = &context;
        let snapshot_ref = snapshot.as_ref();

        let mut pending = stream::iter(venues.into_iter().enumerate())
            .map(|(index, venue)| async move {
                let evaluation = evaluator
                    .evaluate(profile_ref, &venue, context_ref, snapshot_ref)
                    .await;
                (index, venue, evaluation)
            })
            .buffer_unordered(self.config.max_concurrency.max(1));

        let mut finished = Vec::with_capacity(total_candidates);
        let mut partial = false;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some(done)) => finished.push(done),
                Ok(None) => break,
                Err(_) => {
                    partial = true;
                    warn!(
                        evaluated = finished.len(),
                        total = total_candidates,
                        deadline_ms = u64::try_from(self.config.request_deadline.as_millis())
                            .unwrap_or(u64::MAX),
                        "request deadline reached; returning partial results"
                    );
                    break;
                }
            }
        }
        drop(pending);

        finished.sort_by_key(|(index, _, _)| *index);
        let evaluated = finished.len();
        let skipped_malformed = finished
            .iter()
            .map(|(_, _, evaluation)| evaluation.skipped_malformed)
            .sum();

        let candidates = finished
            .into_iter()
            .map(|(_, venue, evaluation)| {
                RankingCandidate::classify(venue, evaluation, &snapshot)
            })
            .collect();
        let venues = self.ranking.rank(candidates, &profile);

        info!(
            catalog_version = snapshot.version(),
            user = profile.user_id.as_ref().map(|id| id.0.as_str()).unwrap_or("anonymous"),
            total_candidates,
            evaluated,
            ranked = venues.len(),
            partial,
            "recommendation computed"
        );

        Ok(Recommendation {
            catalog_version: snapshot.version(),
            evaluated_at: context.at,
            channel: context.channel,
            spend: context.spend,
            partial,
            evaluated,
            total_candidates,
            skipped_malformed,
            venues,
        })
    }

    /// Resolve profile and nearby venues through the collaborators, then recommend.
    pub async fn recommend_for_user(
        &self,
        user: &UserId,
        request: UserRecommendationRequest,
    ) -> Result<Recommendation, RecommendError> {
        let collaborators = self
            .collaborators
            .as_ref()
            .ok_or(RecommendError::CollaboratorsNotConfigured)?;
        let context = self.transaction_context(request.at, request.channel, request.spend)?;
        let policy = self.config.retry;

        let profile_lookup = retry_with_backoff("profile", &policy, || {
            let profiles = collaborators.profiles.clone();
            let user = user.clone();
            async move { profiles.profile(&user).await }
        });
        let location_lookup = retry_with_backoff("location", &policy, || {
            let location = collaborators.location.clone();
            let query = request.location;
            async move { location.nearby(&query).await }
        });

        let (mut profile, venues) = tokio::try_join!(profile_lookup, location_lookup)?;
        if profile.user_id.is_none() {
            profile.user_id = Some(user.clone());
        }

        self.recommend(profile, venues, context).await
    }

    /// Forward redemption signals to the usage tracker in order. Returns how many were recorded.
    ///
    /// Recording stops at the first tracker failure; the error carries the number of
    /// claims already committed so a caller can resume from that offset.
    pub async fn record_usage(&self, claims: &[UsageClaim]) -> Result<usize, RecommendError> {
        for (recorded, claim) in claims.iter().enumerate() {
            if let Err(source) = self
                .usage
                .record_usage(&claim.user_id, claim.program_id, &claim.period)
                .await
            {
                warn!(
                    recorded,
                    remaining = claims.len() - recorded,
                    error = %source,
                    "usage recording interrupted"
                );
                return Err(RecommendError::Usage { recorded, source });
            }
        }
        info!(recorded = claims.len(), "usage claims recorded");
        Ok(claims.len())
    }

    pub fn catalog_summary(&self) -> Result<CatalogSummary, RecommendError> {
        self.catalog
            .snapshot()
            .map(|snapshot| snapshot.summary())
            .ok_or(RecommendError::CatalogUnavailable)
    }
}

/// Error raised by the recommendation service.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("no catalog snapshot has been loaded")]
    CatalogUnavailable,
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("location and profile collaborators are not configured")]
    CollaboratorsNotConfigured,
    #[error("recorded {recorded} usage claim(s) before the tracker failed: {source}")]
    Usage {
        recorded: usize,
        #[source]
        source: UsageError,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
