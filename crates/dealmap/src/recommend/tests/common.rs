use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::catalog::{
    Brand, BrandApplicability, BrandId, BranchApplicability, BranchId, BranchLocation,
    CatalogDocument, CatalogHandle, CatalogSnapshot, Channel, DayOfWeekMask, DiscountKind,
    DiscountProgram, DiscountProvider, PerUnitRule, ProgramId, ProviderCategory, ProviderId,
    QualificationPredicate, RequiredCredential, UsagePeriod,
};
use crate::recommend::collaborators::{
    CollaboratorError, Collaborators, LocationQuery, LocationSource, ProfileSource,
};
use crate::recommend::domain::{
    CandidateVenue, PreferenceWeights, TransactionContext, UserId, UserProfile, VenueTags,
};
use crate::recommend::eligibility::EligibilityEvaluator;
use crate::recommend::retry::RetryPolicy;
use crate::recommend::service::{RecommendationConfig, RecommendationService};
use crate::recommend::usage::{
    InMemoryUsageTracker, PeriodKey, UsageClaim, UsageError, UsageFailurePolicy, UsageTracker,
};

pub(super) const T_DAY: ProgramId = ProgramId(1);
pub(super) const CJ_POINTS: ProgramId = ProgramId(2);
pub(super) const CARD_FIXED: ProgramId = ProgramId(3);
pub(super) const RETIRED: ProgramId = ProgramId(4);
pub(super) const MALFORMED: ProgramId = ProgramId(5);
pub(super) const LUNCH_PER_UNIT: ProgramId = ProgramId(6);

pub(super) fn program(id: ProgramId, name: &str, provider: u64) -> DiscountProgram {
    DiscountProgram {
        id,
        name: name.to_string(),
        provider_id: ProviderId(provider),
        kind: Some(DiscountKind::Percent),
        amount: Decimal::from(10),
        max_amount: None,
        per_unit: None,
        max_usage_count: None,
        usage_period: UsagePeriod::Unlimited,
        valid_from: None,
        valid_to: None,
        dow_mask: None,
        time_from: None,
        time_to: None,
        channel: None,
        qualification: None,
        application_menu: None,
        required_level: None,
        is_active: true,
        is_discount: true,
        predicates: Vec::new(),
        conflicts_with: BTreeSet::new(),
        combinable: true,
    }
}

/// Three brands, four providers, and one program per rule shape.
pub(super) fn catalog_document() -> CatalogDocument {
    let t_day = DiscountProgram {
        amount: Decimal::from(25),
        max_amount: Some(Decimal::from(25_000)),
        max_usage_count: Some(3),
        usage_period: UsagePeriod::Daily,
        combinable: false,
        required_level: Some("VIP".to_string()),
        ..program(T_DAY, "T Day 25%", 1)
    };
    let cj_points = DiscountProgram {
        amount: Decimal::from(5),
        is_discount: false,
        ..program(CJ_POINTS, "CJ ONE 5% points", 2)
    };
    let card_fixed = DiscountProgram {
        kind: Some(DiscountKind::Fixed),
        amount: Decimal::from(3_000),
        predicates: vec![QualificationPredicate::MinimumSpend {
            amount: Decimal::from(10_000),
        }],
        qualification: Some("Minimum spend 10,000".to_string()),
        ..program(CARD_FIXED, "Hyundai Card 3,000 off", 3)
    };
    let retired = program(RETIRED, "Retired plan 50%", 4);
    let malformed = DiscountProgram {
        kind: None,
        ..program(MALFORMED, "Unclassified promo", 1)
    };
    let lunch = DiscountProgram {
        kind: Some(DiscountKind::PerUnit),
        amount: Decimal::ZERO,
        per_unit: Some(PerUnitRule {
            unit_amount: Decimal::from(1_000),
            value_per_unit: Decimal::from(150),
        }),
        max_amount: Some(Decimal::from(3_000)),
        dow_mask: Some(DayOfWeekMask::WEEKDAYS),
        time_from: chrono::NaiveTime::from_hms_opt(11, 0, 0),
        time_to: chrono::NaiveTime::from_hms_opt(14, 0, 0),
        channel: Some(Channel::Offline),
        ..program(LUNCH_PER_UNIT, "Card lunch 150 per 1,000", 3)
    };

    CatalogDocument {
        label: Some("fixture".to_string()),
        brands: vec![
            brand(1, "Bean Roasters", true),
            brand(2, "Han Noodle House", false),
            brand(3, "Grill Republic", true),
        ],
        branches: vec![
            branch(10, 1, "Bean Roasters Station"),
            branch(11, 1, "Bean Roasters Riverside"),
            branch(30, 3, "Grill Republic Gangnam"),
        ],
        providers: vec![
            provider(1, "SKT", ProviderCategory::Telco, true),
            provider(2, "CJ ONE", ProviderCategory::Membership, true),
            provider(3, "Hyundai Card", ProviderCategory::Payment, true),
            provider(4, "Retired Telco", ProviderCategory::Telco, false),
        ],
        programs: vec![t_day, cj_points, card_fixed, retired, malformed, lunch],
        brand_applicability: vec![
            brand_row(T_DAY, 1),
            brand_row(T_DAY, 3),
            brand_row(CJ_POINTS, 1),
            brand_row(CARD_FIXED, 3),
            brand_row(RETIRED, 1),
            brand_row(MALFORMED, 3),
            brand_row(LUNCH_PER_UNIT, 3),
        ],
        branch_applicability: vec![BranchApplicability {
            program_id: T_DAY,
            branch_id: BranchId(11),
            excluded: true,
        }],
        required_credentials: vec![
            credential(T_DAY, ProviderCategory::Telco, "SKT"),
            credential(CJ_POINTS, ProviderCategory::Membership, "CJ ONE"),
            credential(CARD_FIXED, ProviderCategory::Payment, "Hyundai Card M"),
            credential(LUNCH_PER_UNIT, ProviderCategory::Payment, "Hyundai Card M"),
        ],
    }
}

fn brand(id: u64, name: &str, is_franchise: bool) -> Brand {
    Brand {
        id: BrandId(id),
        name: name.to_string(),
        owner: None,
        is_franchise,
    }
}

fn branch(id: u64, brand: u64, name: &str) -> BranchLocation {
    BranchLocation {
        id: BranchId(id),
        brand_id: BrandId(brand),
        name: name.to_string(),
        latitude: 37.5,
        longitude: 127.0,
        is_active: true,
    }
}

fn provider(id: u64, name: &str, category: ProviderCategory, is_active: bool) -> DiscountProvider {
    DiscountProvider {
        id: ProviderId(id),
        name: name.to_string(),
        category,
        is_active,
    }
}

fn brand_row(program: ProgramId, brand: u64) -> BrandApplicability {
    BrandApplicability {
        program_id: program,
        brand_id: BrandId(brand),
        excluded: false,
    }
}

fn credential(program: ProgramId, category: ProviderCategory, value: &str) -> RequiredCredential {
    RequiredCredential {
        program_id: program,
        category,
        credential: value.to_string(),
    }
}

pub(super) fn snapshot() -> CatalogSnapshot {
    CatalogSnapshot::from_document(catalog_document(), 1)
}

pub(super) fn handle() -> Arc<CatalogHandle> {
    Arc::new(CatalogHandle::with_document(catalog_document()))
}

pub(super) fn venue(
    name: &str,
    brand: Option<u64>,
    branch: Option<u64>,
    distance_meters: f64,
) -> CandidateVenue {
    CandidateVenue {
        brand_id: brand.map(BrandId),
        branch_id: branch.map(BranchId),
        name: name.to_string(),
        latitude: 37.5,
        longitude: 127.0,
        distance_meters,
        rating_signal: Some(4.2),
        ownership: None,
        subcategory: None,
        tags: VenueTags {
            cost_effectiveness: 0.5,
            ambiance: 0.5,
            group_friendly: 0.5,
        },
    }
}

pub(super) fn station() -> CandidateVenue {
    venue("Bean Roasters Station", Some(1), Some(10), 150.0)
}

pub(super) fn riverside() -> CandidateVenue {
    venue("Bean Roasters Riverside", Some(1), Some(11), 400.0)
}

pub(super) fn grill() -> CandidateVenue {
    venue("Grill Republic Gangnam", Some(3), Some(30), 600.0)
}

pub(super) fn noodle() -> CandidateVenue {
    venue("Han Noodle House", Some(2), None, 250.0)
}

pub(super) fn profile() -> UserProfile {
    UserProfile {
        user_id: Some(UserId("user-1".to_string())),
        telco_credentials: vec!["skt".to_string()],
        membership_credentials: vec!["CJ ONE".to_string()],
        payment_credentials: vec!["Hyundai Card M".to_string()],
        preference_weights: PreferenceWeights::default(),
        ..UserProfile::default()
    }
}

/// 2025-11-05 is a Wednesday.
pub(super) fn wednesday_noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 11, 5)
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .expect("valid timestamp")
}

pub(super) fn context(spend: i64) -> TransactionContext {
    TransactionContext::new(wednesday_noon(), Channel::Offline, Decimal::from(spend))
}

pub(super) fn evaluator(tracker: Arc<dyn UsageTracker>) -> EligibilityEvaluator {
    EligibilityEvaluator::new(tracker, UsageFailurePolicy::FailClosed)
}

pub(super) fn quick_config() -> RecommendationConfig {
    RecommendationConfig {
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            attempt_timeout: Duration::from_millis(100),
        },
        ..RecommendationConfig::default()
    }
}

pub(super) fn build_service() -> (Arc<RecommendationService>, Arc<InMemoryUsageTracker>) {
    let tracker = Arc::new(InMemoryUsageTracker::new());
    let service = RecommendationService::new(handle(), tracker.clone(), quick_config());
    (Arc::new(service), tracker)
}

/// Tracker whose every call fails.
pub(super) struct UnavailableTracker;

#[async_trait]
impl UsageTracker for UnavailableTracker {
    async fn usage_count(
        &self,
        _user: &UserId,
        _program: ProgramId,
        _period: &PeriodKey,
    ) -> Result<u32, UsageError> {
        Err(UsageError::Unavailable("counter store offline".to_string()))
    }

    async fn record_usage(
        &self,
        _user: &UserId,
        _program: ProgramId,
        _period: &PeriodKey,
    ) -> Result<(), UsageError> {
        Err(UsageError::Unavailable("counter store offline".to_string()))
    }
}

/// Tracker that answers zero after a fixed delay.
pub(super) struct SlowTracker(pub Duration);

#[async_trait]
impl UsageTracker for SlowTracker {
    async fn usage_count(
        &self,
        _user: &UserId,
        _program: ProgramId,
        _period: &PeriodKey,
    ) -> Result<u32, UsageError> {
        tokio::time::sleep(self.0).await;
        Ok(0)
    }

    async fn record_usage(
        &self,
        _user: &UserId,
        _program: ProgramId,
        _period: &PeriodKey,
    ) -> Result<(), UsageError> {
        Ok(())
    }
}

/// In-memory tracker whose record calls start failing from the `fail_from`th call (1-based).
pub(super) struct FailingAfterTracker {
    pub inner: InMemoryUsageTracker,
    fail_from: usize,
    calls: AtomicUsize,
}

impl FailingAfterTracker {
    pub(super) fn new(fail_from: usize) -> Self {
        Self {
            inner: InMemoryUsageTracker::new(),
            fail_from,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UsageTracker for FailingAfterTracker {
    async fn usage_count(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<u32, UsageError> {
        self.inner.usage_count(user, program, period).await
    }

    async fn record_usage(
        &self,
        user: &UserId,
        program: ProgramId,
        period: &PeriodKey,
    ) -> Result<(), UsageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.fail_from {
            return Err(UsageError::Unavailable("counter store offline".to_string()));
        }
        self.inner.record_usage(user, program, period).await
    }
}

pub(super) fn usage_claim(user: &str, program: ProgramId, period: &str) -> UsageClaim {
    UsageClaim {
        user_id: UserId(user.to_string()),
        program_id: program,
        period: PeriodKey(period.to_string()),
    }
}

pub(super) struct FixedProfiles(pub UserProfile);

#[async_trait]
impl ProfileSource for FixedProfiles {
    async fn profile(&self, user: &UserId) -> Result<UserProfile, CollaboratorError> {
        if user.0 == "unknown" {
            return Err(CollaboratorError::NotFound {
                collaborator: "profile",
                key: user.0.clone(),
            });
        }
        Ok(self.0.clone())
    }
}

pub(super) struct FixedLocations(pub Vec<CandidateVenue>);

#[async_trait]
impl LocationSource for FixedLocations {
    async fn nearby(
        &self,
        _query: &LocationQuery,
    ) -> Result<Vec<CandidateVenue>, CollaboratorError> {
        Ok(self.0.clone())
    }
}

pub(super) struct DownLocations;

#[async_trait]
impl LocationSource for DownLocations {
    async fn nearby(
        &self,
        _query: &LocationQuery,
    ) -> Result<Vec<CandidateVenue>, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            collaborator: "location",
            message: "upstream 503".to_string(),
        })
    }
}

pub(super) fn collaborators(location: Arc<dyn LocationSource>) -> Collaborators {
    let mut stored = profile();
    stored.user_id = None;
    Collaborators::new(location, Arc::new(FixedProfiles(stored)))
}

pub(super) fn query() -> LocationQuery {
    LocationQuery {
        latitude: 37.5,
        longitude: 127.0,
        radius_meters: 1_000.0,
    }
}
