use crate::infra::{parse_channel, parse_datetime, StaticLocationSource, StaticProfileSource};
use chrono::NaiveDateTime;
use clap::Args;
use dealmap::catalog::{
    BrandId, BranchId, CatalogDocument, CatalogHandle, CatalogSnapshot, CatalogSource, Channel,
    JsonFileCatalogSource,
};
use dealmap::error::AppError;
use dealmap::recommend::{
    read_venues_csv, BenefitKind, CandidateVenue, Collaborators, InMemoryUsageTracker,
    LocationQuery, Ownership, PreferenceWeights, Recommendation, RecommendationConfig,
    RecommendationService, StoreTypeFilter, UserId, UserProfile, UserRecommendationRequest,
    VenueTags,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Seoul City Hall; the demo venues sit within walking distance of it.
const DEMO_LATITUDE: f64 = 37.5663;
const DEMO_LONGITUDE: f64 = 126.9779;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Demo user to recommend for (`demo-user` or `student`)
    #[arg(long, default_value = "demo-user")]
    pub(crate) user: String,
    /// Transaction time (YYYY-MM-DDTHH:MM[:SS]). Defaults to now.
    #[arg(long, value_parser = parse_datetime)]
    pub(crate) at: Option<NaiveDateTime>,
    /// ONLINE or OFFLINE. Defaults to OFFLINE.
    #[arg(long, value_parser = parse_channel)]
    pub(crate) channel: Option<Channel>,
    /// Expected spend in KRW
    #[arg(long)]
    pub(crate) spend: Option<Decimal>,
    /// Search radius around the demo location, in meters
    #[arg(long, default_value_t = 1_500.0)]
    pub(crate) radius: f64,
    /// Redeem the top discount and show how the ranking changes afterwards
    #[arg(long)]
    pub(crate) redeem: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RecommendArgs {
    /// Catalog JSON export
    #[arg(long)]
    pub(crate) catalog: PathBuf,
    /// User profile JSON (credentials, preference weights, franchise filter)
    #[arg(long)]
    pub(crate) profile: PathBuf,
    /// Candidate venues as CSV or a JSON array
    #[arg(long)]
    pub(crate) venues: PathBuf,
    /// Transaction time (YYYY-MM-DDTHH:MM[:SS]). Defaults to now.
    #[arg(long, value_parser = parse_datetime)]
    pub(crate) at: Option<NaiveDateTime>,
    /// ONLINE or OFFLINE. Defaults to OFFLINE.
    #[arg(long, value_parser = parse_channel)]
    pub(crate) channel: Option<Channel>,
    /// Expected spend in KRW
    #[arg(long)]
    pub(crate) spend: Option<Decimal>,
    /// Print the raw JSON response instead of the summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct CatalogCheckArgs {
    /// Catalog JSON export to validate
    pub(crate) path: PathBuf,
}

pub(crate) async fn run_recommend(args: RecommendArgs) -> Result<(), AppError> {
    let RecommendArgs {
        catalog,
        profile,
        venues,
        at,
        channel,
        spend,
        json,
    } = args;

    let handle = Arc::new(CatalogHandle::new());
    handle.refresh_from(&JsonFileCatalogSource::new(&catalog))?;
    let profile: UserProfile = serde_json::from_str(&fs::read_to_string(&profile)?)?;
    let venues = load_venues(&venues)?;

    let service = RecommendationService::new(
        handle,
        Arc::new(InMemoryUsageTracker::new()),
        RecommendationConfig::default(),
    );
    let context = service.transaction_context(at, channel, spend)?;
    let recommendation = service.recommend(profile, venues, context).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendation)?);
    } else {
        render_recommendation(&recommendation);
    }
    Ok(())
}

pub(crate) fn run_catalog_check(args: CatalogCheckArgs) -> Result<(), AppError> {
    let source = JsonFileCatalogSource::new(&args.path);
    let snapshot = CatalogSnapshot::from_document(source.load()?, 1);
    let summary = snapshot.summary();

    println!("Catalog {}", source.describe());
    if let Some(label) = &summary.label {
        println!("- label: {label}");
    }
    println!(
        "- {} brands | {} branches | {} providers",
        summary.brands, summary.branches, summary.providers
    );
    println!(
        "- {} programs ({} active)",
        summary.programs, summary.active_programs
    );
    if summary.integrity_warnings.is_empty() {
        println!("- no integrity warnings");
    } else {
        println!(
            "- {} integrity warnings (these programs are skipped at evaluation time):",
            summary.integrity_warnings.len()
        );
        for warning in &summary.integrity_warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        user,
        at,
        channel,
        spend,
        radius,
        redeem,
    } = args;

    let service = demo_service(demo_catalog()?);
    let user = UserId(user);
    let request = UserRecommendationRequest {
        location: LocationQuery {
            latitude: DEMO_LATITUDE,
            longitude: DEMO_LONGITUDE,
            radius_meters: radius,
        },
        at,
        channel,
        spend,
    };

    println!("Discount-aware venue recommendations for {user}");
    let recommendation = service.recommend_for_user(&user, request.clone()).await?;
    render_recommendation(&recommendation);

    if !redeem {
        return Ok(());
    }

    let Some(top) = recommendation
        .venues
        .iter()
        .find(|venue| !venue.applied_discounts.is_empty())
    else {
        println!("\nNo discount to redeem.");
        return Ok(());
    };
    let claims: Vec<_> = top
        .applied_discounts
        .iter()
        .filter(|applied| applied.benefit == BenefitKind::Discount)
        .take(1)
        .flat_map(|applied| applied.usage_claims.clone())
        .collect();
    let recorded = service.record_usage(&claims).await?;
    println!(
        "\nRedeemed the top discount at {} ({recorded} usage counters updated)",
        top.venue.name
    );

    let after = service.recommend_for_user(&user, request).await?;
    render_recommendation(&after);
    Ok(())
}

fn load_venues(path: &Path) -> Result<Vec<CandidateVenue>, AppError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    } else {
        Ok(read_venues_csv(File::open(path)?)?)
    }
}

fn render_recommendation(recommendation: &Recommendation) {
    println!(
        "Catalog v{} | {} | {} | spend {} KRW",
        recommendation.catalog_version,
        recommendation.evaluated_at.format("%a %Y-%m-%d %H:%M"),
        recommendation.channel.label(),
        recommendation.spend
    );
    if recommendation.partial {
        println!(
            "(partial: {} of {} venues evaluated before the deadline)",
            recommendation.evaluated, recommendation.total_candidates
        );
    }
    if recommendation.venues.is_empty() {
        println!("No venues matched.");
        return;
    }

    for ranked in &recommendation.venues {
        let ownership = match ranked.ownership {
            Ownership::Franchise => "franchise",
            Ownership::Independent => "independent",
        };
        println!(
            "\n{}. {} ({ownership}, {:.0} m) score {:.3}",
            ranked.rank, ranked.venue.name, ranked.venue.distance_meters, ranked.composite_score
        );
        println!(
            "   best savings {} KRW ({:.2}%) | stacked {} KRW | points {}",
            ranked.best_savings,
            ranked.best_discount_rate,
            ranked.stackable_savings,
            ranked.best_accrual
        );
        for applied in &ranked.applied_discounts {
            let label = match applied.benefit {
                BenefitKind::Discount => "saves",
                BenefitKind::Accrual => "earns",
            };
            println!(
                "   + {} [{}] {label} {}",
                applied.program_name, applied.provider_name, applied.value
            );
            if let Some(note) = &applied.qualification {
                println!("     note: {note}");
            }
        }
        for rejected in &ranked.other_programs {
            println!("   - {}: {}", rejected.program_name, rejected.detail);
        }
    }
}

pub(crate) fn demo_service(document: CatalogDocument) -> RecommendationService {
    let handle = Arc::new(CatalogHandle::with_document(document));
    let collaborators = Collaborators::new(
        Arc::new(StaticLocationSource::new(demo_venues())),
        Arc::new(StaticProfileSource::new(demo_profiles())),
    );
    RecommendationService::new(
        handle,
        Arc::new(InMemoryUsageTracker::new()),
        RecommendationConfig::default(),
    )
    .with_collaborators(collaborators)
}

/// Seed catalog used by `demo` and by `serve` when no catalog export is configured.
pub(crate) fn demo_catalog() -> Result<CatalogDocument, serde_json::Error> {
    serde_json::from_value(json!({
        "label": "demo",
        "brands": [
            { "id": 1, "name": "Starlight Coffee", "owner": "Starlight F&B", "is_franchise": true },
            { "id": 2, "name": "Paris Bakehouse", "owner": "SPC", "is_franchise": true },
            { "id": 3, "name": "Mapo Kalguksu", "is_franchise": false },
            { "id": 4, "name": "Burger Union", "is_franchise": true }
        ],
        "branches": [
            { "id": 10, "brand_id": 1, "name": "Starlight Coffee City Hall", "latitude": 37.5659, "longitude": 126.9784 },
            { "id": 11, "brand_id": 1, "name": "Starlight Coffee Gwanghwamun", "latitude": 37.5716, "longitude": 126.9769 },
            { "id": 20, "brand_id": 2, "name": "Paris Bakehouse Euljiro", "latitude": 37.5660, "longitude": 126.9826 },
            { "id": 40, "brand_id": 4, "name": "Burger Union Myeongdong", "latitude": 37.5637, "longitude": 126.9850 }
        ],
        "providers": [
            { "id": 1, "name": "SKT", "category": "TELCO" },
            { "id": 2, "name": "KT", "category": "TELCO" },
            { "id": 3, "name": "CJ ONE", "category": "MEMBERSHIP" },
            { "id": 4, "name": "Hyundai Card", "category": "PAYMENT" },
            { "id": 5, "name": "SNU Alumni Association", "category": "AFFILIATION" }
        ],
        "programs": [
            {
                "id": 1, "name": "T Membership 20%", "provider_id": 1, "kind": "PERCENT",
                "amount": 20, "max_amount": 5000, "max_usage_count": 1, "usage_period": "DAILY",
                "required_level": "VIP", "combinable": false
            },
            {
                "id": 2, "name": "KT 1,000 off", "provider_id": 2, "kind": "FIXED", "amount": 1000
            },
            {
                "id": 3, "name": "CJ ONE 5% points", "provider_id": 3, "kind": "PERCENT",
                "amount": 5, "is_discount": false
            },
            {
                "id": 4, "name": "Hyundai Card lunch 10%", "provider_id": 4, "kind": "PERCENT",
                "amount": 10, "max_amount": 3000, "dow_mask": 31,
                "time_from": "11:00:00", "time_to": "14:00:00", "channel": "OFFLINE",
                "qualification": "Pay with an eligible Hyundai Card at the counter",
                "predicates": [{ "kind": "MINIMUM_SPEND", "amount": 10000 }]
            },
            {
                "id": 5, "name": "Burger Union app order 2,000 per 10,000", "provider_id": 4,
                "kind": "PER_UNIT", "amount": 2000,
                "per_unit": { "unit_amount": 10000, "value_per_unit": 2000 },
                "max_amount": 6000, "channel": "ONLINE", "conflicts_with": [4]
            },
            {
                "id": 6, "name": "Alumni evening 15%", "provider_id": 5, "kind": "PERCENT",
                "amount": 15, "max_amount": 4000, "time_from": "18:00:00", "time_to": "02:00:00",
                "application_menu": "Food menu only",
                "predicates": [
                    { "kind": "EXCLUDED_SUBCATEGORY", "subcategory": "alcohol" },
                    { "kind": "DAILY_PER_BRAND_CAP", "max_uses": 1 }
                ]
            },
            {
                "id": 7, "name": "SKT summer bakery 2,000 off", "provider_id": 1, "kind": "FIXED",
                "amount": 2000, "valid_from": "2025-06-01", "valid_to": "2025-08-31"
            }
        ],
        "brand_applicability": [
            { "program_id": 1, "brand_id": 1 },
            { "program_id": 2, "brand_id": 1 },
            { "program_id": 2, "brand_id": 2 },
            { "program_id": 3, "brand_id": 2 },
            { "program_id": 3, "brand_id": 4 },
            { "program_id": 4, "brand_id": 3 },
            { "program_id": 4, "brand_id": 4 },
            { "program_id": 5, "brand_id": 4 },
            { "program_id": 6, "brand_id": 3 },
            { "program_id": 7, "brand_id": 2 }
        ],
        "branch_applicability": [
            { "program_id": 2, "branch_id": 11, "excluded": true }
        ],
        "required_credentials": [
            { "program_id": 1, "category": "TELCO", "credential": "SKT" },
            { "program_id": 2, "category": "TELCO", "credential": "KT" },
            { "program_id": 3, "category": "MEMBERSHIP", "credential": "CJ ONE" },
            { "program_id": 4, "category": "PAYMENT", "credential": "Hyundai Card M" },
            { "program_id": 4, "category": "PAYMENT", "credential": "Hyundai Card X" },
            { "program_id": 5, "category": "PAYMENT", "credential": "Hyundai Card M" },
            { "program_id": 6, "category": "AFFILIATION", "credential": "SNU Alumni" },
            { "program_id": 7, "category": "TELCO", "credential": "SKT" }
        ]
    }))
}

fn demo_venue(
    name: &str,
    brand: Option<u64>,
    branch: Option<u64>,
    (latitude, longitude): (f64, f64),
    subcategory: &str,
    tags: VenueTags,
) -> CandidateVenue {
    CandidateVenue {
        brand_id: brand.map(BrandId),
        branch_id: branch.map(BranchId),
        name: name.to_string(),
        latitude,
        longitude,
        distance_meters: 0.0,
        rating_signal: None,
        ownership: None,
        subcategory: Some(subcategory.to_string()),
        tags,
    }
}

pub(crate) fn demo_venues() -> Vec<CandidateVenue> {
    let tags = |cost_effectiveness, ambiance, group_friendly| VenueTags {
        cost_effectiveness,
        ambiance,
        group_friendly,
    };
    let mut stall = demo_venue(
        "Alley Tteokbokki",
        None,
        None,
        (37.5672, 126.9800),
        "snacks",
        tags(0.9, 0.2, 0.5),
    );
    stall.ownership = Some(Ownership::Independent);

    vec![
        demo_venue(
            "Starlight Coffee City Hall",
            Some(1),
            Some(10),
            (37.5659, 126.9784),
            "coffee",
            tags(0.5, 0.7, 0.4),
        ),
        demo_venue(
            "Starlight Coffee Gwanghwamun",
            Some(1),
            Some(11),
            (37.5716, 126.9769),
            "coffee",
            tags(0.5, 0.9, 0.6),
        ),
        demo_venue(
            "Paris Bakehouse Euljiro",
            Some(2),
            Some(20),
            (37.5660, 126.9826),
            "bakery",
            tags(0.6, 0.5, 0.3),
        ),
        demo_venue(
            "Mapo Kalguksu",
            Some(3),
            None,
            (37.5645, 126.9770),
            "noodles",
            tags(0.9, 0.4, 0.8),
        ),
        demo_venue(
            "Burger Union Myeongdong",
            Some(4),
            Some(40),
            (37.5637, 126.9850),
            "burgers",
            tags(0.7, 0.3, 0.9),
        ),
        stall,
    ]
}

pub(crate) fn demo_profiles() -> HashMap<UserId, UserProfile> {
    let demo_user = UserProfile {
        user_id: Some(UserId("demo-user".to_string())),
        telco_credentials: vec!["SKT".to_string()],
        membership_credentials: vec!["CJ ONE".to_string()],
        payment_credentials: vec!["Hyundai Card M".to_string()],
        ..UserProfile::default()
    };
    let student = UserProfile {
        user_id: Some(UserId("student".to_string())),
        telco_credentials: vec!["KT".to_string()],
        affiliation_credentials: vec!["SNU Alumni".to_string()],
        preference_weights: PreferenceWeights {
            cost_sensitivity: 1.0,
            ambiance: 0.2,
            group_affinity: 0.8,
        },
        franchise_filter: StoreTypeFilter::Independent,
        ..UserProfile::default()
    };

    [demo_user, student]
        .into_iter()
        .filter_map(|profile| profile.user_id.clone().map(|id| (id, profile)))
        .collect()
}
