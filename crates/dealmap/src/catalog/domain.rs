use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for catalog brands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrandId(pub u64);

impl fmt::Display for BrandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "brand-{}", self.0)
    }
}

/// Identifier wrapper for individual branch locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderId(pub u64);

/// Identifier wrapper for discount programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "program-{}", self.0)
    }
}

fn default_true() -> bool {
    true
}

/// Venue brand, classified as a chain (franchise) or an independent operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default = "default_true")]
    pub is_franchise: bool,
}

/// A physical branch of a brand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchLocation {
    pub id: BranchId,
    pub brand_id: BrandId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Credential category a provider grants eligibility through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderCategory {
    Telco,
    Membership,
    Payment,
    Affiliation,
}

impl ProviderCategory {
    pub const ALL: [ProviderCategory; 4] = [
        ProviderCategory::Telco,
        ProviderCategory::Membership,
        ProviderCategory::Payment,
        ProviderCategory::Affiliation,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ProviderCategory::Telco => "telco",
            ProviderCategory::Membership => "membership",
            ProviderCategory::Payment => "payment",
            ProviderCategory::Affiliation => "affiliation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountProvider {
    pub id: ProviderId,
    pub name: String,
    pub category: ProviderCategory,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// How a program's magnitude translates into a monetary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Percent,
    Fixed,
    PerUnit,
}

/// Payment channel a transaction happens through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Online,
    Offline,
}

impl Channel {
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Online => "ONLINE",
            Channel::Offline => "OFFLINE",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ONLINE" => Ok(Channel::Online),
            "OFFLINE" => Ok(Channel::Offline),
            other => Err(format!("unknown channel '{other}' (expected ONLINE or OFFLINE)")),
        }
    }
}

/// Reset period for per-user usage caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsagePeriod {
    Daily,
    Monthly,
    #[default]
    Unlimited,
}

/// Seven-bit weekday set; bit 0 is Monday, bit 6 is Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOfWeekMask(pub u8);

impl DayOfWeekMask {
    pub const WEEKDAYS: DayOfWeekMask = DayOfWeekMask(0b001_1111);
    pub const WEEKEND: DayOfWeekMask = DayOfWeekMask(0b110_0000);

    pub fn allows(&self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_monday()) != 0
    }
}

/// Bounds on the local time of day; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: Option<NaiveTime>,
    pub to: Option<NaiveTime>,
}

impl TimeWindow {
    /// Inclusive on both ends. A window whose start is after its end wraps past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        match (self.from, self.to) {
            (None, None) => true,
            (Some(from), None) => time >= from,
            (None, Some(to)) => time <= to,
            (Some(from), Some(to)) if from <= to => time >= from && time <= to,
            (Some(from), Some(to)) => time >= from || time <= to,
        }
    }
}

/// Step rule for `PER_UNIT` programs: every `unit_amount` spent earns `value_per_unit`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerUnitRule {
    pub unit_amount: Decimal,
    pub value_per_unit: Decimal,
}

/// Structured conditions lifted out of free-text qualification notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualificationPredicate {
    MinimumSpend { amount: Decimal },
    MaximumSpend { amount: Decimal },
    ExcludedSubcategory { subcategory: String },
    DailyPerBrandCap { max_uses: u32 },
}

/// A single discount or accrual offer as loaded from the catalog store.
///
/// Rows are kept as loaded; `kind` stays optional so malformed entries survive the load and
/// are reported as integrity warnings when evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountProgram {
    pub id: ProgramId,
    pub name: String,
    pub provider_id: ProviderId,
    #[serde(default)]
    pub kind: Option<DiscountKind>,
    pub amount: Decimal,
    #[serde(default)]
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub per_unit: Option<PerUnitRule>,
    #[serde(default)]
    pub max_usage_count: Option<u32>,
    #[serde(default)]
    pub usage_period: UsagePeriod,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    #[serde(default)]
    pub dow_mask: Option<DayOfWeekMask>,
    #[serde(default)]
    pub time_from: Option<NaiveTime>,
    #[serde(default)]
    pub time_to: Option<NaiveTime>,
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub qualification: Option<String>,
    #[serde(default)]
    pub application_menu: Option<String>,
    #[serde(default)]
    pub required_level: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_discount: bool,
    #[serde(default)]
    pub predicates: Vec<QualificationPredicate>,
    #[serde(default)]
    pub conflicts_with: BTreeSet<ProgramId>,
    #[serde(default = "default_true")]
    pub combinable: bool,
}

impl DiscountProgram {
    pub fn time_window(&self) -> TimeWindow {
        TimeWindow {
            from: self.time_from,
            to: self.time_to,
        }
    }

    pub fn daily_brand_caps(&self) -> impl Iterator<Item = u32> + '_ {
        self.predicates.iter().filter_map(|predicate| match predicate {
            QualificationPredicate::DailyPerBrandCap { max_uses } => Some(*max_uses),
            _ => None,
        })
    }
}

/// Brand-level applicability row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandApplicability {
    pub program_id: ProgramId,
    pub brand_id: BrandId,
    #[serde(default)]
    pub excluded: bool,
}

/// Branch-level applicability row; overrides the brand-level row for that branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchApplicability {
    pub program_id: ProgramId,
    pub branch_id: BranchId,
    #[serde(default)]
    pub excluded: bool,
}

/// One acceptable credential for a program within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredCredential {
    pub program_id: ProgramId,
    pub category: ProviderCategory,
    pub credential: String,
}

/// Full catalog payload as produced by the external load process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub brands: Vec<Brand>,
    #[serde(default)]
    pub branches: Vec<BranchLocation>,
    #[serde(default)]
    pub providers: Vec<DiscountProvider>,
    #[serde(default)]
    pub programs: Vec<DiscountProgram>,
    #[serde(default)]
    pub brand_applicability: Vec<BrandApplicability>,
    #[serde(default)]
    pub branch_applicability: Vec<BranchApplicability>,
    #[serde(default)]
    pub required_credentials: Vec<RequiredCredential>,
}
