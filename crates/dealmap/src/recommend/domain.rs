use std::collections::BTreeSet;
use std::io::Read;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::{normalize_credential, BrandId, BranchId, Channel, ProviderCategory};

use super::ranking::ScoreWeights;

/// Identifier wrapper for the requesting user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Soft preferences, each expected in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceWeights {
    pub cost_sensitivity: f64,
    pub ambiance: f64,
    pub group_affinity: f64,
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        Self {
            cost_sensitivity: 1.0,
            ambiance: 1.0,
            group_affinity: 1.0,
        }
    }
}

/// Chain vs independent ownership of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Ownership {
    Franchise,
    Independent,
}

/// Profile toggle restricting results to chains or independents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreTypeFilter {
    #[default]
    All,
    Franchise,
    Independent,
}

impl StoreTypeFilter {
    pub fn admits(&self, ownership: Ownership) -> bool {
        match self {
            StoreTypeFilter::All => true,
            StoreTypeFilter::Franchise => ownership == Ownership::Franchise,
            StoreTypeFilter::Independent => ownership == Ownership::Independent,
        }
    }
}

/// Per-request user profile supplied by the profile collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub telco_credentials: Vec<String>,
    #[serde(default)]
    pub membership_credentials: Vec<String>,
    #[serde(default)]
    pub payment_credentials: Vec<String>,
    #[serde(default)]
    pub affiliation_credentials: Vec<String>,
    #[serde(default)]
    pub preference_weights: PreferenceWeights,
    #[serde(default)]
    pub franchise_filter: StoreTypeFilter,
    #[serde(default)]
    pub score_weights: Option<ScoreWeights>,
}

impl UserProfile {
    pub fn credentials(&self, category: ProviderCategory) -> &[String] {
        match category {
            ProviderCategory::Telco => &self.telco_credentials,
            ProviderCategory::Membership => &self.membership_credentials,
            ProviderCategory::Payment => &self.payment_credentials,
            ProviderCategory::Affiliation => &self.affiliation_credentials,
        }
    }

    /// First held credential (normalized) that appears in `accepted`.
    pub fn matching_credential(
        &self,
        category: ProviderCategory,
        accepted: &BTreeSet<String>,
    ) -> Option<String> {
        self.credentials(category)
            .iter()
            .map(|raw| normalize_credential(category, raw))
            .find(|credential| accepted.contains(credential))
    }
}

/// Preference tags describing a venue, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueTags {
    #[serde(default)]
    pub cost_effectiveness: f64,
    #[serde(default)]
    pub ambiance: f64,
    #[serde(default)]
    pub group_friendly: f64,
}

/// Candidate venue supplied by the location collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateVenue {
    #[serde(default)]
    pub brand_id: Option<BrandId>,
    #[serde(default)]
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_meters: f64,
    #[serde(default)]
    pub rating_signal: Option<f64>,
    #[serde(default)]
    pub ownership: Option<Ownership>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub tags: VenueTags,
}

/// Transaction the discounts are priced against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub at: NaiveDateTime,
    pub channel: Channel,
    pub spend: Decimal,
}

impl TransactionContext {
    pub fn new(at: NaiveDateTime, channel: Channel, spend: Decimal) -> Self {
        Self { at, channel, spend }
    }
}

#[derive(Debug, Deserialize)]
struct VenueRow {
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    brand_id: Option<u64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    branch_id: Option<u64>,
    latitude: f64,
    longitude: f64,
    distance_meters: f64,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ownership: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    subcategory: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    cost_effectiveness: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    ambiance: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    group_friendly: Option<f64>,
}

fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Read candidate venues from a location-collaborator CSV export.
pub fn read_venues_csv<R: Read>(reader: R) -> Result<Vec<CandidateVenue>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut venues = Vec::new();
    for row in csv_reader.deserialize::<VenueRow>() {
        let row = row?;
        let ownership = row.ownership.as_deref().and_then(|value| {
            match value.to_ascii_uppercase().as_str() {
                "FRANCHISE" => Some(Ownership::Franchise),
                "INDEPENDENT" => Some(Ownership::Independent),
                _ => None,
            }
        });

        venues.push(CandidateVenue {
            brand_id: row.brand_id.map(BrandId),
            branch_id: row.branch_id.map(BranchId),
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            distance_meters: row.distance_meters,
            rating_signal: row.rating,
            ownership,
            subcategory: row.subcategory,
            tags: VenueTags {
                cost_effectiveness: row.cost_effectiveness.unwrap_or_default(),
                ambiance: row.ambiance.unwrap_or_default(),
                group_friendly: row.group_friendly.unwrap_or_default(),
            },
        });
    }

    Ok(venues)
}
