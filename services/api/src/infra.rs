use async_trait::async_trait;
use chrono::NaiveDateTime;
use dealmap::catalog::Channel;
use dealmap::recommend::{
    CandidateVenue, CollaboratorError, LocationQuery, LocationSource, ProfileSource, UserId,
    UserProfile,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Profile lookups served from a fixed table.
#[derive(Debug, Default, Clone)]
pub(crate) struct StaticProfileSource {
    profiles: HashMap<UserId, UserProfile>,
}

impl StaticProfileSource {
    pub(crate) fn new(profiles: HashMap<UserId, UserProfile>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl ProfileSource for StaticProfileSource {
    async fn profile(&self, user: &UserId) -> Result<UserProfile, CollaboratorError> {
        self.profiles
            .get(user)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound {
                collaborator: "profile",
                key: user.to_string(),
            })
    }
}

/// Venue search over a fixed venue list; distances are recomputed from the query point.
#[derive(Debug, Default, Clone)]
pub(crate) struct StaticLocationSource {
    venues: Vec<CandidateVenue>,
}

impl StaticLocationSource {
    pub(crate) fn new(venues: Vec<CandidateVenue>) -> Self {
        Self { venues }
    }
}

#[async_trait]
impl LocationSource for StaticLocationSource {
    async fn nearby(&self, query: &LocationQuery) -> Result<Vec<CandidateVenue>, CollaboratorError> {
        let mut found: Vec<CandidateVenue> = self
            .venues
            .iter()
            .filter_map(|venue| {
                let distance = haversine_meters(
                    query.latitude,
                    query.longitude,
                    venue.latitude,
                    venue.longitude,
                );
                (distance <= query.radius_meters).then(|| CandidateVenue {
                    distance_meters: distance.round(),
                    ..venue.clone()
                })
            })
            .collect();

        found.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
        Ok(found)
    }
}

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

pub(crate) fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
}

pub(crate) fn parse_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let trimmed = raw.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| format!("failed to parse '{raw}' as YYYY-MM-DDTHH:MM[:SS]"))
}

pub(crate) fn parse_channel(raw: &str) -> Result<Channel, String> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealmap::recommend::VenueTags;

    fn venue(name: &str, latitude: f64, longitude: f64) -> CandidateVenue {
        CandidateVenue {
            brand_id: None,
            branch_id: None,
            name: name.to_string(),
            latitude,
            longitude,
            distance_meters: 0.0,
            rating_signal: None,
            ownership: None,
            subcategory: None,
            tags: VenueTags::default(),
        }
    }

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is roughly 111.2 km.
        let meters = haversine_meters(37.0, 127.0, 38.0, 127.0);
        assert!((meters - 111_195.0).abs() < 100.0, "got {meters}");
        assert_eq!(haversine_meters(37.5, 127.0, 37.5, 127.0), 0.0);
    }

    #[tokio::test]
    async fn location_source_filters_by_radius_and_sorts_by_distance() {
        let source = StaticLocationSource::new(vec![
            venue("far", 37.60, 126.98),
            venue("near", 37.5665, 126.9781),
            venue("middle", 37.5700, 126.9780),
        ]);
        let query = LocationQuery {
            latitude: 37.5663,
            longitude: 126.9779,
            radius_meters: 1_000.0,
        };

        let found = source.nearby(&query).await.expect("static source answers");

        let names: Vec<&str> = found.iter().map(|venue| venue.name.as_str()).collect();
        assert_eq!(names, vec!["near", "middle"]);
        assert!(found[0].distance_meters < found[1].distance_meters);
    }

    #[tokio::test]
    async fn unknown_profile_is_not_found() {
        let source = StaticProfileSource::default();

        let result = source.profile(&UserId("nobody".to_string())).await;

        assert!(matches!(
            result,
            Err(CollaboratorError::NotFound {
                collaborator: "profile",
                ..
            })
        ));
    }

    #[test]
    fn datetime_accepts_common_layouts() {
        let expected = parse_datetime("2025-11-05T12:30:00").expect("iso layout");
        assert_eq!(parse_datetime("2025-11-05 12:30"), Ok(expected));
        assert_eq!(parse_datetime(" 2025-11-05T12:30 "), Ok(expected));
        assert!(parse_datetime("11/05/2025").is_err());
    }
}
