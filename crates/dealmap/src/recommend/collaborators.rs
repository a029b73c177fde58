use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{CandidateVenue, UserId, UserProfile};

/// Search area handed to the location collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

/// Failure talking to a location or profile collaborator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {elapsed_ms}ms")]
    Timeout {
        collaborator: &'static str,
        elapsed_ms: u64,
    },
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },
    #[error("{collaborator} has no record for {key}")]
    NotFound {
        collaborator: &'static str,
        key: String,
    },
    #[error("{collaborator} failed after {attempts} attempts: {last}")]
    Exhausted {
        collaborator: &'static str,
        attempts: u32,
        last: Box<CollaboratorError>,
    },
}

impl CollaboratorError {
    /// Timeouts and outages may clear up; a missing record will not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Timeout { .. } | CollaboratorError::Unavailable { .. }
        )
    }
}

/// Candidate venues near a point.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn nearby(&self, query: &LocationQuery) -> Result<Vec<CandidateVenue>, CollaboratorError>;
}

/// Credentials and preferences for a known user.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn profile(&self, user: &UserId) -> Result<UserProfile, CollaboratorError>;
}

/// External lookups used by user-scoped recommendations.
#[derive(Clone)]
pub struct Collaborators {
    pub location: Arc<dyn LocationSource>,
    pub profiles: Arc<dyn ProfileSource>,
}

impl Collaborators {
    pub fn new(location: Arc<dyn LocationSource>, profiles: Arc<dyn ProfileSource>) -> Self {
        Self {
            location,
            profiles,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
