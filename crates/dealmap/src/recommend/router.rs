use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::collaborators::CollaboratorError;
use super::domain::UserId;
use super::service::{
    RecommendError, RecommendationRequest, RecommendationService, UserRecommendationRequest,
};
use super::usage::{UsageClaim, UsageError};

/// Router builder exposing recommendation, usage, and catalog endpoints.
pub fn recommendation_router(service: Arc<RecommendationService>) -> Router {
    Router::new()
        .route("/api/v1/recommendations", post(recommend_handler))
        .route(
            "/api/v1/users/:user_id/recommendations",
            post(user_recommend_handler),
        )
        .route("/api/v1/usage", post(usage_handler))
        .route("/api/v1/catalog", get(catalog_handler))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UsageRequest {
    claims: Vec<UsageClaim>,
}

pub(crate) async fn recommend_handler(
    State(service): State<Arc<RecommendationService>>,
    Json(request): Json<RecommendationRequest>,
) -> Response {
    match service.handle(request).await {
        Ok(recommendation) => (StatusCode::OK, Json(recommendation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn user_recommend_handler(
    State(service): State<Arc<RecommendationService>>,
    Path(user_id): Path<String>,
    Json(request): Json<UserRecommendationRequest>,
) -> Response {
    let user = UserId(user_id);
    match service.recommend_for_user(&user, request).await {
        Ok(recommendation) => (StatusCode::OK, Json(recommendation)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn usage_handler(
    State(service): State<Arc<RecommendationService>>,
    Json(request): Json<UsageRequest>,
) -> Response {
    match service.record_usage(&request.claims).await {
        Ok(recorded) => (StatusCode::ACCEPTED, Json(json!({ "recorded": recorded }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn catalog_handler(State(service): State<Arc<RecommendationService>>) -> Response {
    match service.catalog_summary() {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: RecommendError) -> Response {
    let status = match &error {
        RecommendError::CatalogUnavailable
        | RecommendError::CollaboratorsNotConfigured
        | RecommendError::Usage {
            source: UsageError::Unavailable(_),
            ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        RecommendError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RecommendError::Collaborator(CollaboratorError::NotFound { .. }) => StatusCode::NOT_FOUND,
        RecommendError::Collaborator(CollaboratorError::Timeout { .. })
        | RecommendError::Collaborator(CollaboratorError::Exhausted { .. }) => {
            StatusCode::GATEWAY_TIMEOUT
        }
        RecommendError::Collaborator(CollaboratorError::Unavailable { .. }) => {
            StatusCode::BAD_GATEWAY
        }
    };

    let payload = match &error {
        RecommendError::Usage { recorded, .. } => json!({
            "error": error.to_string(),
            "recorded": recorded,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };
    (status, Json(payload)).into_response()
}
