use super::common::*;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::catalog::CatalogHandle;
use crate::recommend::router::{catalog_handler, recommendation_router};
use crate::recommend::service::RecommendationService;
use crate::recommend::usage::InMemoryUsageTracker;

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post(uri: &str, payload: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn recommendation_payload() -> Value {
    json!({
        "profile": {
            "userId": "user-1",
            "telcoCredentials": ["SKT"],
            "paymentCredentials": ["hyundai card m"]
        },
        "venues": [
            {
                "name": "Grill Republic Gangnam",
                "brandId": 3,
                "branchId": 30,
                "latitude": 37.5,
                "longitude": 127.0,
                "distanceMeters": 600.0
            },
            {
                "name": "Han Noodle House",
                "brandId": 2,
                "latitude": 37.5,
                "longitude": 127.0,
                "distanceMeters": 250.0
            }
        ],
        "at": "2025-11-05T12:00:00",
        "channel": "OFFLINE",
        "spend": 20000
    })
}

#[tokio::test]
async fn recommendation_route_returns_ranked_venues() {
    let (service, _) = build_service();
    let router = recommendation_router(service);

    let response = router
        .oneshot(post("/api/v1/recommendations", recommendation_payload()))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["catalogVersion"], 1);
    assert_eq!(body["partial"], false);
    let venues = body["venues"].as_array().expect("venues array");
    assert_eq!(venues.len(), 2);
    assert_eq!(venues[0]["venue"]["name"], "Grill Republic Gangnam");
    assert_eq!(venues[0]["rank"], 1);
    let applied = venues[0]["appliedDiscounts"]
        .as_array()
        .expect("applied discounts");
    assert_eq!(applied[0]["programName"], "T Day 25%");
    assert_eq!(applied[0]["benefit"], "DISCOUNT");
    assert!(venues[0]["otherPrograms"].as_array().is_some());
}

#[tokio::test]
async fn recommendation_route_reports_missing_catalog() {
    let service = Arc::new(RecommendationService::new(
        Arc::new(CatalogHandle::new()),
        Arc::new(InMemoryUsageTracker::new()),
        quick_config(),
    ));
    let router = recommendation_router(service);

    let response = router
        .oneshot(post("/api/v1/recommendations", recommendation_payload()))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"], "no catalog snapshot has been loaded");
}

#[tokio::test]
async fn negative_spend_is_unprocessable() {
    let (service, _) = build_service();
    let router = recommendation_router(service);
    let mut payload = recommendation_payload();
    payload["spend"] = json!(-5);

    let response = router
        .oneshot(post("/api/v1/recommendations", payload))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn spend_beyond_the_bound_is_unprocessable() {
    let (service, _) = build_service();
    let router = recommendation_router(service);
    let mut payload = recommendation_payload();
    payload["spend"] = json!("10000000000000000000000000000");

    let response = router
        .oneshot(post("/api/v1/recommendations", payload))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("must not exceed")));
}

#[tokio::test]
async fn usage_route_records_claims() {
    let (service, tracker) = build_service();
    let router = recommendation_router(service);

    let response = router
        .oneshot(post(
            "/api/v1/usage",
            json!({
                "claims": [
                    { "userId": "user-1", "programId": 1, "period": "D2025-11-05" }
                ]
            }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["recorded"], 1);
    assert_eq!(
        tracker.count(
            &crate::recommend::UserId("user-1".to_string()),
            T_DAY,
            &crate::recommend::PeriodKey("D2025-11-05".to_string())
        ),
        1
    );
}

#[tokio::test]
async fn usage_route_reports_partial_recording() {
    let tracker = Arc::new(FailingAfterTracker::new(2));
    let service = Arc::new(RecommendationService::new(
        handle(),
        tracker.clone(),
        quick_config(),
    ));
    let router = recommendation_router(service);

    let response = router
        .oneshot(post(
            "/api/v1/usage",
            json!({
                "claims": [
                    { "userId": "user-1", "programId": 1, "period": "D2025-11-05" },
                    { "userId": "user-1", "programId": 3, "period": "D2025-11-05" }
                ]
            }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["recorded"], 1);
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("counter store offline")));
}

#[tokio::test]
async fn catalog_handler_returns_summary() {
    let (service, _) = build_service();

    let response = catalog_handler(State(service)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["version"], 1);
    assert_eq!(body["label"], "fixture");
    assert_eq!(body["programs"], 6);
    assert!(!body["integrityWarnings"]
        .as_array()
        .expect("warnings array")
        .is_empty());
}

#[tokio::test]
async fn user_route_maps_collaborator_failures() {
    let service = Arc::new(
        RecommendationService::new(
            handle(),
            Arc::new(InMemoryUsageTracker::new()),
            quick_config(),
        )
        .with_collaborators(collaborators(Arc::new(FixedLocations(vec![station()])))),
    );
    let router = recommendation_router(service);
    let payload = json!({
        "location": { "latitude": 37.5, "longitude": 127.0, "radiusMeters": 800.0 },
        "at": "2025-11-05T12:00:00"
    });

    let found = router
        .clone()
        .oneshot(post("/api/v1/users/user-1/recommendations", payload.clone()))
        .await
        .expect("router responds");
    assert_eq!(found.status(), StatusCode::OK);

    let missing = router
        .oneshot(post("/api/v1/users/unknown/recommendations", payload))
        .await
        .expect("router responds");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_route_without_collaborators_is_unavailable() {
    let (service, _) = build_service();
    let router = recommendation_router(service);

    let response = router
        .oneshot(post(
            "/api/v1/users/user-1/recommendations",
            json!({ "location": { "latitude": 37.5, "longitude": 127.0, "radiusMeters": 800.0 } }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
