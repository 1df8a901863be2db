use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::collection::domain::{ActionType, IndividualStatus};
use crate::collection::router::collection_router;
use crate::collection::service::CollectionService;
use crate::collection::webhook::{sign, SIGNATURE_HEADER};

fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("request")
}

fn router_with(individuals: Vec<crate::collection::domain::Individual>) -> axum::Router {
    let (service, _, _) = build_service(individuals);
    collection_router(Arc::new(service))
}

#[tokio::test]
async fn customers_can_be_created_and_listed() {
    let router = router_with(Vec::new());

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/customers",
            &json!({ "name": "Globex", "link": CUSTOMER_LINK, "endpoint": "globex" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json_body(response).await;
    assert_eq!(created["communicationSettings"]["maxReminders"], 3);

    let response = router
        .oneshot(
            Request::get("/api/customers")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let listed = read_json_body(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn unknown_customer_is_not_found() {
    let response = router_with(Vec::new())
        .oneshot(
            Request::get("/api/customers/cust-missing")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn due_actions_route_is_not_shadowed_by_customer_lookup() {
    let individual = with_action(
        individual("ind-1", IndividualStatus::Invited),
        ActionType::Reminder,
        chrono::Utc::now() - chrono::Duration::hours(1),
    );
    let response = router_with(vec![individual])
        .oneshot(
            Request::get("/api/customers/actions/due")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let due = read_json_body(response).await;
    assert_eq!(due[0]["individualId"], "ind-1");
    assert_eq!(due[0]["action"]["type"], "reminder");
}

#[tokio::test]
async fn backwards_status_change_conflicts() {
    let response = router_with(vec![individual("ind-1", IndividualStatus::Started)])
        .oneshot(json_request(
            Method::PATCH,
            "/api/customers/cust-acme/individuals/ind-1/status",
            &json!({ "status": "invited" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], "cannot move individual from started to invited");
}

#[tokio::test]
async fn out_of_range_communication_settings_are_a_bad_request() {
    let router = router_with(vec![individual("ind-1", IndividualStatus::Pending)]);
    let response = router
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            "/api/customers/cust-acme/communication-settings",
            &json!({ "expirationPeriod": 4_000_000_000u32 }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(
        body["error"],
        "expirationPeriod must be between 1 and 365, got 4000000000"
    );

    let response = router
        .oneshot(
            Request::post("/api/customers/cust-acme/individuals/ind-1/invite")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invite_accepts_an_empty_body() {
    let response = router_with(vec![individual("ind-1", IndividualStatus::Pending)])
        .oneshot(
            Request::post("/api/customers/cust-acme/individuals/ind-1/invite")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "invited");
    assert_eq!(body["communication"]["status"], "sent");
}

#[tokio::test]
async fn signed_progress_webhook_is_accepted() {
    let (service, repository, _) =
        build_service(vec![individual("ind-1", IndividualStatus::Invited)]);
    service
        .update_webhook_settings(
            &customer_id(),
            crate::collection::domain::WebhookSettingsUpdate {
                secret: Some("whsec".to_string()),
                ..Default::default()
            },
        )
        .expect("secret stored");
    let router = collection_router(Arc::new(service));
    let body = serde_json::to_vec(&json!({
        "customerId": "cust-acme",
        "individualId": "ind-1",
        "status": "started",
        "progress": { "currentStep": "personal_info" }
    }))
    .expect("body");

    let unsigned = router
        .clone()
        .oneshot(
            Request::post("/api/webhook/collect")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.clone()))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let signature = sign("whsec", "1741597200000", &body).expect("signed");
    let response = router
        .oneshot(
            Request::post("/api/webhook/collect")
                .header(header::CONTENT_TYPE, "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["received"], true);

    let stored = stored_individual(&repository, "ind-1");
    assert_eq!(stored.status, IndividualStatus::Started);
    assert_eq!(
        stored.collection_progress.current_step.as_deref(),
        Some("personal_info")
    );
}

#[tokio::test]
async fn webhook_without_customer_is_a_bad_request() {
    let response = router_with(Vec::new())
        .oneshot(json_request(
            Method::POST,
            "/api/webhook/collect",
            &json!({ "individualId": "ind-1" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn completion_webhook_reports_next_steps() {
    let response = router_with(vec![individual("ind-1", IndividualStatus::InProgress)])
        .oneshot(json_request(
            Method::POST,
            "/api/webhook/collect/complete",
            &json!({
                "customerId": "cust-acme",
                "individualId": "ind-1",
                "collectionData": { "consents": true }
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["nextSteps"]["backgroundCheckInitiated"], true);
    assert!(payload["nextSteps"]["estimatedCompletionTime"].is_string());
}

#[tokio::test]
async fn store_outage_is_an_internal_error() {
    let service = CollectionService::new(
        Arc::new(UnavailableRepository),
        Arc::new(RecordingDispatcher::default()),
    );
    let response = collection_router(Arc::new(service))
        .oneshot(
            Request::get("/api/customers")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
