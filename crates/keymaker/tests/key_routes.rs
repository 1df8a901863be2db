use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use keymaker::keys::{key_router, InMemoryKeyStore, KeyCodec, KeyRegistry};
use serde_json::{json, Value};
use tower::ServiceExt;

fn router() -> axum::Router {
    key_router(Arc::new(KeyRegistry::new(
        KeyCodec::strict(),
        Arc::new(InMemoryKeyStore::default()),
    )))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn decode_reports_which_facet_failed() {
    let response = router()
        .oneshot(post_json(
            "/api/keys/decode",
            json!({ "key": "en-EPX-N-N-N-N-N-E" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert_eq!(body["facet"], "personal_info");
    assert!(body["error"].as_str().is_some_and(|msg| msg.contains("EPX")));
}

#[tokio::test]
async fn decode_returns_the_tagged_requirements() {
    let response = router()
        .oneshot(post_json(
            "/api/keys/decode",
            json!({ "key": "en-EPA-DTB-R5-E3-E-P-W" }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["grammar"], "facet");
    assert_eq!(body["requirements"]["signature"], "Wet");
    assert_eq!(
        body["requirements"]["residenceHistory"],
        json!({ "required": true, "years": 5 })
    );
}

#[tokio::test]
async fn analyze_extracts_key_and_identifiers_from_links() {
    let response = router()
        .oneshot(post_json(
            "/api/keys/analyze",
            json!({
                "input": "https://collect.example.com/collect/en-EPA-DTB-R5-E3-E-P-W?spid=cust-1&puid=ind-2"
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["analysis"]["kind"], "individual");
    assert_eq!(body["analysis"]["key"], "en-EPA-DTB-R5-E3-E-P-W");
    assert_eq!(body["analysis"]["spid"], "cust-1");
    assert_eq!(body["decoded"]["grammar"], "facet");
}

#[tokio::test]
async fn saved_keys_can_be_listed_and_deleted() {
    let router = router();

    let created = router
        .clone()
        .oneshot(post_json("/api/keys", json!({ "value": "fr-E-N-N-N-N-N-E" })))
        .await
        .expect("response");
    assert_eq!(created.status(), StatusCode::CREATED);
    let record = read_json(created).await;
    let id = record["id"].as_str().expect("id").to_string();

    let duplicate = router
        .clone()
        .oneshot(post_json("/api/keys", json!({ "value": "fr-E-N-N-N-N-N-E" })))
        .await
        .expect("response");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let listed = router
        .clone()
        .oneshot(Request::get("/api/keys").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(read_json(listed).await.as_array().map(Vec::len), Some(1));

    let deleted = router
        .clone()
        .oneshot(
            Request::delete(format!("/api/keys/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = router
        .oneshot(
            Request::get(format!("/api/keys/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn encode_builds_a_key_from_requirements() {
    let response = router()
        .oneshot(post_json(
            "/api/keys/encode",
            json!({
                "grammar": "facet",
                "requirements": {
                    "language": "es",
                    "personalInfo": { "email": true, "phone": true, "address": false },
                    "consents": { "drug_test": false, "tax_forms": true, "biometric": false },
                    "residenceHistory": { "required": false },
                    "employmentHistory": { "required": true, "mode": "employers", "value": 2 },
                    "education": false,
                    "professionalLicense": true,
                    "signature": "Electronic"
                }
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["key"], "es-EP-T-N-EN2-N-P-E");
}
