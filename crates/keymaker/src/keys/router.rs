use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::codec::{DecodeError, DecodedKey, KeyGrammar};
use super::link::LinkAnalysis;
use super::store::{KeyRegistry, KeyStore, KeyStoreError};

/// Router exposing key encoding, decoding, analysis and saved-key endpoints.
pub fn key_router<S>(registry: Arc<KeyRegistry<S>>) -> Router
where
    S: KeyStore + 'static,
{
    Router::new()
        .route("/api/keys", get(list_handler::<S>).post(create_handler::<S>))
        .route("/api/keys/encode", post(encode_handler))
        .route("/api/keys/decode", post(decode_handler::<S>))
        .route("/api/keys/analyze", post(analyze_handler::<S>))
        .route(
            "/api/keys/:key_id",
            get(fetch_handler::<S>).delete(delete_handler::<S>),
        )
        .with_state(registry)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum CreateKeyRequest {
    Value { value: String },
    Payload(DecodedKey),
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecodeRequest {
    key: String,
    #[serde(default)]
    grammar: Option<KeyGrammar>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalyzeRequest {
    input: String,
}

fn decode_error_body(error: &DecodeError) -> Value {
    json!({
        "error": error.to_string(),
        "facet": error.facet(),
        "expected": error.expected(),
    })
}

fn decode_error_response(error: &DecodeError) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(decode_error_body(error))).into_response()
}

fn store_error_response(error: KeyStoreError) -> Response {
    match error {
        KeyStoreError::Invalid(error) => decode_error_response(&error),
        KeyStoreError::Duplicate(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        KeyStoreError::NotFound => {
            let payload = json!({ "error": "key not found" });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        KeyStoreError::Unavailable(_) => {
            tracing::error!(error = %error, "key store failure");
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn list_handler<S>(State(registry): State<Arc<KeyRegistry<S>>>) -> Response
where
    S: KeyStore + 'static,
{
    match registry.list() {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(error) => store_error_response(error),
    }
}

pub(crate) async fn create_handler<S>(
    State(registry): State<Arc<KeyRegistry<S>>>,
    Json(request): Json<CreateKeyRequest>,
) -> Response
where
    S: KeyStore + 'static,
{
    let created = match request {
        CreateKeyRequest::Value { value } => registry.create(&value),
        CreateKeyRequest::Payload(decoded) => registry.create_from(&decoded),
    };
    match created {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => store_error_response(error),
    }
}

pub(crate) async fn fetch_handler<S>(
    State(registry): State<Arc<KeyRegistry<S>>>,
    Path(key_id): Path<String>,
) -> Response
where
    S: KeyStore + 'static,
{
    match registry.get(&key_id) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => store_error_response(error),
    }
}

pub(crate) async fn delete_handler<S>(
    State(registry): State<Arc<KeyRegistry<S>>>,
    Path(key_id): Path<String>,
) -> Response
where
    S: KeyStore + 'static,
{
    match registry.delete(&key_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => store_error_response(error),
    }
}

pub(crate) async fn encode_handler(Json(payload): Json<DecodedKey>) -> Response {
    let body = json!({
        "key": payload.encode(),
        "grammar": payload.grammar(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

pub(crate) async fn decode_handler<S>(
    State(registry): State<Arc<KeyRegistry<S>>>,
    Json(request): Json<DecodeRequest>,
) -> Response
where
    S: KeyStore + 'static,
{
    let codec = registry.codec();
    let decoded = match request.grammar {
        Some(grammar) => codec.decode_with(&request.key, grammar),
        None => codec.decode_any(&request.key),
    };
    match decoded {
        Ok(decoded) => (StatusCode::OK, Json(decoded)).into_response(),
        Err(error) => decode_error_response(&error),
    }
}

pub(crate) async fn analyze_handler<S>(
    State(registry): State<Arc<KeyRegistry<S>>>,
    Json(request): Json<AnalyzeRequest>,
) -> Response
where
    S: KeyStore + 'static,
{
    let analysis = LinkAnalysis::parse(&request.input);
    let decoded = analysis
        .key
        .as_deref()
        .map(|key| registry.codec().decode_any(key));

    let (decoded, error) = match decoded {
        Some(Ok(decoded)) => (Some(decoded), None),
        Some(Err(error)) => (None, Some(decode_error_body(&error))),
        None => (None, None),
    };

    let body = json!({
        "analysis": analysis,
        "decoded": decoded,
        "decodeError": error,
    });
    (StatusCode::OK, Json(body)).into_response()
}
