use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use super::domain::{
    ActionUpdate, CommunicationSettingsUpdate, CommunicationStatus, ContactInfo, CustomerId,
    CustomerUpdate, IndividualId, IndividualStatus, NewCommunication, NewCustomer, NewIndividual,
    NewScheduledAction, WebhookSettingsUpdate,
};
use super::executor::MessageDispatcher;
use super::repository::{CustomerRepository, RepositoryError};
use super::service::{CollectionService, CollectionServiceError, CompletionReport, ProgressReport};
use super::webhook::SIGNATURE_HEADER;

type SharedService<R, D> = Arc<CollectionService<R, D>>;

/// Customer administration plus the inbound collection webhooks.
pub fn collection_router<R, D>(service: SharedService<R, D>) -> Router
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/customers",
            get(list_customers::<R, D>).post(create_customer::<R, D>),
        )
        .route("/api/customers/actions/due", get(due_actions::<R, D>))
        .route(
            "/api/customers/:customer_id",
            get(fetch_customer::<R, D>)
                .put(update_customer::<R, D>)
                .delete(delete_customer::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals",
            post(add_individual::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id",
            delete(remove_individual::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/status",
            patch(update_status::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/contact",
            patch(update_contact::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/invite",
            post(invite::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/communications",
            post(add_communication::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/communications/:message_id",
            patch(update_communication_status::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/actions",
            post(add_action::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/individuals/:individual_id/actions/:index",
            patch(update_action::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/communication-settings",
            patch(update_communication_settings::<R, D>),
        )
        .route(
            "/api/customers/:customer_id/webhook-settings",
            patch(update_webhook_settings::<R, D>),
        )
        .route("/api/webhook/collect", post(collect_webhook::<R, D>))
        .route(
            "/api/webhook/collect/complete",
            post(complete_webhook::<R, D>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusRequest {
    status: IndividualStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommunicationStatusRequest {
    status: CommunicationStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InviteRequest {
    #[serde(default)]
    contact_info: Option<ContactInfo>,
}

fn error_response(error: CollectionServiceError) -> Response {
    let status = match &error {
        CollectionServiceError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
        CollectionServiceError::Repository(RepositoryError::Conflict(_))
        | CollectionServiceError::Repository(RepositoryError::VersionConflict { .. })
        | CollectionServiceError::Transition(_)
        | CollectionServiceError::ActionExecuted(_) => StatusCode::CONFLICT,
        CollectionServiceError::MissingField(_) | CollectionServiceError::Settings(_) => {
            StatusCode::BAD_REQUEST
        }
        CollectionServiceError::Schedule(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CollectionServiceError::Signature(_) => StatusCode::UNAUTHORIZED,
        CollectionServiceError::Repository(RepositoryError::Unavailable(_)) => {
            tracing::error!(error = %error, "customer store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Webhook bodies are read raw so the signature covers the exact bytes received.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| bad_request(format!("invalid JSON body: {err}")))
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, CollectionServiceError>,
) -> Response {
    match result {
        Ok(value) => (status, Json(value)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_customers<R, D>(State(service): State<SharedService<R, D>>) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(StatusCode::OK, service.list_customers())
}

pub(crate) async fn create_customer<R, D>(
    State(service): State<SharedService<R, D>>,
    Json(payload): Json<NewCustomer>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(StatusCode::CREATED, service.create_customer(payload, Utc::now()))
}

pub(crate) async fn due_actions<R, D>(State(service): State<SharedService<R, D>>) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(StatusCode::OK, service.due_actions(Utc::now()))
}

pub(crate) async fn fetch_customer<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(StatusCode::OK, service.get_customer(&CustomerId(customer_id)))
}

pub(crate) async fn update_customer<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(customer_id): Path<String>,
    Json(update): Json<CustomerUpdate>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_customer(&CustomerId(customer_id), update),
    )
}

pub(crate) async fn delete_customer<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(customer_id): Path<String>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    match service.delete_customer(&CustomerId(customer_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn add_individual<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(customer_id): Path<String>,
    Json(payload): Json<NewIndividual>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.add_individual(&CustomerId(customer_id), payload, Utc::now()),
    )
}

pub(crate) async fn remove_individual<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id)): Path<(String, String)>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    match service.remove_individual(&CustomerId(customer_id), &IndividualId(individual_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_status<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id)): Path<(String, String)>,
    Json(request): Json<StatusRequest>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_status(
            &CustomerId(customer_id),
            &IndividualId(individual_id),
            request.status,
            Utc::now(),
        ),
    )
}

pub(crate) async fn update_contact<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id)): Path<(String, String)>,
    Json(contact): Json<ContactInfo>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_contact(&CustomerId(customer_id), &IndividualId(individual_id), contact),
    )
}

/// The body is optional; when present it may replace the contact info before sending.
pub(crate) async fn invite<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id)): Path<(String, String)>,
    body: Bytes,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        InviteRequest::default()
    } else {
        match parse_body::<InviteRequest>(&body) {
            Ok(request) => request,
            Err(response) => return response,
        }
    };
    respond(
        StatusCode::OK,
        service.invite(
            &CustomerId(customer_id),
            &IndividualId(individual_id),
            request.contact_info,
            Utc::now(),
        ),
    )
}

pub(crate) async fn add_communication<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id)): Path<(String, String)>,
    Json(payload): Json<NewCommunication>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.add_communication(
            &CustomerId(customer_id),
            &IndividualId(individual_id),
            payload,
            Utc::now(),
        ),
    )
}

pub(crate) async fn update_communication_status<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id, message_id)): Path<(String, String, String)>,
    Json(request): Json<CommunicationStatusRequest>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_communication_status(
            &CustomerId(customer_id),
            &IndividualId(individual_id),
            &message_id,
            request.status,
        ),
    )
}

pub(crate) async fn add_action<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id)): Path<(String, String)>,
    Json(payload): Json<NewScheduledAction>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.add_action(&CustomerId(customer_id), &IndividualId(individual_id), payload),
    )
}

pub(crate) async fn update_action<R, D>(
    State(service): State<SharedService<R, D>>,
    Path((customer_id, individual_id, index)): Path<(String, String, usize)>,
    Json(update): Json<ActionUpdate>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_action(
            &CustomerId(customer_id),
            &IndividualId(individual_id),
            index,
            update,
            Utc::now(),
        ),
    )
}

pub(crate) async fn update_communication_settings<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(customer_id): Path<String>,
    Json(update): Json<CommunicationSettingsUpdate>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_communication_settings(&CustomerId(customer_id), update),
    )
}

pub(crate) async fn update_webhook_settings<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(customer_id): Path<String>,
    Json(update): Json<WebhookSettingsUpdate>,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    respond(
        StatusCode::OK,
        service.update_webhook_settings(&CustomerId(customer_id), update),
    )
}

pub(crate) async fn collect_webhook<R, D>(
    State(service): State<SharedService<R, D>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    let report: ProgressReport = match parse_body(&body) {
        Ok(report) => report,
        Err(response) => return response,
    };
    let Some(customer_id) = report.customer_id.clone() else {
        return error_response(CollectionServiceError::MissingField("customerId"));
    };
    if let Err(error) = service.verify_webhook(&customer_id, signature(&headers), &body) {
        tracing::warn!(customer_id = %customer_id, error = %error, "collect webhook rejected");
        return error_response(error);
    }

    let now = Utc::now();
    match service.record_progress(report, now) {
        Ok(individual) => {
            let payload = json!({
                "received": true,
                "timestamp": now,
                "status": individual.status,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn complete_webhook<R, D>(
    State(service): State<SharedService<R, D>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    R: CustomerRepository + 'static,
    D: MessageDispatcher + 'static,
{
    let report: CompletionReport = match parse_body(&body) {
        Ok(report) => report,
        Err(response) => return response,
    };
    let Some(customer_id) = report.customer_id.clone() else {
        return error_response(CollectionServiceError::MissingField("customerId"));
    };
    if let Err(error) = service.verify_webhook(&customer_id, signature(&headers), &body) {
        tracing::warn!(customer_id = %customer_id, error = %error, "completion webhook rejected");
        return error_response(error);
    }

    let now = Utc::now();
    match service.complete_collection(report, now) {
        Ok(receipt) => {
            let payload = json!({
                "received": true,
                "timestamp": now,
                "nextSteps": {
                    "backgroundCheckInitiated": receipt.background_check_initiated,
                    "estimatedCompletionTime": receipt.estimated_completion_time,
                },
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
