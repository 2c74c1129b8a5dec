use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use super::booking::parse_booking;
use super::domain::JobId;
use super::service::{
    ContractorReply, DispatchError, DispatchService, ReplyOutcome, ReplySender,
};
use super::store::StoreError;
use crate::crm::{JobRecordGateway, MessagingGateway};
use crate::phone::{PhoneNumber, PhoneNumberError};

const STORAGE_LABEL: &str = "in_memory_ephemeral";

/// Contractor listing, dispatch and reply webhook endpoints.
pub fn dispatch_router<M, J>(service: Arc<DispatchService<M, J>>) -> Router
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    Router::new()
        .route("/contractors", get(contractors_handler::<M, J>))
        .route("/dispatch", post(dispatch_handler::<M, J>))
        .route("/dispatch/:job_id/cancel", post(cancel_handler::<M, J>))
        .route("/contractor-reply", post(reply_handler::<M, J>))
        .with_state(service)
}

/// Job store inspection. Only mounted when debug routes are enabled.
pub fn debug_router<M, J>(service: Arc<DispatchService<M, J>>) -> Router
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    Router::new()
        .route("/debug/jobs", get(debug_jobs_handler::<M, J>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ContractorFilter {
    service_type: Option<String>,
    zip: Option<String>,
}

pub(crate) async fn contractors_handler<M, J>(
    State(service): State<Arc<DispatchService<M, J>>>,
    Query(filter): Query<ContractorFilter>,
) -> Response
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    let contractors = match (filter.service_type.as_deref(), filter.zip.as_deref()) {
        (Some(service_type), Some(zip)) => service.directory().list_eligible(service_type, zip),
        _ => service.directory().active(),
    };

    let payload = json!({
        "ok": true,
        "count": contractors.len(),
        "contractors": contractors,
    });
    (StatusCode::OK, axum::Json(payload)).into_response()
}

pub(crate) async fn dispatch_handler<M, J>(
    State(service): State<Arc<DispatchService<M, J>>>,
    axum::Json(payload): axum::Json<Value>,
) -> Response
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    let input = match parse_booking(payload, service.default_skill()) {
        Ok(input) => input,
        Err(err) => {
            let payload = json!({
                "ok": false,
                "error": err.to_string(),
                "fields": err.fields(),
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };

    match service.dispatch(input).await {
        Ok(report) => {
            let payload = json!({
                "ok": true,
                "job_id": report.job.id,
                "status": report.job.status,
                "contractors_notified": report.contractors_notified,
                "deliveries_failed": report.deliveries_failed,
                "no_contractors_available": report.no_contractors_available,
                "storage": STORAGE_LABEL,
                "job": report.job,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => internal_error("dispatch failed", err),
    }
}

pub(crate) async fn cancel_handler<M, J>(
    State(service): State<Arc<DispatchService<M, J>>>,
    Path(job_id): Path<String>,
) -> Response
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    let job_id = JobId(job_id);
    match service.cancel(&job_id) {
        Ok(job) => (StatusCode::OK, axum::Json(json!({ "ok": true, "job": job }))).into_response(),
        Err(DispatchError::Store(StoreError::NotFound(_))) => {
            let payload = json!({
                "ok": false,
                "error": format!("job {job_id} not found"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(DispatchError::Transition(err)) => {
            let payload = json!({
                "ok": false,
                "error": err.to_string(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(other) => internal_error("cancel failed", other),
    }
}

#[derive(Debug, Serialize)]
struct ReplyResponse {
    ok: bool,
    #[serde(flatten)]
    outcome: ReplyOutcome,
}

pub(crate) async fn reply_handler<M, J>(
    State(service): State<Arc<DispatchService<M, J>>>,
    axum::Json(payload): axum::Json<Value>,
) -> Response
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    let reply = match reply_from_webhook(&payload) {
        Ok(reply) => reply,
        Err(err) => {
            let payload = json!({
                "ok": false,
                "error": err.to_string(),
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
        }
    };

    match service.handle_reply(reply).await {
        Ok(outcome) => {
            let response = ReplyResponse {
                ok: outcome.is_resolved(),
                outcome,
            };
            (StatusCode::OK, axum::Json(response)).into_response()
        }
        Err(err) => internal_error("reply processing failed", err),
    }
}

pub(crate) async fn debug_jobs_handler<M, J>(
    State(service): State<Arc<DispatchService<M, J>>>,
) -> Response
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    match service.jobs() {
        Ok(jobs) => {
            let job_ids: Vec<&JobId> = jobs.iter().map(|job| &job.id).collect();
            let payload = json!({
                "ok": true,
                "count": jobs.len(),
                "job_ids": job_ids,
                "jobs": jobs,
                "storage": STORAGE_LABEL,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => internal_error("job snapshot failed", err),
    }
}

fn internal_error(context: &'static str, err: impl std::fmt::Display) -> Response {
    error!(error = %err, "{context}");
    let payload = json!({
        "ok": false,
        "error": err.to_string(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}

#[derive(Debug, thiserror::Error)]
pub enum ReplyPayloadError {
    #[error("reply must include the sender's phone number or CRM contact id")]
    MissingSender,
    #[error("sender phone is invalid: {0}")]
    InvalidPhone(#[from] PhoneNumberError),
}

/// Read a contractor reply from the messaging webhook. The CRM nests fields under
/// `customData` or a `message` object; plain `{from, message}` bodies work too.
pub fn reply_from_webhook(payload: &Value) -> Result<ContractorReply, ReplyPayloadError> {
    let custom = payload.get("customData").unwrap_or(&Value::Null);
    let message = payload.get("message").unwrap_or(&Value::Null);

    let contact_id = text(payload, "contact_id")
        .or_else(|| text(payload, "contactId"))
        .or_else(|| text(custom, "contact_id"));
    let phone = text(payload, "from")
        .or_else(|| text(payload, "from_phone"))
        .or_else(|| text(payload, "phone"))
        .or_else(|| text(custom, "phone"));

    let sender = match (contact_id, phone) {
        (Some(contact_id), _) => ReplySender::ContactId(contact_id),
        (None, Some(phone)) => ReplySender::Phone(PhoneNumber::parse(&phone)?),
        (None, None) => return Err(ReplyPayloadError::MissingSender),
    };

    let message_text = text(custom, "body")
        .or_else(|| text(message, "body"))
        .or_else(|| text(payload, "message"))
        .or_else(|| text(payload, "message_text"))
        .or_else(|| text(payload, "body"))
        .unwrap_or_default();

    Ok(ContractorReply {
        sender,
        message_text,
        job_id: text(custom, "job_id").or_else(|| text(payload, "job_id")),
    })
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(str::to_string)
}
