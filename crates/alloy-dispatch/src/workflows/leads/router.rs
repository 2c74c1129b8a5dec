use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;

use super::domain::{CleaningLeadRequest, LeadKind, LeadReceipt, ProsApplicationRequest};
use super::service::{LeadIntakeError, LeadIntakeService};
use crate::crm::ContactGateway;

/// Website form endpoints.
pub fn lead_router<C>(service: Arc<LeadIntakeService<C>>) -> Router
where
    C: ContactGateway + 'static,
{
    Router::new()
        .route("/leads/cleaning", post(cleaning_handler::<C>))
        .route("/leads/pros", post(pros_handler::<C>))
        .with_state(service)
}

pub(crate) async fn cleaning_handler<C>(
    State(service): State<Arc<LeadIntakeService<C>>>,
    axum::Json(lead): axum::Json<CleaningLeadRequest>,
) -> Response
where
    C: ContactGateway + 'static,
{
    respond(LeadKind::Cleaning, service.submit_cleaning_lead(lead).await)
}

pub(crate) async fn pros_handler<C>(
    State(service): State<Arc<LeadIntakeService<C>>>,
    axum::Json(application): axum::Json<ProsApplicationRequest>,
) -> Response
where
    C: ContactGateway + 'static,
{
    respond(
        LeadKind::ProsApplication,
        service.submit_pros_application(application).await,
    )
}

fn respond(kind: LeadKind, result: Result<LeadReceipt, LeadIntakeError>) -> Response {
    match result {
        Ok(receipt) => {
            let payload = json!({
                "ok": true,
                "contact_id": receipt.contact_id,
                "message": kind.confirmation(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(LeadIntakeError::Validation(error)) => {
            let payload = json!({
                "ok": false,
                "error": error.to_string(),
                "fields": error.fields,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        Err(LeadIntakeError::Upstream(_)) => {
            let payload = json!({
                "ok": false,
                "error": "We couldn't save your submission right now. Please try again shortly.",
            });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
    }
}
