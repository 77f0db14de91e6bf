use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::json;

use super::dispatch::NotificationSink;
use super::request::{EvaluateRequest, ValidationError};
use super::service::{CallComplianceService, ComplianceServiceError};
use super::store::RuleStore;

/// Router builder exposing the call evaluation endpoint.
pub fn compliance_router<S, N>(service: Arc<CallComplianceService<S, N>>) -> Router
where
    S: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/compliance/evaluate",
            post(evaluate_handler::<S, N>),
        )
        .with_state(service)
}

pub(crate) async fn evaluate_handler<S, N>(
    State(service): State<Arc<CallComplianceService<S, N>>>,
    payload: Result<axum::Json<EvaluateRequest>, JsonRejection>,
) -> Response
where
    S: RuleStore + 'static,
    N: NotificationSink + 'static,
{
    let outcome = match payload {
        Ok(axum::Json(request)) => service.evaluate_request(request).await,
        Err(rejection) => Err(ValidationError::MalformedBody(rejection.body_text()).into()),
    };

    match outcome {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(ComplianceServiceError::Validation(error)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(ComplianceServiceError::RuleStoreUnavailable(error)) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
    }
}
