use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::controller::{Command, ErrorCategory, Transition, WorkflowError};
use super::domain::{Phase1Identity, SessionId};
use super::gateway::ProfileGateway;
use super::registry::SessionRegistry;
use super::session::SessionView;

/// Body of `POST /api/v1/registrations`; identity comes from the account-creation step.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub identity: Option<Phase1Identity>,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub transition: Transition,
    /// Absent once the session has been submitted or abandoned.
    pub session: Option<SessionView>,
}

/// Router builder exposing the registration wizard over HTTP.
pub fn registration_router<G>(registry: Arc<SessionRegistry<G>>) -> Router
where
    G: ProfileGateway + 'static,
{
    Router::new()
        .route("/api/v1/registrations", post(start_handler::<G>))
        .route("/api/v1/registrations/resume", post(resume_handler::<G>))
        .route(
            "/api/v1/registrations/:session_id",
            get(view_handler::<G>).delete(abandon_handler::<G>),
        )
        .route(
            "/api/v1/registrations/:session_id/commands",
            post(command_handler::<G>),
        )
        .with_state(registry)
}

pub(crate) async fn start_handler<G>(
    State(registry): State<Arc<SessionRegistry<G>>>,
    axum::Json(request): axum::Json<StartRequest>,
) -> Response
where
    G: ProfileGateway + 'static,
{
    let view = registry.start(request.identity);
    (StatusCode::CREATED, axum::Json(view)).into_response()
}

pub(crate) async fn resume_handler<G>(
    State(registry): State<Arc<SessionRegistry<G>>>,
    axum::Json(identity): axum::Json<Phase1Identity>,
) -> Response
where
    G: ProfileGateway + 'static,
{
    match registry.resume(identity).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => workflow_error_response(&error),
    }
}

pub(crate) async fn view_handler<G>(
    State(registry): State<Arc<SessionRegistry<G>>>,
    Path(session_id): Path<String>,
) -> Response
where
    G: ProfileGateway + 'static,
{
    match registry.view(&SessionId(session_id)) {
        Some(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        None => workflow_error_response(&WorkflowError::NoActiveSession),
    }
}

pub(crate) async fn command_handler<G>(
    State(registry): State<Arc<SessionRegistry<G>>>,
    Path(session_id): Path<String>,
    axum::Json(command): axum::Json<Command>,
) -> Response
where
    G: ProfileGateway + 'static,
{
    let id = SessionId(session_id);
    match registry.dispatch(&id, command).await {
        Ok(transition) => {
            let body = CommandResponse {
                transition,
                session: registry.view(&id),
            };
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(error) => workflow_error_response(&error),
    }
}

/// Deleting a registration is an explicit, confirmed abandon.
pub(crate) async fn abandon_handler<G>(
    State(registry): State<Arc<SessionRegistry<G>>>,
    Path(session_id): Path<String>,
) -> Response
where
    G: ProfileGateway + 'static,
{
    let id = SessionId(session_id);
    match registry
        .dispatch(&id, Command::Abandon { confirmed: true })
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => workflow_error_response(&error),
    }
}

pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::BackendRejection | ErrorCategory::Transport => StatusCode::BAD_GATEWAY,
        ErrorCategory::FatalPrecondition => StatusCode::PRECONDITION_REQUIRED,
        ErrorCategory::Conflict => StatusCode::CONFLICT,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::InvalidRequest => StatusCode::BAD_REQUEST,
    }
}

pub fn workflow_error_response(error: &WorkflowError) -> Response {
    let category = error.category();
    let mut payload = json!({
        "error": error.to_string(),
        "category": category,
    });

    match error {
        WorkflowError::Validation(report) => {
            payload["failures"] = json!(report.failures);
        }
        WorkflowError::AgeIneligible { age, minimum, .. } => {
            payload["age"] = json!(age);
            payload["minimum_age"] = json!(minimum);
        }
        WorkflowError::Backend { kind, .. } => {
            payload["backend"] = json!(kind);
        }
        _ => {}
    }

    (status_for(category), axum::Json(payload)).into_response()
}
