use crate::infra::{parse_date, AppState};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::{Local, NaiveDate};
use companion_registration::error::AppError;
use companion_registration::workflows::registration::dates::{age_on, parse_birth_date};
use companion_registration::workflows::registration::{
    registration_router, FieldFailure, FieldName, ProfileGateway, RegistrationPolicy,
    SessionRegistry, StepKey, ValidationReport, WorkflowError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct EligibilityRequest {
    /// Birthday as typed by the member (`M/D/YYYY`).
    pub(crate) birthday: String,
    /// Evaluation date as `YYYY-MM-DD`; defaults to today.
    #[serde(default)]
    pub(crate) today: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct EligibilityResponse {
    pub(crate) birthday: String,
    pub(crate) today: NaiveDate,
    pub(crate) age: u32,
    pub(crate) minimum_age: u32,
    pub(crate) eligible: bool,
}

pub(crate) fn with_registration_routes<G>(registry: Arc<SessionRegistry<G>>) -> axum::Router
where
    G: ProfileGateway + 'static,
{
    registration_router(registry)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/registrations/eligibility",
            axum::routing::post(eligibility_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Stateless age check against the configured policy, used by the sign-up screen.
pub(crate) async fn eligibility_endpoint(
    Extension(state): Extension<AppState>,
    Json(request): Json<EligibilityRequest>,
) -> Result<Json<EligibilityResponse>, AppError> {
    let today = match request.today.as_deref() {
        Some(raw) => parse_date(raw).map_err(|_| invalid_birthday("Enter a valid calendar date"))?,
        None => Local::now().date_naive(),
    };
    Ok(Json(check_eligibility(&request.birthday, today, &state.policy)?))
}

pub(crate) fn check_eligibility(
    birthday: &str,
    today: NaiveDate,
    policy: &RegistrationPolicy,
) -> Result<EligibilityResponse, WorkflowError> {
    let birth =
        parse_birth_date(birthday, today).map_err(|err| invalid_birthday(&err.to_string()))?;
    let age = age_on(birth, today)
        .ok_or_else(|| invalid_birthday("Birthday cannot be in the future"))?;

    Ok(EligibilityResponse {
        birthday: birthday.trim().to_string(),
        today,
        age,
        minimum_age: policy.minimum_age(),
        eligible: policy.is_eligible(Some(age)),
    })
}

fn invalid_birthday(message: &str) -> WorkflowError {
    WorkflowError::Validation(ValidationReport {
        failures: vec![FieldFailure {
            field: FieldName::Birthday,
            step: StepKey::BasicInfo,
            message: message.to_string(),
        }],
    })
}
