use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::registration::{
    registration_router, Clock, Command, FieldName, FieldValue, FixedClock, GatewayError,
    ImageRef, Phase1Identity, ProfileGateway, ProfilePayload, ProfileSnapshot,
    RegistrationController, RegistrationPolicy, SessionRegistry,
};

pub(super) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date")
}

pub(super) fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(today()))
}

/// Clock a test can move forward between commands.
pub(super) struct SteppingClock {
    today: Mutex<NaiveDate>,
}

impl SteppingClock {
    pub(super) fn starting(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub(super) fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().expect("clock mutex poisoned");
        *today = *today + chrono::Days::new(days);
    }
}

impl Clock for SteppingClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().expect("clock mutex poisoned")
    }
}

pub(super) fn identity() -> Phase1Identity {
    Phase1Identity::new("ana.cruz", "ana.cruz@example.com")
}

pub(super) fn new_controller<G: ProfileGateway>(gateway: Arc<G>) -> RegistrationController<G> {
    RegistrationController::new(gateway, clock(), RegistrationPolicy::default())
}

pub(super) fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

pub(super) fn choice(value: &str) -> FieldValue {
    FieldValue::SingleSelect(Some(value.to_string()))
}

pub(super) fn many(values: &[&str]) -> FieldValue {
    FieldValue::MultiSelect(values.iter().map(|value| value.to_string()).collect())
}

pub(super) fn photos(uris: &[&str]) -> FieldValue {
    FieldValue::Photos(uris.iter().map(|uri| ImageRef(uri.to_string())).collect())
}

pub(super) fn basic_info(birthday: &str) -> Vec<(FieldName, FieldValue)> {
    vec![
        (FieldName::FirstName, text("Ana")),
        (FieldName::LastName, text("Cruz")),
        (FieldName::Birthday, FieldValue::Date(birthday.to_string())),
        (FieldName::Country, choice("Philippines")),
        (FieldName::CivilStatus, choice("Widowed")),
        (FieldName::City, text("Manila")),
        (FieldName::Hobby, many(&["Cooking"])),
    ]
}

pub(super) fn id_verification() -> Vec<(FieldName, FieldValue)> {
    vec![
        (FieldName::IdType, choice("Senior Citizen ID")),
        (FieldName::IdNumber, text("SC-2024-0099")),
        (FieldName::IdPhotos, photos(&["file:///id-front.jpg"])),
    ]
}

pub(super) fn document_upload() -> Vec<(FieldName, FieldValue)> {
    vec![(FieldName::ProfilePhotos, photos(&["file:///portrait.jpg"]))]
}

pub(super) fn about_you() -> Vec<(FieldName, FieldValue)> {
    vec![
        (
            FieldName::AboutMe,
            text("Retired teacher who loves long walks by the bay."),
        ),
        (FieldName::Interests, many(&["Travel", "Music"])),
        (FieldName::LookingFor, choice("Companionship")),
    ]
}

/// Change and blur each field, as a member filling in the form would.
pub(super) async fn fill<G: ProfileGateway>(
    controller: &RegistrationController<G>,
    values: Vec<(FieldName, FieldValue)>,
) {
    for (field, value) in values {
        controller
            .dispatch(Command::FieldChange { field, value })
            .await
            .expect("field change accepted");
        controller
            .dispatch(Command::FieldBlur { field })
            .await
            .expect("field blur accepted");
    }
}

/// Fill and save every step before the last, leaving the session on "About You".
pub(super) async fn walk_to_final_step<G: ProfileGateway>(
    controller: &RegistrationController<G>,
    birthday: &str,
) {
    for values in [basic_info(birthday), id_verification(), document_upload()] {
        fill(controller, values).await;
        controller
            .dispatch(Command::Next)
            .await
            .expect("step saves and advances");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum GatewayCall {
    Update {
        username: String,
        payload: ProfilePayload,
    },
    Complete {
        username: String,
        payload: ProfilePayload,
        mark_complete: bool,
    },
}

#[derive(Default)]
pub(super) struct MemoryGateway {
    calls: Mutex<Vec<GatewayCall>>,
    snapshots: Mutex<HashMap<String, ProfileSnapshot>>,
}

impl MemoryGateway {
    pub(super) fn with_snapshot(username: &str, snapshot: ProfileSnapshot) -> Self {
        let gateway = Self::default();
        gateway
            .snapshots
            .lock()
            .expect("snapshot mutex poisoned")
            .insert(username.to_string(), snapshot);
        gateway
    }

    pub(super) fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().expect("call mutex poisoned").clone()
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().expect("call mutex poisoned").push(call);
    }
}

#[async_trait]
impl ProfileGateway for MemoryGateway {
    async fn update_profile(
        &self,
        username: &str,
        partial: &ProfilePayload,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Update {
            username: username.to_string(),
            payload: partial.clone(),
        });
        Ok(())
    }

    async fn complete_profile(
        &self,
        username: &str,
        payload: &ProfilePayload,
        mark_complete: bool,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::Complete {
            username: username.to_string(),
            payload: payload.clone(),
            mark_complete,
        });
        Ok(())
    }

    async fn current_profile(&self, username: &str) -> Result<ProfileSnapshot, GatewayError> {
        Ok(self
            .snapshots
            .lock()
            .expect("snapshot mutex poisoned")
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

/// Backend that refuses every call with the same error.
pub(super) struct RejectingGateway {
    pub(super) error: GatewayError,
    pub(super) attempts: AtomicUsize,
}

impl RejectingGateway {
    pub(super) fn new(error: GatewayError) -> Self {
        Self {
            error,
            attempts: AtomicUsize::new(0),
        }
    }

    fn refuse<T>(&self) -> Result<T, GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

#[async_trait]
impl ProfileGateway for RejectingGateway {
    async fn update_profile(&self, _: &str, _: &ProfilePayload) -> Result<(), GatewayError> {
        self.refuse()
    }

    async fn complete_profile(
        &self,
        _: &str,
        _: &ProfilePayload,
        _: bool,
    ) -> Result<(), GatewayError> {
        self.refuse()
    }

    async fn current_profile(&self, _: &str) -> Result<ProfileSnapshot, GatewayError> {
        self.refuse()
    }
}

/// Holds every update call open until the test releases it.
#[derive(Default)]
pub(super) struct GatedGateway {
    pub(super) entered: Notify,
    pub(super) release: Notify,
    updates: AtomicUsize,
}

impl GatedGateway {
    pub(super) fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileGateway for GatedGateway {
    async fn update_profile(&self, _: &str, _: &ProfilePayload) -> Result<(), GatewayError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }

    async fn complete_profile(
        &self,
        _: &str,
        _: &ProfilePayload,
        _: bool,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn current_profile(&self, _: &str) -> Result<ProfileSnapshot, GatewayError> {
        Ok(ProfileSnapshot::default())
    }
}

/// Holds every profile read open until the test releases it.
#[derive(Default)]
pub(super) struct HeldProfileGateway {
    pub(super) entered: Notify,
    pub(super) release: Notify,
}

#[async_trait]
impl ProfileGateway for HeldProfileGateway {
    async fn update_profile(&self, _: &str, _: &ProfilePayload) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn complete_profile(
        &self,
        _: &str,
        _: &ProfilePayload,
        _: bool,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn current_profile(&self, _: &str) -> Result<ProfileSnapshot, GatewayError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(ProfileSnapshot::default())
    }
}

pub(super) fn new_registry(gateway: Arc<MemoryGateway>) -> Arc<SessionRegistry<MemoryGateway>> {
    Arc::new(SessionRegistry::new(
        gateway,
        clock(),
        RegistrationPolicy::default(),
    ))
}

pub(super) fn app_router(registry: Arc<SessionRegistry<MemoryGateway>>) -> axum::Router {
    registration_router(registry)
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable");
    serde_json::from_slice(&bytes).expect("body is json")
}

pub(super) async fn assert_error_response(response: Response, status: StatusCode, message: &str) {
    assert_eq!(response.status(), status);
    let body = json_body(response).await;
    assert_eq!(body["error"], message);
}
