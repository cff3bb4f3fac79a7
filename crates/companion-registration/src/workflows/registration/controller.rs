use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::blueprint::{RegistrationBlueprint, StepPersistence};
use super::dates::Clock;
use super::domain::{FieldName, FieldValue, Phase1Identity, SessionId, SessionStatus};
use super::gateway::{BackendFailureKind, GatewayError, ProfileGateway};
use super::merge::{completion_payload, step_payload, MergeError, ProfilePayload};
use super::session::{RegistrationSession, SessionView, StepGuardError};
use super::validation::{FormValidator, RegistrationPolicy, ValidationReport};

/// Events dispatched by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    FieldChange { field: FieldName, value: FieldValue },
    FieldBlur { field: FieldName },
    ValidateAll,
    Next,
    Back,
    SubmitStep,
    FinalSubmit,
    Abandon {
        #[serde(default)]
        confirmed: bool,
    },
}

impl Command {
    pub const fn label(&self) -> &'static str {
        match self {
            Command::FieldChange { .. } => "field_change",
            Command::FieldBlur { .. } => "field_blur",
            Command::ValidateAll => "validate_all",
            Command::Next => "next",
            Command::Back => "back",
            Command::SubmitStep => "submit_step",
            Command::FinalSubmit => "final_submit",
            Command::Abandon { .. } => "abandon",
        }
    }
}

/// Successful outcome of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    FieldUpdated {
        field: FieldName,
        error: Option<String>,
        derived_age: Option<u32>,
    },
    FieldTouched {
        field: FieldName,
        error: Option<String>,
    },
    Validated {
        report: ValidationReport,
    },
    Advanced {
        from: usize,
        to: usize,
    },
    /// Progress was saved but the member had already navigated away from the saved step.
    Saved {
        step_index: usize,
    },
    Retreated {
        from: usize,
        to: usize,
    },
    Submitted {
        session_id: SessionId,
        payload: ProfilePayload,
    },
    Abandoned {
        session_id: SessionId,
    },
}

/// Typed failure of a dispatched command; the presentation layer picks the notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("some fields need attention: {0}")]
    Validation(ValidationReport),
    #[error("{message}")]
    AgeIneligible {
        age: Option<u32>,
        minimum: u32,
        message: String,
    },
    #[error("{message}")]
    Backend {
        kind: BackendFailureKind,
        message: String,
    },
    #[error("registration must restart from account creation")]
    MissingIdentity,
    #[error("another step transition is still in progress")]
    Busy,
    #[error("no active registration session")]
    NoActiveSession,
    #[error("registration was already submitted")]
    AlreadySubmitted,
    #[error("profile is already complete")]
    AlreadyCompleted,
    #[error("registration session was discarded before the backend responded")]
    SessionDiscarded,
    #[error("{field} expects a {expected} value, got {found}")]
    KindMismatch {
        field: FieldName,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{0} is not part of the registration form")]
    UnknownField(FieldName),
    #[error("there are unsaved changes; confirm to abandon registration")]
    UnsavedChanges,
    #[error("use final submit on the last step")]
    AtFinalStep,
    #[error("final submit is only available on the last step")]
    NotAtFinalStep,
    #[error("step cannot be left: {0}")]
    StepBlocked(#[from] StepGuardError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Coarse grouping of workflow errors for mapping onto user-facing channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    BackendRejection,
    Transport,
    FatalPrecondition,
    Conflict,
    NotFound,
    InvalidRequest,
}

impl WorkflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Validation(_)
            | WorkflowError::AgeIneligible { .. }
            | WorkflowError::StepBlocked(_)
            | WorkflowError::Merge(_) => ErrorCategory::Validation,
            WorkflowError::Backend {
                kind: BackendFailureKind::Rejected,
                ..
            } => ErrorCategory::BackendRejection,
            WorkflowError::Backend {
                kind: BackendFailureKind::Transport,
                ..
            } => ErrorCategory::Transport,
            WorkflowError::MissingIdentity => ErrorCategory::FatalPrecondition,
            WorkflowError::Busy
            | WorkflowError::AlreadySubmitted
            | WorkflowError::AlreadyCompleted
            | WorkflowError::SessionDiscarded
            | WorkflowError::UnsavedChanges => ErrorCategory::Conflict,
            WorkflowError::NoActiveSession => ErrorCategory::NotFound,
            WorkflowError::KindMismatch { .. }
            | WorkflowError::UnknownField(_)
            | WorkflowError::AtFinalStep
            | WorkflowError::NotAtFinalStep => ErrorCategory::InvalidRequest,
        }
    }

    /// Fatal errors cannot be recovered inside the wizard.
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::FatalPrecondition
    }

    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            WorkflowError::Validation(report) => Some(report),
            _ => None,
        }
    }
}

impl From<GatewayError> for WorkflowError {
    fn from(error: GatewayError) -> Self {
        WorkflowError::Backend {
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }
}

#[derive(Default)]
struct ControllerState {
    session: Option<RegistrationSession>,
    in_flight: Option<InFlight>,
    /// Id of the last session that reached `Submitted`; its data is already discarded.
    submitted: Option<SessionId>,
}

struct InFlight {
    session_id: SessionId,
    command: &'static str,
}

impl ControllerState {
    fn is_busy(&self) -> bool {
        match (&self.in_flight, &self.session) {
            (Some(flight), Some(session)) => &flight.session_id == session.id(),
            _ => false,
        }
    }

    fn active_mut(&mut self) -> Result<&mut RegistrationSession, WorkflowError> {
        match (self.session.as_mut(), &self.submitted) {
            (Some(session), _) => Ok(session),
            (None, Some(_)) => Err(WorkflowError::AlreadySubmitted),
            (None, None) => Err(WorkflowError::NoActiveSession),
        }
    }

    fn replace(&mut self, session: RegistrationSession) {
        self.session = Some(session);
        self.submitted = None;
    }

    /// Active session that may start a step transition right now.
    fn ready_for_transition(&mut self) -> Result<&mut RegistrationSession, WorkflowError> {
        let busy = self.is_busy();
        let session = self.active_mut()?;
        if busy {
            return Err(WorkflowError::Busy);
        }
        if !session.identity().is_some_and(Phase1Identity::is_usable) {
            return Err(WorkflowError::MissingIdentity);
        }
        Ok(session)
    }

    /// The session a backend call was issued for, if it is still the active one.
    fn still_active(&mut self, id: &SessionId) -> Result<&mut RegistrationSession, WorkflowError> {
        match self.session.as_mut() {
            Some(session) if session.id() == id => Ok(session),
            _ => {
                debug!(session_id = %id, "discarding backend result for inactive session");
                Err(WorkflowError::SessionDiscarded)
            }
        }
    }
}

/// Releases the in-flight marker when the awaiting call finishes or is dropped.
struct InFlightTicket<'a> {
    state: &'a Mutex<ControllerState>,
    session_id: SessionId,
}

impl Drop for InFlightTicket<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let owned = state
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.session_id == self.session_id);
        if owned {
            state.in_flight = None;
        }
    }
}

struct PendingCall {
    session_id: SessionId,
    username: String,
    payload: ProfilePayload,
    from: usize,
    revision: u64,
}

/// Drives one registration through its steps. The only writer of the session it owns.
pub struct RegistrationController<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    validator: FormValidator,
    state: Mutex<ControllerState>,
}

impl<G> RegistrationController<G>
where
    G: ProfileGateway,
{
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>, policy: RegistrationPolicy) -> Self {
        Self::with_blueprint(
            gateway,
            clock,
            Arc::new(RegistrationBlueprint::standard()),
            policy,
        )
    }

    pub fn with_blueprint(
        gateway: Arc<G>,
        clock: Arc<dyn Clock>,
        blueprint: Arc<RegistrationBlueprint>,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            gateway,
            clock,
            validator: FormValidator::new(blueprint, policy),
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn blueprint(&self) -> &RegistrationBlueprint {
        self.validator.blueprint()
    }

    /// Open a fresh session after Phase 1, replacing any active one.
    ///
    /// A session without identity can be edited but refuses every step transition.
    pub fn start(&self, identity: Option<Phase1Identity>) -> SessionView {
        let session = RegistrationSession::new(identity);
        info!(session_id = %session.id(), "registration session started");
        let view = session.view(self.blueprint(), false);
        self.lock_state().replace(session);
        view
    }

    /// Open a session seeded from the backend's current profile.
    pub async fn resume(&self, identity: Phase1Identity) -> Result<SessionView, WorkflowError> {
        if !identity.is_usable() {
            return Err(WorkflowError::MissingIdentity);
        }
        if self.lock_state().in_flight.is_some() {
            return Err(WorkflowError::Busy);
        }

        let snapshot = self.gateway.current_profile(&identity.username).await?;
        if snapshot.completed {
            return Err(WorkflowError::AlreadyCompleted);
        }

        let session =
            RegistrationSession::seeded(identity, &snapshot, &self.validator, self.clock.today());
        info!(
            session_id = %session.id(),
            step_index = session.step_index(),
            "registration session resumed from profile snapshot"
        );
        let view = session.view(self.blueprint(), false);
        self.lock_state().replace(session);
        Ok(view)
    }

    pub fn view(&self) -> Option<SessionView> {
        let today = self.clock.today();
        let mut state = self.lock_state();
        let busy = state.is_busy();
        state.session.as_mut().map(|session| {
            session.refresh_derived_age(today);
            session.view(self.blueprint(), busy)
        })
    }

    /// `InProgress` while a session is live, `Submitted` once final submission succeeded.
    pub fn status(&self) -> Option<SessionStatus> {
        let state = self.lock_state();
        match (&state.session, &state.submitted) {
            (Some(_), _) => Some(SessionStatus::InProgress),
            (None, Some(_)) => Some(SessionStatus::Submitted),
            (None, None) => None,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.lock_state()
            .session
            .as_ref()
            .map(|session| session.id().clone())
    }

    /// Read-only access to the active session.
    pub fn inspect<R>(&self, read: impl FnOnce(&RegistrationSession) -> R) -> Option<R> {
        self.lock_state().session.as_ref().map(read)
    }

    /// Single mutation entry point for the presentation layer.
    pub async fn dispatch(&self, command: Command) -> Result<Transition, WorkflowError> {
        debug!(command = command.label(), "dispatching registration command");
        match command {
            Command::FieldChange { field, value } => self.change_field(field, value),
            Command::FieldBlur { field } => self.blur_field(field),
            Command::ValidateAll => self.validate_all(),
            Command::Next => self.leave_step(false).await,
            Command::Back => self.back(),
            Command::SubmitStep => self.leave_step(true).await,
            Command::FinalSubmit => self.final_submit().await,
            Command::Abandon { confirmed } => self.abandon(confirmed),
        }
    }

    fn change_field(&self, field: FieldName, value: FieldValue) -> Result<Transition, WorkflowError> {
        if self.blueprint().field_spec(field).is_none() {
            return Err(WorkflowError::UnknownField(field));
        }
        if value.kind() != field.kind() {
            return Err(WorkflowError::KindMismatch {
                field,
                expected: field.kind().label(),
                found: value.kind().label(),
            });
        }

        let today = self.clock.today();
        let mut state = self.lock_state();
        let session = state.active_mut()?;
        session.set_value(field, value, &self.validator, today);
        Ok(Transition::FieldUpdated {
            field,
            error: session.visible_error(field).map(str::to_string),
            derived_age: session.derived_age(),
        })
    }

    fn blur_field(&self, field: FieldName) -> Result<Transition, WorkflowError> {
        if self.blueprint().field_spec(field).is_none() {
            return Err(WorkflowError::UnknownField(field));
        }
        let today = self.clock.today();
        let mut state = self.lock_state();
        let session = state.active_mut()?;
        session.touch(field, &self.validator, today);
        Ok(Transition::FieldTouched {
            field,
            error: session.visible_error(field).map(str::to_string),
        })
    }

    fn validate_all(&self) -> Result<Transition, WorkflowError> {
        let today = self.clock.today();
        let mut state = self.lock_state();
        let session = state.active_mut()?;
        let report = session.validate_all(&self.validator, today);
        Ok(Transition::Validated { report })
    }

    fn back(&self) -> Result<Transition, WorkflowError> {
        let mut state = self.lock_state();
        let session = state.active_mut()?;
        let from = session.step_index();
        let to = session.retreat();
        Ok(Transition::Retreated { from, to })
    }

    fn abandon(&self, confirmed: bool) -> Result<Transition, WorkflowError> {
        let mut state = self.lock_state();
        let session = state.active_mut()?;
        if session.has_unsaved_changes() && !confirmed {
            return Err(WorkflowError::UnsavedChanges);
        }
        let session_id = session.id().clone();
        state.session = None;
        info!(%session_id, "registration session abandoned");
        Ok(Transition::Abandoned { session_id })
    }

    /// `Next` and `SubmitStep`: gate on the current step, then save or advance locally.
    async fn leave_step(&self, always_persist: bool) -> Result<Transition, WorkflowError> {
        let today = self.clock.today();
        let blueprint = self.validator.blueprint();

        let pending = {
            let mut state = self.lock_state();
            let session = state.ready_for_transition()?;
            let from = session.step_index();
            let step = blueprint
                .step(from)
                .ok_or(WorkflowError::StepBlocked(StepGuardError::LastStep))?;
            if step.persistence == StepPersistence::CompleteProfile {
                return Err(WorkflowError::AtFinalStep);
            }

            let report = session.validate_step(from, &self.validator, today);
            if !report.is_empty() {
                info!(
                    session_id = %session.id(),
                    step = ?step.key,
                    failures = report.len(),
                    "step transition blocked by validation"
                );
                return Err(WorkflowError::Validation(report));
            }

            if !always_persist && step.persistence == StepPersistence::LocalOnly {
                let to = session.advance(blueprint)?;
                info!(session_id = %session.id(), from, to, "registration step advanced");
                return Ok(Transition::Advanced { from, to });
            }

            let pending = PendingCall {
                session_id: session.id().clone(),
                username: identity_username(session)?,
                payload: step_payload(session, step)?,
                from,
                revision: session.revision(),
            };
            state.in_flight = Some(InFlight {
                session_id: pending.session_id.clone(),
                command: if always_persist { "submit_step" } else { "next" },
            });
            pending
        };
        let _ticket = InFlightTicket {
            state: &self.state,
            session_id: pending.session_id.clone(),
        };

        let result = self
            .gateway
            .update_profile(&pending.username, &pending.payload)
            .await;

        let mut state = self.lock_state();
        let session = state.still_active(&pending.session_id)?;
        if let Err(error) = result {
            warn!(
                session_id = %pending.session_id,
                step_index = pending.from,
                %error,
                "profile update failed"
            );
            return Err(error.into());
        }

        session.mark_saved(pending.revision);
        if session.step_index() != pending.from {
            return Ok(Transition::Saved {
                step_index: pending.from,
            });
        }
        let to = session.advance(blueprint)?;
        info!(
            session_id = %pending.session_id,
            from = pending.from,
            to,
            "registration step saved and advanced"
        );
        Ok(Transition::Advanced {
            from: pending.from,
            to,
        })
    }

    /// `FinalSubmit`: re-validate every step, enforce the age gate, merge, complete.
    async fn final_submit(&self) -> Result<Transition, WorkflowError> {
        let today = self.clock.today();
        let blueprint = self.validator.blueprint();
        let policy = self.validator.policy();

        let pending = {
            let mut state = self.lock_state();
            let session = state.ready_for_transition()?;
            if session.step_index() != blueprint.last_index() {
                return Err(WorkflowError::NotAtFinalStep);
            }

            let report = session.validate_all(&self.validator, today);
            let age = session.derived_age();
            let age_known_and_ineligible = age.is_some() && !policy.is_eligible(age);
            if age_known_and_ineligible || (report.is_empty() && age.is_none()) {
                info!(session_id = %session.id(), ?age, "final submission refused by age gate");
                return Err(WorkflowError::AgeIneligible {
                    age,
                    minimum: policy.minimum_age(),
                    message: policy.ineligible_message(),
                });
            }
            if !report.is_empty() {
                return Err(WorkflowError::Validation(report));
            }

            let pending = PendingCall {
                session_id: session.id().clone(),
                username: identity_username(session)?,
                payload: completion_payload(session, blueprint)?,
                from: session.step_index(),
                revision: session.revision(),
            };
            state.in_flight = Some(InFlight {
                session_id: pending.session_id.clone(),
                command: "final_submit",
            });
            pending
        };
        let _ticket = InFlightTicket {
            state: &self.state,
            session_id: pending.session_id.clone(),
        };

        let result = self
            .gateway
            .complete_profile(&pending.username, &pending.payload, true)
            .await;

        let mut state = self.lock_state();
        let session = state.still_active(&pending.session_id)?;
        if let Err(error) = result {
            warn!(session_id = %pending.session_id, %error, "profile completion failed");
            return Err(error.into());
        }

        state.session = None;
        state.submitted = Some(pending.session_id.clone());
        info!(session_id = %pending.session_id, "registration submitted");
        Ok(Transition::Submitted {
            session_id: pending.session_id,
            payload: pending.payload,
        })
    }

    /// Name of the transition currently awaiting the backend, if any.
    pub fn in_flight(&self) -> Option<&'static str> {
        self.lock_state().in_flight.as_ref().map(|flight| flight.command)
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn identity_username(session: &RegistrationSession) -> Result<String, WorkflowError> {
    session
        .identity()
        .filter(|identity| identity.is_usable())
        .map(|identity| identity.username.clone())
        .ok_or(WorkflowError::MissingIdentity)
}
