//! Two-phase senior member registration: Phase 1 account identity plus the Phase 2
//! profile-completion wizard (basic info, ID verification, document upload, about you).

pub mod blueprint;
pub mod controller;
pub mod dates;
pub mod domain;
pub mod gateway;
pub mod merge;
pub mod registry;
pub mod router;
pub mod session;
pub mod snapshot;
pub mod validation;

#[cfg(test)]
mod tests;

pub use blueprint::{FieldSpec, RegistrationBlueprint, StepDefinition, StepPersistence};
pub use controller::{Command, ErrorCategory, RegistrationController, Transition, WorkflowError};
pub use dates::{BirthDateError, Clock, FixedClock, SystemClock};
pub use domain::{
    FieldKind, FieldName, FieldValue, ImageRef, Phase1Identity, SessionId, SessionStatus, StepKey,
};
pub use gateway::{BackendFailureKind, GatewayError, ProfileGateway};
pub use merge::{completion_payload, step_payload, MergeError, PayloadValue, ProfilePayload};
pub use registry::SessionRegistry;
pub use router::registration_router;
pub use session::{RegistrationSession, SessionView, StepGuardError};
pub use snapshot::ProfileSnapshot;
pub use validation::{
    FieldFailure, FormValidator, RegistrationPolicy, ValidationReport, DEFAULT_MINIMUM_AGE,
};
