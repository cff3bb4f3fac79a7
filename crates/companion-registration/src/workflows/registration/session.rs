use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use serde::Serialize;

use super::blueprint::RegistrationBlueprint;
use super::dates::derive_age;
use super::domain::{FieldName, FieldValue, Phase1Identity, SessionId, StepKey};
use super::snapshot::ProfileSnapshot;
use super::validation::{FormValidator, ValidationReport};

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("reg-{id:06}"))
}

/// Reasons the session refuses to move to the next step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepGuardError {
    #[error("step has unresolved field errors: {0:?}")]
    UnresolvedErrors(Vec<FieldName>),
    #[error("already at the last step")]
    LastStep,
}

/// In-memory state of one in-progress registration.
///
/// Mutators are crate-private: the workflow controller is the only writer.
#[derive(Debug, Clone)]
pub struct RegistrationSession {
    id: SessionId,
    identity: Option<Phase1Identity>,
    values: BTreeMap<FieldName, FieldValue>,
    touched: BTreeSet<FieldName>,
    errors: BTreeMap<FieldName, String>,
    step_index: usize,
    derived_age: Option<u32>,
    dirty: bool,
    revision: u64,
}

impl RegistrationSession {
    pub fn new(identity: Option<Phase1Identity>) -> Self {
        Self {
            id: next_session_id(),
            identity,
            values: BTreeMap::new(),
            touched: BTreeSet::new(),
            errors: BTreeMap::new(),
            step_index: 0,
            derived_age: None,
            dirty: false,
            revision: 0,
        }
    }

    /// Seed a session from the backend's current profile.
    ///
    /// Errors are computed for every field but nothing is touched, so they stay hidden
    /// until the member interacts. The wizard resumes at the first step with a failing field.
    pub(crate) fn seeded(
        identity: Phase1Identity,
        snapshot: &ProfileSnapshot,
        validator: &FormValidator,
        today: NaiveDate,
    ) -> Self {
        let mut session = Self::new(Some(identity));
        session.values = snapshot.field_values();
        session.refresh_derived_age(today);

        let blueprint = validator.blueprint();
        let fields: Vec<FieldName> = blueprint.all_fields().collect();
        session.recompute_errors(fields, validator, today);

        session.step_index = blueprint
            .steps()
            .iter()
            .position(|step| step.owned_fields().any(|field| session.errors.contains_key(&field)))
            .unwrap_or_else(|| blueprint.last_index());
        session
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn identity(&self) -> Option<&Phase1Identity> {
        self.identity.as_ref()
    }

    pub fn value(&self, field: FieldName) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn values(&self) -> &BTreeMap<FieldName, FieldValue> {
        &self.values
    }

    pub fn is_touched(&self, field: FieldName) -> bool {
        self.touched.contains(&field)
    }

    /// Current error for a field, whether or not it is visible yet.
    pub fn error(&self, field: FieldName) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    /// Error shown to the member: only once the field has been touched.
    pub fn visible_error(&self, field: FieldName) -> Option<&str> {
        if self.is_touched(field) {
            self.error(field)
        } else {
            None
        }
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn derived_age(&self) -> Option<u32> {
        self.derived_age
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_value(
        &mut self,
        field: FieldName,
        value: FieldValue,
        validator: &FormValidator,
        today: NaiveDate,
    ) {
        self.values.insert(field, value.normalized());
        if field == FieldName::Birthday {
            self.refresh_derived_age(today);
        }
        self.recompute_errors(validator.dependents(field), validator, today);
        self.dirty = true;
        self.revision += 1;
    }

    pub(crate) fn touch(&mut self, field: FieldName, validator: &FormValidator, today: NaiveDate) {
        self.touched.insert(field);
        self.recompute_errors([field], validator, today);
    }

    /// Force-touch and validate every field owned by the step at `index`.
    pub(crate) fn validate_step(
        &mut self,
        index: usize,
        validator: &FormValidator,
        today: NaiveDate,
    ) -> ValidationReport {
        let fields: Vec<FieldName> = match validator.blueprint().step(index) {
            Some(step) => step.owned_fields().collect(),
            None => Vec::new(),
        };
        self.force_validate(fields, validator, today)
    }

    /// Force-touch and validate every field of every step.
    pub(crate) fn validate_all(
        &mut self,
        validator: &FormValidator,
        today: NaiveDate,
    ) -> ValidationReport {
        let fields: Vec<FieldName> = validator.blueprint().all_fields().collect();
        self.force_validate(fields, validator, today)
    }

    pub(crate) fn advance(
        &mut self,
        blueprint: &RegistrationBlueprint,
    ) -> Result<usize, StepGuardError> {
        let step = blueprint
            .step(self.step_index)
            .ok_or(StepGuardError::LastStep)?;
        let unresolved: Vec<FieldName> = step
            .owned_fields()
            .filter(|field| self.visible_error(*field).is_some())
            .collect();
        if !unresolved.is_empty() {
            return Err(StepGuardError::UnresolvedErrors(unresolved));
        }
        if self.step_index >= blueprint.last_index() {
            return Err(StepGuardError::LastStep);
        }
        self.step_index += 1;
        Ok(self.step_index)
    }

    /// Step back without validating or clearing errors of the step being left.
    pub(crate) fn retreat(&mut self) -> usize {
        self.step_index = self.step_index.saturating_sub(1);
        self.step_index
    }

    /// Counts value edits; a save only clears `dirty` if nothing changed while it was in flight.
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn mark_saved(&mut self, at_revision: u64) {
        if self.revision == at_revision {
            self.dirty = false;
        }
    }

    pub fn view(&self, blueprint: &RegistrationBlueprint, busy: bool) -> SessionView {
        let step = blueprint
            .step(self.step_index)
            .map(|step| step.key)
            .unwrap_or(StepKey::BasicInfo);
        let touched = blueprint
            .all_fields()
            .map(|field| (field, self.is_touched(field)))
            .collect();
        let errors = blueprint
            .all_fields()
            .map(|field| (field, self.visible_error(field).map(str::to_string)))
            .collect();

        SessionView {
            session_id: self.id.clone(),
            step,
            step_title: step.label(),
            step_index: self.step_index,
            step_count: blueprint.len(),
            values: self.values.clone(),
            touched,
            errors,
            derived_age: self.derived_age,
            username: self.identity.as_ref().map(|identity| identity.username.clone()),
            unsaved_changes: self.dirty,
            busy,
        }
    }

    fn force_validate(
        &mut self,
        fields: Vec<FieldName>,
        validator: &FormValidator,
        today: NaiveDate,
    ) -> ValidationReport {
        self.refresh_derived_age(today);
        self.touched.extend(fields.iter().copied());
        self.recompute_errors(fields.iter().copied(), validator, today);
        validator.validate_fields(fields, &self.values, today)
    }

    /// Age is a function of the birthday and the date, so a new day can change it.
    pub(crate) fn refresh_derived_age(&mut self, today: NaiveDate) {
        self.derived_age = self
            .values
            .get(&FieldName::Birthday)
            .and_then(FieldValue::as_text)
            .and_then(|raw| derive_age(raw, today));
    }

    fn recompute_errors<I>(&mut self, fields: I, validator: &FormValidator, today: NaiveDate)
    where
        I: IntoIterator<Item = FieldName>,
    {
        for field in fields {
            match validator.validate_field(field, &self.values, today) {
                Some(message) => {
                    self.errors.insert(field, message);
                }
                None => {
                    self.errors.remove(&field);
                }
            }
        }
    }
}

/// Serializable snapshot of the session for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub step: StepKey,
    pub step_title: &'static str,
    pub step_index: usize,
    pub step_count: usize,
    pub values: BTreeMap<FieldName, FieldValue>,
    pub touched: BTreeMap<FieldName, bool>,
    pub errors: BTreeMap<FieldName, Option<String>>,
    pub derived_age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub unsaved_changes: bool,
    pub busy: bool,
}
