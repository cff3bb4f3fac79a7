//! Builds the flat payloads sent to the profile backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::blueprint::{RegistrationBlueprint, StepDefinition};
use super::dates::{display_to_backend, BirthDateError};
use super::domain::{FieldName, FieldValue, Phase1Identity};
use super::session::RegistrationSession;

pub const USERNAME_KEY: &str = "username";
pub const EMAIL_KEY: &str = "email";
pub const AGE_KEY: &str = "age";

/// A single payload entry in the backend's record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Text(String),
    Number(u32),
    List(Vec<String>),
}

impl PayloadValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Flat, key-ordered payload so repeated merges serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfilePayload(BTreeMap<String, PayloadValue>);

impl ProfilePayload {
    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PayloadValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn insert(&mut self, key: &str, value: PayloadValue) {
        self.0.insert(key.to_string(), value);
    }
}

/// Reasons a session cannot be merged into a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("registration has no account identity")]
    MissingIdentity,
    #[error("required field {0} is empty")]
    MissingRequired(FieldName),
    #[error("birthday cannot be converted: {0}")]
    InvalidBirthDate(#[from] BirthDateError),
}

/// Merge Phase 1 identity with every Phase 2 field into the "mark complete" payload.
///
/// Optional fields without a value are sent as empty strings. `username` and `email`
/// always come from the identity and are written last.
pub fn completion_payload(
    session: &RegistrationSession,
    blueprint: &RegistrationBlueprint,
) -> Result<ProfilePayload, MergeError> {
    let identity = session.identity().ok_or(MergeError::MissingIdentity)?;
    let mut payload = ProfilePayload::default();

    for spec in blueprint.field_specs() {
        let value = session.value(spec.field).filter(|value| !value.is_empty());
        match value {
            Some(value) => payload.insert(spec.field.wire_key(), convert(spec.field, value)?),
            None if spec.required => return Err(MergeError::MissingRequired(spec.field)),
            None => payload.insert(spec.field.wire_key(), PayloadValue::Text(String::new())),
        }
    }

    if let Some(age) = session.derived_age() {
        payload.insert(AGE_KEY, PayloadValue::Number(age));
    }

    apply_identity(&mut payload, identity);
    Ok(payload)
}

/// Payload for saving one step's owned fields through `update_profile`.
pub fn step_payload(
    session: &RegistrationSession,
    step: &StepDefinition,
) -> Result<ProfilePayload, MergeError> {
    let mut payload = ProfilePayload::default();
    for spec in &step.fields {
        let value = match session.value(spec.field).filter(|value| !value.is_empty()) {
            Some(value) => convert(spec.field, value)?,
            None => PayloadValue::Text(String::new()),
        };
        payload.insert(spec.field.wire_key(), value);
    }
    if step.owns(FieldName::Birthday) {
        if let Some(age) = session.derived_age() {
            payload.insert(AGE_KEY, PayloadValue::Number(age));
        }
    }
    Ok(payload)
}

fn apply_identity(payload: &mut ProfilePayload, identity: &Phase1Identity) {
    payload.insert(USERNAME_KEY, PayloadValue::Text(identity.username.clone()));
    payload.insert(EMAIL_KEY, PayloadValue::Text(identity.email.clone()));
}

fn convert(field: FieldName, value: &FieldValue) -> Result<PayloadValue, MergeError> {
    let converted = match value {
        FieldValue::Date(raw) => PayloadValue::Text(display_to_backend(raw)?),
        FieldValue::Text(text) => PayloadValue::Text(text.trim().to_string()),
        FieldValue::SingleSelect(choice) => {
            PayloadValue::Text(choice.as_deref().unwrap_or_default().trim().to_string())
        }
        FieldValue::MultiSelect(items) => PayloadValue::List(items.clone()),
        FieldValue::Photos(images) => {
            PayloadValue::List(images.iter().map(|image| image.0.clone()).collect())
        }
    };
    debug_assert_eq!(value.kind(), field.kind());
    Ok(converted)
}
