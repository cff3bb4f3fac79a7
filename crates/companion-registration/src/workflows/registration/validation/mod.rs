mod policy;
mod rules;

pub use policy::{RegistrationPolicy, DEFAULT_MINIMUM_AGE};
pub use rules::FieldRule;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use super::blueprint::RegistrationBlueprint;
use super::domain::{FieldName, FieldValue, StepKey};

/// Read-only view handed to every rule: current values, "today", and the policy.
pub struct ValidationContext<'a> {
    values: &'a BTreeMap<FieldName, FieldValue>,
    today: NaiveDate,
    policy: &'a RegistrationPolicy,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        values: &'a BTreeMap<FieldName, FieldValue>,
        today: NaiveDate,
        policy: &'a RegistrationPolicy,
    ) -> Self {
        Self {
            values,
            today,
            policy,
        }
    }

    pub fn value(&self, field: FieldName) -> Option<&'a FieldValue> {
        self.values.get(&field)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn policy(&self) -> &'a RegistrationPolicy {
        self.policy
    }
}

/// A single failing field surfaced when a transition is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFailure {
    pub field: FieldName,
    pub step: StepKey,
    pub message: String,
}

/// Every failing field found by a validation pass, in blueprint order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub failures: Vec<FieldFailure>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failure_for(&self, field: FieldName) -> Option<&FieldFailure> {
        self.failures.iter().find(|failure| failure.field == field)
    }

    pub fn fields(&self) -> Vec<FieldName> {
        self.failures.iter().map(|failure| failure.field).collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.field.label(), failure.message))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&summary)
    }
}

/// Applies the blueprint's field rules under a registration policy.
#[derive(Debug, Clone)]
pub struct FormValidator {
    blueprint: Arc<RegistrationBlueprint>,
    policy: RegistrationPolicy,
}

impl FormValidator {
    pub fn new(blueprint: Arc<RegistrationBlueprint>, policy: RegistrationPolicy) -> Self {
        Self { blueprint, policy }
    }

    pub fn blueprint(&self) -> &RegistrationBlueprint {
        &self.blueprint
    }

    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    /// Error message for one field given the current values, if any.
    pub fn validate_field(
        &self,
        field: FieldName,
        values: &BTreeMap<FieldName, FieldValue>,
        today: NaiveDate,
    ) -> Option<String> {
        let spec = self.blueprint.field_spec(field)?;
        let ctx = ValidationContext::new(values, today, &self.policy);
        let placeholder;
        let value = match values.get(&field) {
            Some(value) => value,
            None => {
                placeholder = FieldValue::empty_for(field.kind());
                &placeholder
            }
        };
        spec.validate(value, &ctx)
    }

    /// Validate the given fields and collect every failure.
    pub fn validate_fields<I>(
        &self,
        fields: I,
        values: &BTreeMap<FieldName, FieldValue>,
        today: NaiveDate,
    ) -> ValidationReport
    where
        I: IntoIterator<Item = FieldName>,
    {
        let failures = fields
            .into_iter()
            .filter_map(|field| {
                let message = self.validate_field(field, values, today)?;
                let step = self.blueprint.owning_step(field)?.key;
                Some(FieldFailure {
                    field,
                    step,
                    message,
                })
            })
            .collect();
        ValidationReport { failures }
    }

    /// Fields whose error must be recomputed when `changed` is edited.
    pub fn dependents(&self, changed: FieldName) -> Vec<FieldName> {
        self.blueprint
            .field_specs()
            .filter(|spec| spec.field == changed || spec.rules.iter().any(|rule| rule.reads(changed)))
            .map(|spec| spec.field)
            .collect()
    }
}
