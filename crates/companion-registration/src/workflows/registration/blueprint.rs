use serde::Serialize;

use super::domain::{FieldName, FieldValue, StepKey};
use super::validation::{FieldRule, ValidationContext};

pub const CIVIL_STATUS_OPTIONS: &[&str] = &["Single", "Married", "Widowed", "Separated", "Divorced"];

pub const ID_TYPE_OPTIONS: &[&str] = &[
    "Passport",
    "Driver's License",
    "Senior Citizen ID",
    "National ID",
    "Postal ID",
    "Voter's ID",
    "SSS/UMID",
];

pub const LOOKING_FOR_OPTIONS: &[&str] = &["Companionship", "Friendship", "Romance", "Marriage"];

/// What must happen before the wizard may leave a step forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPersistence {
    /// Local validation only.
    LocalOnly,
    /// Owned fields are saved through `update_profile` before advancing.
    SaveProgress,
    /// Final step: the merged profile is sent through `complete_profile`.
    CompleteProfile,
}

/// A field owned by a step, with the rules gating it.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field: FieldName,
    pub required: bool,
    pub rules: Vec<FieldRule>,
}

impl FieldSpec {
    fn required(field: FieldName, message: &'static str, rules: Vec<FieldRule>) -> Self {
        let mut all = vec![FieldRule::Required { message }];
        all.extend(rules);
        Self {
            field,
            required: true,
            rules: all,
        }
    }

    fn optional(field: FieldName, rules: Vec<FieldRule>) -> Self {
        Self {
            field,
            required: false,
            rules,
        }
    }

    /// First failing rule's message; rules run in declaration order.
    pub fn validate(&self, value: &FieldValue, ctx: &ValidationContext<'_>) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.check(value, ctx))
    }
}

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub key: StepKey,
    pub persistence: StepPersistence,
    pub fields: Vec<FieldSpec>,
}

impl StepDefinition {
    pub fn title(&self) -> &'static str {
        self.key.label()
    }

    pub fn owned_fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.fields.iter().map(|spec| spec.field)
    }

    pub fn owns(&self, field: FieldName) -> bool {
        self.fields.iter().any(|spec| spec.field == field)
    }
}

/// Ordered list of wizard steps.
#[derive(Debug)]
pub struct RegistrationBlueprint {
    steps: Vec<StepDefinition>,
}

impl RegistrationBlueprint {
    pub fn standard() -> Self {
        Self {
            steps: standard_steps(),
        }
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn index_of(&self, key: StepKey) -> Option<usize> {
        self.steps.iter().position(|step| step.key == key)
    }

    pub fn owning_step(&self, field: FieldName) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.owns(field))
    }

    pub fn field_spec(&self, field: FieldName) -> Option<&FieldSpec> {
        self.field_specs().find(|spec| spec.field == field)
    }

    pub fn field_specs(&self) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.steps.iter().flat_map(|step| step.fields.iter())
    }

    pub fn all_fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.field_specs().map(|spec| spec.field)
    }

    pub fn is_required(&self, field: FieldName) -> bool {
        self.field_spec(field).is_some_and(|spec| spec.required)
    }
}

fn standard_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            key: StepKey::BasicInfo,
            persistence: StepPersistence::SaveProgress,
            fields: vec![
                FieldSpec::required(
                    FieldName::FirstName,
                    "First name is required",
                    vec![FieldRule::MaxLength { max: 50 }],
                ),
                FieldSpec::required(
                    FieldName::LastName,
                    "Last name is required",
                    vec![FieldRule::MaxLength { max: 50 }],
                ),
                FieldSpec::required(
                    FieldName::Birthday,
                    "Birthday is required",
                    vec![FieldRule::BirthDate, FieldRule::MinimumAge],
                ),
                FieldSpec::required(FieldName::Country, "Country is required", Vec::new()),
                FieldSpec::required(
                    FieldName::CivilStatus,
                    "Civil status is required",
                    vec![FieldRule::OneOf {
                        options: CIVIL_STATUS_OPTIONS,
                    }],
                ),
                FieldSpec::required(
                    FieldName::City,
                    "City is required",
                    vec![FieldRule::MaxLength { max: 80 }],
                ),
                FieldSpec::required(
                    FieldName::Hobby,
                    "Pick at least one hobby",
                    vec![FieldRule::MinSelections {
                        min: 1,
                        message: "Pick at least one hobby",
                    }],
                ),
            ],
        },
        StepDefinition {
            key: StepKey::IdVerification,
            persistence: StepPersistence::SaveProgress,
            fields: vec![
                FieldSpec::required(
                    FieldName::IdType,
                    "Select the type of ID",
                    vec![FieldRule::OneOf {
                        options: ID_TYPE_OPTIONS,
                    }],
                ),
                FieldSpec::required(
                    FieldName::IdNumber,
                    "ID number is required",
                    vec![
                        FieldRule::MinLength { min: 4 },
                        FieldRule::MaxLength { max: 30 },
                        FieldRule::IdNumber,
                    ],
                ),
                FieldSpec::required(
                    FieldName::IdPhotos,
                    "Upload a photo of your ID",
                    vec![FieldRule::MaxSelections { max: 2 }],
                ),
            ],
        },
        StepDefinition {
            key: StepKey::DocumentUpload,
            persistence: StepPersistence::SaveProgress,
            fields: vec![
                FieldSpec::required(
                    FieldName::ProfilePhotos,
                    "Add at least one profile photo",
                    vec![FieldRule::MaxSelections { max: 6 }],
                ),
                FieldSpec::optional(
                    FieldName::SupportingDocuments,
                    vec![FieldRule::MaxSelections { max: 5 }],
                ),
            ],
        },
        StepDefinition {
            key: StepKey::AboutYou,
            persistence: StepPersistence::CompleteProfile,
            fields: vec![
                FieldSpec::required(
                    FieldName::AboutMe,
                    "Tell others a little about yourself",
                    vec![
                        FieldRule::MinLength { min: 20 },
                        FieldRule::MaxLength { max: 500 },
                    ],
                ),
                FieldSpec::required(
                    FieldName::Interests,
                    "Pick at least one interest",
                    vec![FieldRule::MinSelections {
                        min: 1,
                        message: "Pick at least one interest",
                    }],
                ),
                FieldSpec::required(
                    FieldName::LookingFor,
                    "Tell us what you are looking for",
                    vec![FieldRule::OneOf {
                        options: LOOKING_FOR_OPTIONS,
                    }],
                ),
                FieldSpec::optional(FieldName::ContactEmail, vec![FieldRule::Email]),
            ],
        },
    ]
}
