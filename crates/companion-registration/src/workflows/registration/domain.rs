use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for in-progress registration sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials produced by account creation. Read-only for every Phase 2 step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase1Identity {
    pub username: String,
    pub email: String,
}

impl Phase1Identity {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }

    /// An identity with a blank username cannot address the profile backend.
    pub fn is_usable(&self) -> bool {
        !self.username.trim().is_empty()
    }
}

/// Reference to an uploaded or locally picked image (URI or storage key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Shape of a form field, used to reject values of the wrong kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Date,
    SingleSelect,
    MultiSelect,
    PhotoList,
}

impl FieldKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Date => "date",
            Self::SingleSelect => "single select",
            Self::MultiSelect => "multi select",
            Self::PhotoList => "photo list",
        }
    }
}

/// Every field the registration wizard collects across its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    FirstName,
    LastName,
    Birthday,
    Country,
    CivilStatus,
    City,
    Hobby,
    IdType,
    IdNumber,
    IdPhotos,
    ProfilePhotos,
    SupportingDocuments,
    AboutMe,
    Interests,
    LookingFor,
    ContactEmail,
}

impl FieldName {
    pub const ALL: [Self; 16] = [
        Self::FirstName,
        Self::LastName,
        Self::Birthday,
        Self::Country,
        Self::CivilStatus,
        Self::City,
        Self::Hobby,
        Self::IdType,
        Self::IdNumber,
        Self::IdPhotos,
        Self::ProfilePhotos,
        Self::SupportingDocuments,
        Self::AboutMe,
        Self::Interests,
        Self::LookingFor,
        Self::ContactEmail,
    ];

    pub const fn kind(self) -> FieldKind {
        match self {
            Self::FirstName | Self::LastName | Self::City | Self::IdNumber | Self::AboutMe => {
                FieldKind::Text
            }
            Self::ContactEmail => FieldKind::Text,
            Self::Birthday => FieldKind::Date,
            Self::Country | Self::CivilStatus | Self::IdType | Self::LookingFor => {
                FieldKind::SingleSelect
            }
            Self::Hobby | Self::Interests => FieldKind::MultiSelect,
            Self::IdPhotos | Self::ProfilePhotos | Self::SupportingDocuments => {
                FieldKind::PhotoList
            }
        }
    }

    /// Key used by the profile backend for this field.
    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::Birthday => "birthday",
            Self::Country => "country",
            Self::CivilStatus => "civilStatus",
            Self::City => "city",
            Self::Hobby => "hobby",
            Self::IdType => "idType",
            Self::IdNumber => "idNumber",
            Self::IdPhotos => "idPhotos",
            Self::ProfilePhotos => "profilePhotos",
            Self::SupportingDocuments => "supportingDocuments",
            Self::AboutMe => "aboutMe",
            Self::Interests => "interests",
            Self::LookingFor => "lookingFor",
            Self::ContactEmail => "contactEmail",
        }
    }

    pub fn from_wire_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.wire_key() == key)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstName => "First name",
            Self::LastName => "Last name",
            Self::Birthday => "Birthday",
            Self::Country => "Country",
            Self::CivilStatus => "Civil status",
            Self::City => "City",
            Self::Hobby => "Hobby",
            Self::IdType => "ID type",
            Self::IdNumber => "ID number",
            Self::IdPhotos => "ID photos",
            Self::ProfilePhotos => "Profile photos",
            Self::SupportingDocuments => "Supporting documents",
            Self::AboutMe => "About me",
            Self::Interests => "Interests",
            Self::LookingFor => "Looking for",
            Self::ContactEmail => "Contact email",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_key())
    }
}

/// Current value of a form field, tagged by shape.
///
/// Dates are kept in the display format the member typed (`M/D/YYYY`) and only
/// converted to the backend format during merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(String),
    SingleSelect(Option<String>),
    MultiSelect(Vec<String>),
    Photos(Vec<ImageRef>),
}

impl FieldValue {
    /// Placeholder value for a field nobody has filled in yet.
    pub fn empty_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => Self::Text(String::new()),
            FieldKind::Date => Self::Date(String::new()),
            FieldKind::SingleSelect => Self::SingleSelect(None),
            FieldKind::MultiSelect => Self::MultiSelect(Vec::new()),
            FieldKind::PhotoList => Self::Photos(Vec::new()),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text(_) => FieldKind::Text,
            Self::Date(_) => FieldKind::Date,
            Self::SingleSelect(_) => FieldKind::SingleSelect,
            Self::MultiSelect(_) => FieldKind::MultiSelect,
            Self::Photos(_) => FieldKind::PhotoList,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-blank entries for list-shaped values; scalar values count as one when filled.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) | Self::Date(text) => usize::from(!text.trim().is_empty()),
            Self::SingleSelect(choice) => {
                usize::from(choice.as_deref().is_some_and(|value| !value.trim().is_empty()))
            }
            Self::MultiSelect(items) => items.iter().filter(|item| !item.trim().is_empty()).count(),
            Self::Photos(images) => images.iter().filter(|image| !image.is_blank()).count(),
        }
    }

    /// Drops blank list entries and trims selections, so placeholders never reach a payload.
    pub fn normalized(self) -> Self {
        match self {
            Self::MultiSelect(items) => Self::MultiSelect(
                items
                    .into_iter()
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect(),
            ),
            Self::Photos(images) => {
                Self::Photos(images.into_iter().filter(|image| !image.is_blank()).collect())
            }
            Self::SingleSelect(choice) => Self::SingleSelect(
                choice
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty()),
            ),
            other => other,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Date(text) => Some(text.as_str()),
            Self::SingleSelect(choice) => choice.as_deref(),
            _ => None,
        }
    }
}

/// Key of each wizard step, in presentation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKey {
    BasicInfo,
    IdVerification,
    DocumentUpload,
    AboutYou,
}

impl StepKey {
    pub const fn label(self) -> &'static str {
        match self {
            Self::BasicInfo => "Basic Info",
            Self::IdVerification => "ID Verification",
            Self::DocumentUpload => "Document Upload",
            Self::AboutYou => "About You",
        }
    }
}

/// Lifecycle of a session: editing steps, or the terminal submitted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Submitted,
}
