use std::sync::OnceLock;

use regex::Regex;

use super::super::dates::{derive_age, parse_birth_date};
use super::super::domain::{FieldName, FieldValue};
use super::ValidationContext;

/// Declarative rule attached to a field in the step blueprint.
///
/// Rules other than `Required` are skipped while the value is empty so optional
/// fields stay valid until the member starts filling them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    Required { message: &'static str },
    BirthDate,
    MinimumAge,
    MinSelections { min: usize, message: &'static str },
    MaxSelections { max: usize },
    MinLength { min: usize },
    MaxLength { max: usize },
    OneOf { options: &'static [&'static str] },
    Email,
    IdNumber,
}

impl FieldRule {
    /// Fields whose values this rule reads besides the one it is attached to.
    pub fn reads(&self, field: FieldName) -> bool {
        matches!(self, FieldRule::MinimumAge | FieldRule::BirthDate) && field == FieldName::Birthday
    }

    pub fn check(&self, value: &FieldValue, ctx: &ValidationContext<'_>) -> Option<String> {
        if let FieldRule::Required { message } = self {
            return value.is_empty().then(|| message.to_string());
        }
        if value.is_empty() {
            return None;
        }

        match self {
            FieldRule::Required { .. } => None,
            FieldRule::BirthDate => birth_date(value, ctx),
            FieldRule::MinimumAge => minimum_age(ctx),
            FieldRule::MinSelections { min, message } => {
                (value.len() < *min).then(|| message.to_string())
            }
            FieldRule::MaxSelections { max } => {
                (value.len() > *max).then(|| format!("Choose at most {max}"))
            }
            FieldRule::MinLength { min } => text_len(value)
                .filter(|len| len < min)
                .map(|_| format!("Must be at least {min} characters")),
            FieldRule::MaxLength { max } => text_len(value)
                .filter(|len| len > max)
                .map(|_| format!("Must be {max} characters or fewer")),
            FieldRule::OneOf { options } => one_of(value, options),
            FieldRule::Email => pattern_mismatch(value, email_pattern(), "Enter a valid email address"),
            FieldRule::IdNumber => pattern_mismatch(
                value,
                id_number_pattern(),
                "ID number may only contain letters, digits, dashes, and spaces",
            ),
        }
    }
}

fn birth_date(value: &FieldValue, ctx: &ValidationContext<'_>) -> Option<String> {
    let raw = value.as_text()?;
    parse_birth_date(raw, ctx.today()).err().map(|err| err.to_string())
}

// Reads the current birthday value, never the session's cached age.
fn minimum_age(ctx: &ValidationContext<'_>) -> Option<String> {
    let raw = ctx.value(FieldName::Birthday).and_then(FieldValue::as_text)?;
    match derive_age(raw, ctx.today()) {
        Some(age) if !ctx.policy().is_eligible(Some(age)) => {
            Some(ctx.policy().ineligible_message())
        }
        _ => None,
    }
}

fn text_len(value: &FieldValue) -> Option<usize> {
    value.as_text().map(|text| text.trim().chars().count())
}

fn one_of(value: &FieldValue, options: &[&str]) -> Option<String> {
    let selected = value.as_text()?.trim();
    if options.iter().any(|option| option.eq_ignore_ascii_case(selected)) {
        None
    } else {
        Some("Choose one of the listed options".to_string())
    }
}

fn pattern_mismatch(value: &FieldValue, pattern: &Regex, message: &str) -> Option<String> {
    let text = value.as_text()?.trim();
    (!pattern.is_match(text)).then(|| message.to_string())
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[A-Za-z]{2,}$").expect("email pattern compiles")
    })
}

fn id_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\- ]*$").expect("id number pattern compiles")
    })
}
