use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dates::backend_to_display;
use super::domain::{FieldKind, FieldName, FieldValue, ImageRef};

/// Profile state reported by the backend for a member resuming registration.
///
/// Field keys use the backend's wire names. Keys that do not map to a wizard field
/// (including `username` and `email`) are ignored when seeding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl ProfileSnapshot {
    pub fn field_values(&self) -> BTreeMap<FieldName, FieldValue> {
        self.fields
            .iter()
            .filter_map(|(key, raw)| {
                let field = FieldName::from_wire_key(key)?;
                let value = value_for(field.kind(), raw)?;
                Some((field, value))
            })
            .collect()
    }
}

fn value_for(kind: FieldKind, raw: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => scalar(raw).map(FieldValue::Text),
        FieldKind::Date => scalar(raw).map(|text| {
            // Backend dates arrive zero-padded; anything else is kept verbatim for the validator.
            let display = backend_to_display(&text).unwrap_or(text);
            FieldValue::Date(display)
        }),
        FieldKind::SingleSelect => Some(FieldValue::SingleSelect(
            scalar(raw).filter(|text| !text.trim().is_empty()),
        )),
        FieldKind::MultiSelect => list(raw).map(FieldValue::MultiSelect),
        FieldKind::PhotoList => photos(raw).map(FieldValue::Photos),
    }
}

fn scalar(raw: &Value) -> Option<String> {
    match raw {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn list(raw: &Value) -> Option<Vec<String>> {
    match raw {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Value::String(joined) => Some(
            joined
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    }
}

fn photos(raw: &Value) -> Option<Vec<ImageRef>> {
    let Value::Array(items) = raw else {
        return None;
    };
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(uri) => Some(uri.clone()),
                Value::Object(map) => map
                    .get("uri")
                    .or_else(|| map.get("url"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .map(ImageRef)
            .collect(),
    )
}
