use async_trait::async_trait;
use chrono::NaiveDate;
use companion_registration::workflows::registration::{
    GatewayError, ProfileGateway, ProfilePayload, ProfileSnapshot, RegistrationPolicy,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) policy: RegistrationPolicy,
}

#[derive(Debug, Default, Clone)]
struct StoredProfile {
    completed: bool,
    fields: BTreeMap<String, Value>,
}

/// Profile backend kept in process memory, keyed by username.
#[derive(Default, Clone)]
pub(crate) struct InMemoryProfileGateway {
    profiles: Arc<Mutex<HashMap<String, StoredProfile>>>,
    reject_with: Option<String>,
}

impl InMemoryProfileGateway {
    /// Gateway that refuses every write with `message`, for demonstrating backend errors.
    pub(crate) fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject_with: Some(message.into()),
            ..Self::default()
        }
    }

    pub(crate) fn profile(&self, username: &str) -> Option<ProfileSnapshot> {
        let guard = self.profiles.lock().ok()?;
        guard.get(username).map(|stored| ProfileSnapshot {
            completed: stored.completed,
            fields: stored.fields.clone(),
        })
    }

    fn write(
        &self,
        username: &str,
        payload: &ProfilePayload,
        mark_complete: bool,
    ) -> Result<(), GatewayError> {
        if let Some(message) = &self.reject_with {
            return Err(GatewayError::rejected(message.clone()));
        }

        let Value::Object(entries) = serde_json::to_value(payload)
            .map_err(|err| GatewayError::transport(format!("payload encoding failed: {err}")))?
        else {
            return Err(GatewayError::transport("payload must be a JSON object"));
        };

        let mut guard = self
            .profiles
            .lock()
            .map_err(|_| GatewayError::transport("profile store unavailable"))?;
        let stored = guard.entry(username.to_string()).or_default();
        stored.fields.extend(entries);
        stored.completed |= mark_complete;
        debug!(username, fields = stored.fields.len(), mark_complete, "profile stored");
        Ok(())
    }
}

#[async_trait]
impl ProfileGateway for InMemoryProfileGateway {
    async fn update_profile(
        &self,
        username: &str,
        partial: &ProfilePayload,
    ) -> Result<(), GatewayError> {
        self.write(username, partial, false)
    }

    async fn complete_profile(
        &self,
        username: &str,
        payload: &ProfilePayload,
        mark_complete: bool,
    ) -> Result<(), GatewayError> {
        self.write(username, payload, mark_complete)
    }

    async fn current_profile(&self, username: &str) -> Result<ProfileSnapshot, GatewayError> {
        Ok(self.profile(username).unwrap_or_default())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
