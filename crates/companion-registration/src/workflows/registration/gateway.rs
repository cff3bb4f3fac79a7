use async_trait::async_trait;

use super::merge::ProfilePayload;
use super::snapshot::ProfileSnapshot;

/// Profile backend consumed by the workflow controller.
///
/// Implementations wrap the REST clients; the controller only sees typed outcomes.
#[async_trait]
pub trait ProfileGateway: Send + Sync {
    /// Persist partial progress for the member's profile.
    async fn update_profile(
        &self,
        username: &str,
        partial: &ProfilePayload,
    ) -> Result<(), GatewayError>;

    /// Send the merged profile and flag it complete.
    async fn complete_profile(
        &self,
        username: &str,
        payload: &ProfilePayload,
        mark_complete: bool,
    ) -> Result<(), GatewayError>;

    /// Current profile state, used to seed a resumed registration.
    async fn current_profile(&self, username: &str) -> Result<ProfileSnapshot, GatewayError>;
}

/// Failure reported by a backend call. The message is shown to the member verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The call reached the backend and it refused (stale credentials, duplicate session).
    #[error("{message}")]
    Rejected { message: String },
    /// The backend could not be reached.
    #[error("{message}")]
    Transport { message: String },
}

impl GatewayError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message } | Self::Transport { message } => message,
        }
    }

    pub fn kind(&self) -> BackendFailureKind {
        match self {
            Self::Rejected { .. } => BackendFailureKind::Rejected,
            Self::Transport { .. } => BackendFailureKind::Transport,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFailureKind {
    Rejected,
    Transport,
}
