use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use super::blueprint::RegistrationBlueprint;
use super::controller::{Command, RegistrationController, Transition, WorkflowError};
use super::dates::Clock;
use super::domain::{Phase1Identity, SessionId};
use super::gateway::ProfileGateway;
use super::session::SessionView;
use super::validation::RegistrationPolicy;

/// Live registrations keyed by session id, one controller per member.
pub struct SessionRegistry<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    blueprint: Arc<RegistrationBlueprint>,
    policy: RegistrationPolicy,
    live: Mutex<LiveSessions<G>>,
}

/// A member has at most one live session; a newer one replaces the older.
struct LiveSessions<G> {
    controllers: HashMap<SessionId, Arc<RegistrationController<G>>>,
    by_username: HashMap<String, SessionId>,
    resuming: HashSet<String>,
}

impl<G> Default for LiveSessions<G> {
    fn default() -> Self {
        Self {
            controllers: HashMap::new(),
            by_username: HashMap::new(),
            resuming: HashSet::new(),
        }
    }
}

impl<G> LiveSessions<G> {
    fn insert(&mut self, view: &SessionView, controller: Arc<RegistrationController<G>>) {
        if let Some(username) = &view.username {
            let previous = self
                .by_username
                .insert(username.clone(), view.session_id.clone());
            if let Some(previous) = previous.filter(|previous| previous != &view.session_id) {
                self.controllers.remove(&previous);
                info!(session_id = %previous, %username, "registration session replaced");
            }
        }
        self.controllers.insert(view.session_id.clone(), controller);
    }

    fn remove(&mut self, id: &SessionId) {
        self.controllers.remove(id);
        self.by_username.retain(|_, session_id| session_id != id);
    }
}

/// Clears the per-member resume marker even if the resuming future is dropped.
struct ResumeGuard<'a, G> {
    live: &'a Mutex<LiveSessions<G>>,
    username: String,
}

impl<G> Drop for ResumeGuard<'_, G> {
    fn drop(&mut self) {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resuming
            .remove(&self.username);
    }
}

impl<G> SessionRegistry<G>
where
    G: ProfileGateway + 'static,
{
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>, policy: RegistrationPolicy) -> Self {
        Self {
            gateway,
            clock,
            blueprint: Arc::new(RegistrationBlueprint::standard()),
            policy,
            live: Mutex::new(LiveSessions::default()),
        }
    }

    pub fn policy(&self) -> &RegistrationPolicy {
        &self.policy
    }

    pub fn start(&self, identity: Option<Phase1Identity>) -> SessionView {
        let controller = self.controller();
        let view = controller.start(identity);
        self.lock().insert(&view, controller);
        view
    }

    /// Seed a session from the member's stored profile. A second resume for the same
    /// member while the first is still loading is refused with `Busy`.
    pub async fn resume(&self, identity: Phase1Identity) -> Result<SessionView, WorkflowError> {
        if !identity.is_usable() {
            return Err(WorkflowError::MissingIdentity);
        }
        let username = identity.username.clone();
        if !self.lock().resuming.insert(username.clone()) {
            return Err(WorkflowError::Busy);
        }
        let _guard = ResumeGuard {
            live: &self.live,
            username,
        };

        let controller = self.controller();
        let view = controller.resume(identity).await?;
        self.lock().insert(&view, controller);
        Ok(view)
    }

    pub fn view(&self, id: &SessionId) -> Option<SessionView> {
        self.get(id)?.view()
    }

    /// Forward a command to the session's controller; finished sessions leave the registry.
    pub async fn dispatch(
        &self,
        id: &SessionId,
        command: Command,
    ) -> Result<Transition, WorkflowError> {
        let controller = self.get(id).ok_or(WorkflowError::NoActiveSession)?;
        let result = controller.dispatch(command).await;

        if controller.session_id().as_ref() != Some(id) {
            self.lock().remove(id);
            info!(session_id = %id, live = self.len(), "registration session released");
        }
        result
    }

    pub fn len(&self) -> usize {
        self.lock().controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().controllers.is_empty()
    }

    /// Live session of a member, if one is registered.
    pub fn session_for(&self, username: &str) -> Option<SessionId> {
        self.lock().by_username.get(username).cloned()
    }

    fn controller(&self) -> Arc<RegistrationController<G>> {
        Arc::new(RegistrationController::with_blueprint(
            self.gateway.clone(),
            self.clock.clone(),
            self.blueprint.clone(),
            self.policy.clone(),
        ))
    }

    fn get(&self, id: &SessionId) -> Option<Arc<RegistrationController<G>>> {
        self.lock().controllers.get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, LiveSessions<G>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
