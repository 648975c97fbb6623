//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user conversation sessions.

use crate::config::Config;
use classroom_agent_core::cache::ContextCache;
use classroom_agent_core::domain::{Readiness, Session};
use classroom_agent_core::health::HealthMonitor;
use classroom_agent_core::orchestrator::ConversationOrchestrator;
use classroom_agent_core::ports::{AgentPlatform, ClassroomStore, ConversationStore};
use classroom_agent_core::profile::ProfileService;
use classroom_agent_core::sync::{ContextSynchronizer, SyncFailure};
use classroom_agent_core::synced_store::SyncedClassroomStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The classroom store, wrapped so that every mutation schedules a sync.
    pub classroom: Arc<dyn ClassroomStore>,
    pub platform: Arc<dyn AgentPlatform>,
    pub synchronizer: ContextSynchronizer,
    pub profiles: Arc<ProfileService>,
    pub health: Arc<HealthMonitor>,
    pub readiness: watch::Receiver<Readiness>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the core services around the given adapters.
    ///
    /// `store` is the raw classroom store; the state exposes it wrapped in a
    /// `SyncedClassroomStore` so that handlers cannot mutate course data without
    /// scheduling a sync. Also returns the receiving end of the sync failure sink.
    pub fn new(
        store: Arc<dyn ClassroomStore>,
        conversations: Arc<dyn ConversationStore>,
        platform: Arc<dyn AgentPlatform>,
        health: Arc<HealthMonitor>,
        readiness: watch::Receiver<Readiness>,
        config: Arc<Config>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncFailure>) {
        let contexts = Arc::new(ContextCache::new());
        let (synchronizer, failures) = ContextSynchronizer::new(
            store.clone(),
            platform.clone(),
            contexts.clone(),
            config.sync_config(),
        );
        let classroom = Arc::new(SyncedClassroomStore::new(
            store.clone(),
            Arc::new(synchronizer.clone()),
        ));
        let profiles = Arc::new(ProfileService::new(store, contexts));
        let sessions = Arc::new(SessionRegistry::new(conversations, platform.clone()));

        let state = Self {
            classroom,
            platform,
            synchronizer,
            profiles,
            health,
            readiness,
            sessions,
            config,
        };
        (state, failures)
    }
}

//=========================================================================================
// SessionRegistry (One Orchestrator Per Signed-In User)
//=========================================================================================

/// Keeps one `ConversationOrchestrator` per user so the active thread, the agent call
/// status and the send ordering survive across requests.
pub struct SessionRegistry {
    conversations: Arc<dyn ConversationStore>,
    platform: Arc<dyn AgentPlatform>,
    sessions: Mutex<HashMap<Uuid, Arc<ConversationOrchestrator>>>,
}

impl SessionRegistry {
    pub fn new(conversations: Arc<dyn ConversationStore>, platform: Arc<dyn AgentPlatform>) -> Self {
        Self {
            conversations,
            platform,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the user's orchestrator, starting a fresh one on first use or when the
    /// request carries a different bearer token than the existing session.
    pub fn orchestrator(&self, session: &Session) -> Arc<ConversationOrchestrator> {
        let mut sessions = self.lock();
        if let Some(existing) = sessions.get(&session.user_id) {
            if existing.session() == session {
                return existing.clone();
            }
            debug!(user_id = %session.user_id, "Session credentials changed; starting over.");
        }

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            session.clone(),
            self.conversations.clone(),
            self.platform.clone(),
        ));
        sessions.insert(session.user_id, orchestrator.clone());
        orchestrator
    }

    /// The user's orchestrator if they have one, without creating it.
    pub fn existing(&self, user_id: Uuid) -> Option<Arc<ConversationOrchestrator>> {
        self.lock().get(&user_id).cloned()
    }

    pub fn end(&self, user_id: Uuid) -> bool {
        self.lock().remove(&user_id).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<ConversationOrchestrator>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
