//! crates/classroom_agent_core/src/orchestrator.rs
//!
//! Drives one user's conversational turns: thread selection, message persistence,
//! the primary/fallback agent call, response persistence and thread bookkeeping.

use crate::domain::{
    AgentCallStatus, Message, Session, Thread, ThreadActivity, APOLOGY_RESPONSE,
    DEFAULT_THREAD_TITLE,
};
use crate::outcome::CallOutcome;
use crate::ports::{
    AgentPlatform, AgentRequest, ConversationStore, EndpointTier, PortError, PortResult,
    TitleRequest,
};
use crate::title::TitleChain;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What happened to one sent message.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub thread: Thread,
    pub message: Message,
    pub status: AgentCallStatus,
    /// The endpoint whose reply was persisted, `None` when both calls failed.
    pub answered_by: Option<EndpointTier>,
    /// The last failure when both calls failed.
    pub error: Option<PortError>,
}

struct Answer {
    response: String,
    status: AgentCallStatus,
    answered_by: Option<EndpointTier>,
    error: Option<PortError>,
}

pub struct ConversationOrchestrator {
    session: Session,
    store: Arc<dyn ConversationStore>,
    platform: Arc<dyn AgentPlatform>,
    titles: TitleChain,
    status: watch::Sender<AgentCallStatus>,
    active_thread: Mutex<Option<Uuid>>,
    /// Serializes sends so messages are processed in submission order.
    send_gate: tokio::sync::Mutex<()>,
}

impl ConversationOrchestrator {
    pub fn new(
        session: Session,
        store: Arc<dyn ConversationStore>,
        platform: Arc<dyn AgentPlatform>,
    ) -> Self {
        let titles = TitleChain::standard(platform.clone());
        Self::with_titles(session, store, platform, titles)
    }

    pub fn with_titles(
        session: Session,
        store: Arc<dyn ConversationStore>,
        platform: Arc<dyn AgentPlatform>,
        titles: TitleChain,
    ) -> Self {
        let (status, _) = watch::channel(AgentCallStatus::Ready);
        Self {
            session,
            store,
            platform,
            titles,
            status,
            active_thread: Mutex::new(None),
            send_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> AgentCallStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentCallStatus> {
        self.status.subscribe()
    }

    pub fn active_thread(&self) -> Option<Uuid> {
        *self.active()
    }

    //=====================================================================================
    // Send Pipeline
    //=====================================================================================

    /// Sends one message into the active thread. Sending is always permitted, including
    /// from `error`.
    ///
    /// Agent failures do not make this return `Err`; they are reported in the
    /// `SendReport` with an apology as the persisted response. `Err` means the
    /// conversation store itself failed.
    pub async fn send_message(&self, text: &str) -> PortResult<SendReport> {
        self.send_message_to(None, text).await
    }

    /// Sends one message into `thread_id`, selecting it first, or into the active thread
    /// when `None`. The target is resolved after this send's turn comes up, so a send
    /// queued behind another keeps the thread it asked for.
    pub async fn send_message_to(
        &self,
        thread_id: Option<Uuid>,
        text: &str,
    ) -> PortResult<SendReport> {
        let _turn = self.send_gate.lock().await;
        let thread = match thread_id {
            Some(thread_id) => self.select_thread(thread_id).await?,
            None => self.resolve_thread().await?,
        };
        self.transition(AgentCallStatus::Processing);

        match self.run_pipeline(thread, text).await {
            Ok(report) => {
                self.transition(report.status);
                Ok(report)
            }
            Err(e) => {
                error!(user_id = %self.session.user_id, error = %e, "Send pipeline failed.");
                self.transition(AgentCallStatus::Error);
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, thread: Thread, text: &str) -> PortResult<SendReport> {
        // Persisted before the agent answers so the caller can show it immediately.
        let pending = self
            .store
            .create_message(thread.id, self.session.user_id, text)
            .await?;
        debug!(message_id = %pending.id, thread_id = %thread.id, "Persisted pending message.");

        let request = AgentRequest {
            message: text.to_string(),
            user_id: self.session.user_id,
            thread_id: Some(thread.id),
            context: None,
        };
        let answer = self.ask_agent(&request).await;

        let message = self
            .store
            .set_message_response(pending.id, &answer.response)
            .await?;

        let title = if thread.message_count == 0 && thread.has_default_title() {
            let title_request = TitleRequest {
                first_message: text.to_string(),
                first_response: answer.response.clone(),
            };
            self.titles
                .generate(&title_request, self.session.bearer())
                .await
        } else {
            None
        };

        let now = Utc::now();
        let thread = self
            .store
            .record_thread_activity(
                thread.id,
                ThreadActivity {
                    title,
                    last_message_at: now,
                    updated_at: now,
                },
            )
            .await?;

        Ok(SendReport {
            thread,
            message,
            status: answer.status,
            answered_by: answer.answered_by,
            error: answer.error,
        })
    }

    /// Primary endpoint first; the test endpoint only when the primary failure is
    /// recoverable.
    async fn ask_agent(&self, request: &AgentRequest) -> Answer {
        let bearer = self.session.bearer();
        if bearer.is_none() {
            debug!(user_id = %self.session.user_id, "No bearer token; calling agent unauthenticated.");
        }

        let primary = self
            .platform
            .process(EndpointTier::Primary, bearer, request)
            .await;
        let cause = match CallOutcome::classify(primary) {
            CallOutcome::Success(reply) | CallOutcome::FatalFailure(reply) => {
                return Answer::from_reply(reply.response, EndpointTier::Primary)
            }
            CallOutcome::RecoverableFailure(cause) => cause,
        };
        warn!(cause = ?cause, "Primary agent call failed; trying fallback endpoint.");

        let fallback = self
            .platform
            .process(EndpointTier::Test, bearer, request)
            .await;
        match CallOutcome::classify(fallback) {
            CallOutcome::Success(reply) | CallOutcome::FatalFailure(reply) => {
                info!("Fallback agent endpoint answered.");
                Answer::from_reply(reply.response, EndpointTier::Test)
            }
            CallOutcome::RecoverableFailure(cause) => {
                let error = cause.into_error();
                error!(kind = error.kind(), error = %error, "Both agent endpoints failed.");
                Answer {
                    response: APOLOGY_RESPONSE.to_string(),
                    status: AgentCallStatus::Error,
                    answered_by: None,
                    error: Some(error),
                }
            }
        }
    }

    async fn resolve_thread(&self) -> PortResult<Thread> {
        let selected = self.active_thread();
        if let Some(thread_id) = selected {
            match self.store.get_thread(thread_id).await {
                Ok(thread) => return Ok(thread),
                Err(PortError::NotFound(_)) => {
                    warn!(thread_id = %thread_id, "Selected thread disappeared; starting a new one.");
                }
                Err(e) => return Err(e),
            }
        }
        self.new_thread().await
    }

    fn transition(&self, next: AgentCallStatus) {
        self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                debug!(from = ?current, to = ?next, "Agent status transition.");
                *current = next;
                true
            } else {
                warn!(from = ?current, to = ?next, "Ignored invalid agent status transition.");
                false
            }
        });
    }

    //=====================================================================================
    // Threads
    //=====================================================================================

    /// Creates an empty thread titled "New Chat" and selects it.
    pub async fn new_thread(&self) -> PortResult<Thread> {
        let thread = self
            .store
            .create_thread(self.session.user_id, DEFAULT_THREAD_TITLE)
            .await?;
        info!(thread_id = %thread.id, user_id = %self.session.user_id, "Created thread.");
        *self.active() = Some(thread.id);
        Ok(thread)
    }

    pub async fn list_threads(&self) -> PortResult<Vec<Thread>> {
        self.store.list_threads(self.session.user_id).await
    }

    pub async fn select_thread(&self, thread_id: Uuid) -> PortResult<Thread> {
        let thread = self.owned_thread(thread_id).await?;
        *self.active() = Some(thread.id);
        Ok(thread)
    }

    pub async fn messages(&self, thread_id: Uuid) -> PortResult<Vec<Message>> {
        self.owned_thread(thread_id).await?;
        self.store.list_messages(thread_id).await
    }

    /// Deletes a thread and its messages. When it was the active thread, the most
    /// recently updated remaining thread becomes active, or none. Returns the new
    /// selection.
    pub async fn delete_thread(&self, thread_id: Uuid) -> PortResult<Option<Uuid>> {
        self.owned_thread(thread_id).await?;
        self.store.delete_thread(thread_id).await?;
        info!(thread_id = %thread_id, "Deleted thread.");

        if self.active_thread() != Some(thread_id) {
            return Ok(self.active_thread());
        }

        let next = self
            .store
            .list_threads(self.session.user_id)
            .await?
            .first()
            .map(|t| t.id);
        *self.active() = next;
        Ok(next)
    }

    async fn owned_thread(&self, thread_id: Uuid) -> PortResult<Thread> {
        let thread = self.store.get_thread(thread_id).await?;
        if thread.owner_id != self.session.user_id {
            return Err(PortError::Unauthorized);
        }
        Ok(thread)
    }

    fn active(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.active_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Answer {
    fn from_reply(response: String, tier: EndpointTier) -> Self {
        Self {
            response,
            status: AgentCallStatus::Ready,
            answered_by: Some(tier),
            error: None,
        }
    }
}
