//! crates/classroom_agent_core/src/sync.rs
//!
//! Keeps the voice agent's knowledge base in step with the sync-scoped course.
//!
//! Every mutation of that course spawns a background push of a freshly built, complete
//! `ContextSnapshot`. Pushes are at-least-once and fire-and-forget: the mutation's caller
//! never waits for them or sees their errors. Failures that survive the retry policy are
//! delivered to an error sink instead of being dropped.

use crate::cache::ContextCache;
use crate::document::render_knowledge_document;
use crate::domain::{
    AssignmentContext, ContextSnapshot, CourseContext, Role, StudentInfo, SubmissionSummary,
    SyncSubject,
};
use crate::ports::{
    AgentPlatform, ClassroomStore, ContextPush, ContextPushReply, MutationObserver, PortError,
    PortResult,
};
use chrono::{DateTime, Utc};
use retry_policies::policies::ExponentialBackoff;
use retry_policies::{Jitter, RetryDecision, RetryPolicy};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Total push attempts per mutation, at least one.
    pub max_attempts: u32,
    /// Shortest delay between attempts; the schedule grows exponentially from here.
    pub backoff: Duration,
}

/// Longest delay between attempts, as a multiple of `backoff`.
const MAX_BACKOFF_FACTOR: u32 = 32;

impl SyncPolicy {
    /// The retry schedule of one push: `max_attempts - 1` retries with exponential
    /// backoff between `backoff` and `MAX_BACKOFF_FACTOR * backoff`.
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .retry_bounds(self.backoff, self.backoff.saturating_mul(MAX_BACKOFF_FACTOR))
            .jitter(Jitter::Bounded)
            .build_with_max_retries(self.max_attempts.saturating_sub(1))
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// The one course mirrored into the knowledge base. `None` disables mutation sync.
    pub sync_course: Option<Uuid>,
    pub agent_id: Option<String>,
    pub policy: SyncPolicy,
}

/// A push that failed for good.
#[derive(Debug, Clone)]
pub struct SyncFailure {
    pub course_id: Uuid,
    pub subject: SyncSubject,
    pub attempts: u32,
    pub error: PortError,
    pub failed_at: DateTime<Utc>,
}

struct Inner {
    store: Arc<dyn ClassroomStore>,
    platform: Arc<dyn AgentPlatform>,
    contexts: Arc<ContextCache<ContextSnapshot>>,
    config: SyncConfig,
    failures: mpsc::UnboundedSender<SyncFailure>,
}

#[derive(Clone)]
pub struct ContextSynchronizer {
    inner: Arc<Inner>,
}

impl ContextSynchronizer {
    /// Creates the synchronizer together with the receiving end of its error sink.
    pub fn new(
        store: Arc<dyn ClassroomStore>,
        platform: Arc<dyn AgentPlatform>,
        contexts: Arc<ContextCache<ContextSnapshot>>,
        config: SyncConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SyncFailure>) {
        let (failures, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            store,
            platform,
            contexts,
            config,
            failures,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn sync_course(&self) -> Option<Uuid> {
        self.inner.config.sync_course
    }

    /// Records a mutation of `course_id` and schedules a push for it.
    ///
    /// Cached snapshots of the course are dropped for every course. The push only
    /// happens for the sync-scoped course: elsewhere this returns `None`, otherwise the
    /// handle of the background push, which callers are free to drop.
    pub fn notify(&self, course_id: Uuid, student_id: Option<Uuid>) -> Option<JoinHandle<()>> {
        self.inner.invalidate_course(course_id);
        if self.inner.config.sync_course != Some(course_id) {
            debug!(course_id = %course_id, "Mutation outside the sync-scoped course; skipping push.");
            return None;
        }

        let subject = SyncSubject::from_option(student_id);
        info!(course_id = %course_id, subject = %subject, "Scheduling knowledge base push.");

        let inner = self.inner.clone();
        Some(tokio::spawn(async move {
            if let Err((attempts, error)) = inner.push_with_retry(course_id, subject).await {
                error!(
                    course_id = %course_id,
                    subject = %subject,
                    attempts,
                    error = %error,
                    "Knowledge base push failed."
                );
                let failure = SyncFailure {
                    course_id,
                    subject,
                    attempts,
                    error,
                    failed_at: Utc::now(),
                };
                if inner.failures.send(failure).is_err() {
                    warn!("Sync failure sink is closed; failure dropped.");
                }
            }
        }))
    }

    /// Builds and pushes a snapshot right away, for any course, and returns the
    /// platform's reply.
    pub async fn refresh(
        &self,
        student_id: Option<Uuid>,
        course_id: Uuid,
    ) -> PortResult<ContextPushReply> {
        let subject = SyncSubject::from_option(student_id);
        self.inner
            .push_with_retry(course_id, subject)
            .await
            .map_err(|(_, e)| e)
    }

    /// The current snapshot of a student in a course, served from the context cache.
    pub async fn snapshot(&self, student_id: Uuid, course_id: Uuid) -> PortResult<ContextSnapshot> {
        let subject = SyncSubject::Student(student_id);
        let store = self.inner.store.clone();
        self.inner
            .contexts
            .get_or_fetch(&context_key(subject, course_id), move || {
                build_snapshot(store, subject, course_id)
            })
            .await
    }
}

impl MutationObserver for ContextSynchronizer {
    fn notify_mutation(&self, course_id: Uuid, student_id: Option<Uuid>) {
        // Fire-and-forget: the handle is deliberately dropped.
        let _ = self.notify(course_id, student_id);
    }
}

impl Inner {
    async fn push_with_retry(
        &self,
        course_id: Uuid,
        subject: SyncSubject,
    ) -> Result<ContextPushReply, (u32, PortError)> {
        let schedule = self.config.policy.schedule();
        let started = SystemTime::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.push_once(course_id, subject).await {
                Ok(reply) => {
                    info!(course_id = %course_id, subject = %subject, attempt, "Knowledge base updated.");
                    return Ok(reply);
                }
                Err(e) if is_transient(&e) => e,
                Err(e) => return Err((attempt, e)),
            };

            match schedule.should_retry(started, attempt - 1) {
                RetryDecision::Retry { execute_after } => {
                    let delay = execute_after
                        .duration_since(SystemTime::now())
                        .unwrap_or_default();
                    warn!(
                        course_id = %course_id,
                        subject = %subject,
                        attempt,
                        error = %error,
                        "Knowledge base push failed; retrying in {:?}.",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry => return Err((attempt, error)),
            }
        }
    }

    /// Drops every cached snapshot of the course, whatever its subject.
    fn invalidate_course(&self, course_id: Uuid) {
        let suffix = format!(":{}", course_id);
        self.contexts
            .invalidate_matching(|key| key.starts_with("context:") && key.ends_with(&suffix));
    }

    /// One attempt: re-read the store, rebuild in full, push.
    async fn push_once(&self, course_id: Uuid, subject: SyncSubject) -> PortResult<ContextPushReply> {
        let snapshot = build_snapshot(self.store.clone(), subject, course_id).await?;

        // Anything cached for this course predates the snapshot we are about to push.
        self.invalidate_course(course_id);

        let push = ContextPush {
            student_id: subject.wire_id(),
            course_id,
            agent_id: self.config.agent_id.clone(),
            document: render_knowledge_document(&snapshot),
            context: snapshot,
        };
        let reply = self.platform.update_context(None, &push).await?;
        if !reply.success {
            return Err(PortError::Platform {
                status: 200,
                message: reply.message,
            });
        }
        Ok(reply)
    }
}

/// Only failures of the platform round-trip are worth retrying.
fn is_transient(error: &PortError) -> bool {
    matches!(error, PortError::Network(_) | PortError::Platform { .. })
}

pub fn context_key(subject: SyncSubject, course_id: Uuid) -> String {
    format!("context:{}:{}", subject, course_id)
}

/// Reads the course, all its assignments and (for a student) that student's
/// submissions, and assembles them into a complete snapshot.
pub async fn build_snapshot(
    store: Arc<dyn ClassroomStore>,
    subject: SyncSubject,
    course_id: Uuid,
) -> PortResult<ContextSnapshot> {
    let student = match subject {
        SyncSubject::Student(student_id) => {
            let user = store.get_user(student_id).await?;
            if user.role != Role::Student {
                return Err(PortError::NotFound(format!("Student {} not found", student_id)));
            }
            if !store.is_enrolled(student_id, course_id).await? {
                return Err(PortError::NotFound(format!(
                    "Student {} is not enrolled in course {}",
                    student_id, course_id
                )));
            }
            Some(StudentInfo {
                id: user.id,
                name: user.display_name,
                email: user.email,
            })
        }
        SyncSubject::Broadcast => None,
    };

    let course = store.get_course(course_id).await?;
    let assignments = store.list_assignments(course_id).await?;

    let mut contexts = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let submission = match &student {
            Some(student) => store
                .find_submission(assignment.id, student.id)
                .await?
                .map(|s| SubmissionSummary {
                    status: s.status,
                    file_path: s.file_path,
                    content: s.content,
                    grade: s.grade,
                    feedback: s.feedback,
                }),
            None => None,
        };
        contexts.push(AssignmentContext {
            id: assignment.id,
            title: assignment.title,
            description: assignment.description,
            due_date: assignment.due_date,
            total_points: assignment.total_points,
            status: assignment.status,
            rubric: assignment.rubric,
            submission,
        });
    }

    debug!(
        course_id = %course_id,
        subject = %subject,
        assignments = contexts.len(),
        "Built context snapshot."
    );

    Ok(ContextSnapshot {
        student,
        course: CourseContext {
            id: course.id,
            title: course.title,
            description: course.description,
            assignments: contexts,
        },
        built_at: Utc::now(),
    })
}
