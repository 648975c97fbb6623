//! crates/classroom_agent_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the agent layer.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the concrete data store and of the HTTP transport to the agent platform.

use crate::domain::{
    Assignment, AssignmentChanges, ContextSnapshot, Course, CourseChanges, Enrollment, Grade,
    HealthReport, Message, NewAssignment, NewCourse, NewSubmission, Submission, Thread,
    ThreadActivity, User,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// No response reached us from the agent platform.
    #[error("Network error: {0}")]
    Network(String),
    /// The agent platform answered with a non-2xx status.
    #[error("Agent platform returned {status}: {message}")]
    Platform { status: u16, message: String },
    /// The caller has no bearer token for an operation that requires one.
    #[error("No bearer token available")]
    AuthMissing,
}

impl PortError {
    /// The wire name surfaced to callers of the orchestration layer.
    pub fn kind(&self) -> &'static str {
        match self {
            PortError::NotFound(_) => "not_found",
            PortError::Conflict(_) => "conflict",
            PortError::Unexpected(_) => "unexpected",
            PortError::Unauthorized => "unauthorized",
            PortError::Network(_) => "network_error",
            PortError::Platform { .. } => "platform_error",
            PortError::AuthMissing => "auth_missing",
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Agent Platform Wire Types
//=========================================================================================

/// Which copy of an agent platform endpoint to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointTier {
    Primary,
    /// The unauthenticated `test` endpoints kept alive for environments where the
    /// primary pipeline is down.
    Test,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub message: String,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub response: String,
    pub success: bool,
    #[serde(default)]
    pub action_taken: Option<String>,
    #[serde(default)]
    pub thread_id: Option<Uuid>,
    #[serde(default)]
    pub thread_title: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRequest {
    pub first_message: String,
    pub first_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub title: Option<String>,
}

/// Replace-knowledge-base request for one subject of one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPush {
    /// A student id or the literal `"broadcast"`.
    pub student_id: String,
    pub course_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub context: ContextSnapshot,
    /// The snapshot rendered as a plain-text knowledge document.
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPushReply {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub knowledge_base_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLookup {
    pub success: bool,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub message: String,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Course, assignment, submission and enrollment persistence.
///
/// Every mutating method is a synchronization trigger; see `SyncedClassroomStore`.
#[async_trait]
pub trait ClassroomStore: Send + Sync {
    // --- Reads ---
    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course>;

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment>;

    /// All assignments of a course, oldest first.
    async fn list_assignments(&self, course_id: Uuid) -> PortResult<Vec<Assignment>>;

    async fn get_submission(&self, submission_id: Uuid) -> PortResult<Submission>;

    async fn find_submission(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
    ) -> PortResult<Option<Submission>>;

    async fn is_enrolled(&self, student_id: Uuid, course_id: Uuid) -> PortResult<bool>;

    // --- Course Mutations ---
    async fn create_course(&self, course: NewCourse) -> PortResult<Course>;

    async fn update_course(&self, course_id: Uuid, changes: CourseChanges) -> PortResult<Course>;

    /// Removes the course and returns the removed record.
    async fn delete_course(&self, course_id: Uuid) -> PortResult<Course>;

    // --- Assignment Mutations ---
    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment>;

    async fn update_assignment(
        &self,
        assignment_id: Uuid,
        changes: AssignmentChanges,
    ) -> PortResult<Assignment>;

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment>;

    // --- Submission Mutations ---
    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission>;

    async fn grade_submission(&self, submission_id: Uuid, grade: Grade) -> PortResult<Submission>;

    async fn delete_submission(&self, submission_id: Uuid) -> PortResult<Submission>;

    // --- Enrollment Mutations ---
    async fn enroll(&self, enrollment: Enrollment) -> PortResult<()>;

    async fn unenroll(&self, enrollment: Enrollment) -> PortResult<()>;
}

/// Thread and message persistence for the conversational agent.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_thread(&self, owner_id: Uuid, title: &str) -> PortResult<Thread>;

    async fn get_thread(&self, thread_id: Uuid) -> PortResult<Thread>;

    /// The owner's threads, most recently updated first.
    async fn list_threads(&self, owner_id: Uuid) -> PortResult<Vec<Thread>>;

    async fn record_thread_activity(
        &self,
        thread_id: Uuid,
        activity: ThreadActivity,
    ) -> PortResult<Thread>;

    /// Removes the thread together with all of its messages.
    async fn delete_thread(&self, thread_id: Uuid) -> PortResult<()>;

    /// Creates a pending message and increments the thread's `message_count` in the
    /// same write.
    async fn create_message(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        request: &str,
    ) -> PortResult<Message>;

    /// Writes the response of a pending message. Fails with `Conflict` if it was
    /// already answered.
    async fn set_message_response(&self, message_id: Uuid, response: &str) -> PortResult<Message>;

    /// Messages of a thread, oldest first.
    async fn list_messages(&self, thread_id: Uuid) -> PortResult<Vec<Message>>;
}

/// The remote conversational and voice agent service.
#[async_trait]
pub trait AgentPlatform: Send + Sync {
    async fn process(
        &self,
        tier: EndpointTier,
        bearer: Option<&str>,
        request: &AgentRequest,
    ) -> PortResult<AgentReply>;

    async fn generate_title(
        &self,
        tier: EndpointTier,
        bearer: Option<&str>,
        request: &TitleRequest,
    ) -> PortResult<TitleReply>;

    async fn update_context(
        &self,
        bearer: Option<&str>,
        push: &ContextPush,
    ) -> PortResult<ContextPushReply>;

    async fn fetch_context(
        &self,
        bearer: Option<&str>,
        student_id: Uuid,
        course_id: Uuid,
    ) -> PortResult<ContextLookup>;

    /// Calls `GET /health`.
    async fn health(&self) -> PortResult<HealthReport>;

    /// Calls `GET /voice-agent/health`.
    async fn voice_health(&self) -> PortResult<HealthReport>;
}

/// Receives notice of every successful classroom mutation.
pub trait MutationObserver: Send + Sync {
    fn notify_mutation(&self, course_id: Uuid, student_id: Option<Uuid>);
}
