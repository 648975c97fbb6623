//! crates/classroom_agent_core/src/domain.rs
//!
//! Defines the core data structures for the agent layer.
//! Snapshot types derive `serde` because they travel to the agent platform verbatim;
//! the rest are plain records owned by the data store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Title given to every freshly created thread until auto-titling replaces it.
pub const DEFAULT_THREAD_TITLE: &str = "New Chat";

/// Response persisted when both the primary and the fallback agent calls fail.
pub const APOLOGY_RESPONSE: &str =
    "Sorry, I'm having trouble connecting right now. Please try again in a moment.";

//=========================================================================================
// Classroom Records
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Represents a user - used throughout the app.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub role: Role,
    pub display_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    /// Only ever true for the single course mirrored into the knowledge base.
    pub sync_scoped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Draft,
    Published,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Draft => "draft",
            PublicationStatus::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PublicationStatus::Draft),
            "published" => Some(PublicationStatus::Published),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rubric: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_points: i32,
    pub status: PublicationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub file_path: Option<String>,
    pub content: Option<String>,
    pub status: String,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enrollment {
    pub student_id: Uuid,
    pub course_id: Uuid,
}

//=========================================================================================
// Mutation Payloads
//=========================================================================================

/// Fields required to create a course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
}

/// Partial course update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct CourseChanges {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rubric: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_points: i32,
    pub status: PublicationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub rubric: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_points: Option<i32>,
    pub status: Option<PublicationStatus>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub file_path: Option<String>,
    pub content: Option<String>,
}

/// A grade written onto an existing submission.
#[derive(Debug, Clone)]
pub struct Grade {
    pub score: f64,
    pub feedback: Option<String>,
}

//=========================================================================================
// Context Snapshots
//=========================================================================================

/// Whose view of the course a snapshot materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncSubject {
    Student(Uuid),
    /// Course-level mutations with no specific student, e.g. a new assignment.
    Broadcast,
}

impl SyncSubject {
    pub const BROADCAST_ID: &'static str = "broadcast";

    pub fn from_option(student_id: Option<Uuid>) -> Self {
        student_id.map_or(SyncSubject::Broadcast, SyncSubject::Student)
    }

    /// The identifier sent to the platform's `student_id` field.
    pub fn wire_id(&self) -> String {
        match self {
            SyncSubject::Student(id) => id.to_string(),
            SyncSubject::Broadcast => Self::BROADCAST_ID.to_string(),
        }
    }
}

impl fmt::Display for SyncSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

/// What a single student has turned in for one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionSummary {
    pub status: String,
    pub file_path: Option<String>,
    pub content: Option<String>,
    pub grade: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentContext {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub total_points: i32,
    pub status: PublicationStatus,
    pub rubric: Option<String>,
    /// `None` for broadcast snapshots and for students who have not submitted.
    pub submission: Option<SubmissionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseContext {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignments: Vec<AssignmentContext>,
}

/// A fully materialized read model of a course, optionally seen through one student.
///
/// Snapshots are never patched: each build replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub student: Option<StudentInfo>,
    pub course: CourseContext,
    pub built_at: DateTime<Utc>,
}

impl ContextSnapshot {
    pub fn subject(&self) -> SyncSubject {
        SyncSubject::from_option(self.student.as_ref().map(|s| s.id))
    }
}

//=========================================================================================
// Conversations
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub message_count: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_THREAD_TITLE
    }
}

/// One request/response exchange inside a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub request: String,
    /// Null until the agent pipeline writes it exactly once.
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written once a send has been answered. `message_count` is not among them:
/// the store bumps it when the message is created.
#[derive(Debug, Clone)]
pub struct ThreadActivity {
    pub title: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who is talking to the agent, and the bearer token of their login if there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub bearer: Option<String>,
}

impl Session {
    pub fn new(user_id: Uuid, bearer: Option<String>) -> Self {
        Self { user_id, bearer }
    }

    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }
}

//=========================================================================================
// Agent Status
//=========================================================================================

/// Process-wide, UI-facing status of the conversational agent. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCallStatus {
    Ready,
    Processing,
    Error,
}

impl AgentCallStatus {
    /// `ready -> processing -> {ready, error}` and `error -> processing`; nothing else.
    pub fn can_transition_to(self, next: AgentCallStatus) -> bool {
        matches!(
            (self, next),
            (AgentCallStatus::Ready, AgentCallStatus::Processing)
                | (AgentCallStatus::Error, AgentCallStatus::Processing)
                | (AgentCallStatus::Processing, AgentCallStatus::Ready)
                | (AgentCallStatus::Processing, AgentCallStatus::Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a single check of the platform's health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub available: bool,
    pub message: String,
}

/// Coarse availability classification rendered by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    Degraded,
    Unreachable,
}
