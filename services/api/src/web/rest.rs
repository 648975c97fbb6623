//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::port_rejection;
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use classroom_agent_core::domain::{
    AgentCallStatus, Assignment, AssignmentChanges, ContextSnapshot, Course, CourseChanges,
    Enrollment, Grade, HealthStatus, Message, NewAssignment, NewCourse, NewSubmission,
    PublicationStatus, Readiness, Role, Session, Submission, Thread, User,
};
use classroom_agent_core::orchestrator::SendReport;
use classroom_agent_core::ports::{ContextLookup, ContextPushReply, EndpointTier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

type Rejection = (StatusCode, String);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_profile_handler,
        logout_handler,
        list_threads_handler,
        create_thread_handler,
        select_thread_handler,
        delete_thread_handler,
        list_messages_handler,
        send_message_handler,
        agent_status_handler,
        agent_health_handler,
        create_course_handler,
        update_course_handler,
        delete_course_handler,
        create_assignment_handler,
        update_assignment_handler,
        delete_assignment_handler,
        create_submission_handler,
        grade_submission_handler,
        delete_submission_handler,
        enroll_handler,
        unenroll_handler,
        update_context_handler,
        get_context_handler,
        get_knowledge_handler,
    ),
    components(
        schemas(
            ProfileResponse, ThreadResponse, ThreadListResponse, DeleteThreadResponse,
            MessageResponse, SendMessageRequest, SendMessageResponse, AgentStatusResponse,
            AgentHealthResponse, CourseRequest, CourseUpdateRequest, CourseResponse,
            AssignmentRequest, AssignmentUpdateRequest, AssignmentResponse, SubmissionRequest,
            GradeRequest, SubmissionResponse, EnrollmentRequest, UpdateContextRequest,
            ContextPushResponse, ContextResponse, KnowledgeResponse
        )
    ),
    tags(
        (name = "Classroom Agent API", description = "Conversations with the classroom agent and the course data it is kept in sync with.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    id: Uuid,
    role: String,
    display_name: String,
    email: Option<String>,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            role: user.role.as_str().to_string(),
            display_name: user.display_name,
            email: user.email,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ThreadResponse {
    id: Uuid,
    title: String,
    message_count: i32,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Thread> for ThreadResponse {
    fn from(thread: Thread) -> Self {
        Self {
            id: thread.id,
            title: thread.title,
            message_count: thread.message_count,
            last_message_at: thread.last_message_at,
            created_at: thread.created_at,
            updated_at: thread.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ThreadListResponse {
    active_thread_id: Option<Uuid>,
    threads: Vec<ThreadResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteThreadResponse {
    /// The thread selected after the deletion, if any remain.
    active_thread_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    id: Uuid,
    thread_id: Uuid,
    request: String,
    response: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            thread_id: message.thread_id,
            request: message.request,
            response: message.response,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    message: String,
    /// Selects this thread before sending; the active thread is used otherwise.
    thread_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct SendMessageResponse {
    thread: ThreadResponse,
    message: MessageResponse,
    status: String,
    /// `primary` or `test`; absent when both endpoints failed.
    answered_by: Option<String>,
    /// `network_error`, `platform_error` or `auth_missing` when both endpoints failed.
    error: Option<String>,
}

impl From<SendReport> for SendMessageResponse {
    fn from(report: SendReport) -> Self {
        Self {
            thread: report.thread.into(),
            message: report.message.into(),
            status: call_status_str(report.status).to_string(),
            answered_by: report.answered_by.map(|tier| tier_str(tier).to_string()),
            error: report.error.map(|e| e.kind().to_string()),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AgentStatusResponse {
    status: String,
    active_thread_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct AgentHealthResponse {
    status: String,
    available: bool,
    message: String,
    /// The latest background classification: `ready`, `degraded` or `unreachable`.
    readiness: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CourseRequest {
    title: String,
    description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CourseUpdateRequest {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CourseResponse {
    id: Uuid,
    title: String,
    description: Option<String>,
    teacher_id: Uuid,
    sync_scoped: bool,
}

impl From<Course> for CourseResponse {
    fn from(course: Course) -> Self {
        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            teacher_id: course.teacher_id,
            sync_scoped: course.sync_scoped,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AssignmentRequest {
    course_id: Uuid,
    title: String,
    description: Option<String>,
    rubric: Option<String>,
    due_date: Option<DateTime<Utc>>,
    total_points: Option<i32>,
    /// `draft` (default) or `published`.
    status: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AssignmentUpdateRequest {
    title: Option<String>,
    description: Option<String>,
    rubric: Option<String>,
    due_date: Option<DateTime<Utc>>,
    total_points: Option<i32>,
    status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AssignmentResponse {
    id: Uuid,
    course_id: Uuid,
    title: String,
    description: Option<String>,
    rubric: Option<String>,
    due_date: Option<DateTime<Utc>>,
    total_points: i32,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<Assignment> for AssignmentResponse {
    fn from(assignment: Assignment) -> Self {
        Self {
            id: assignment.id,
            course_id: assignment.course_id,
            title: assignment.title,
            description: assignment.description,
            rubric: assignment.rubric,
            due_date: assignment.due_date,
            total_points: assignment.total_points,
            status: assignment.status.as_str().to_string(),
            created_at: assignment.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SubmissionRequest {
    assignment_id: Uuid,
    file_path: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct GradeRequest {
    score: f64,
    feedback: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SubmissionResponse {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    file_path: Option<String>,
    content: Option<String>,
    status: String,
    grade: Option<f64>,
    feedback: Option<String>,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            assignment_id: submission.assignment_id,
            student_id: submission.student_id,
            file_path: submission.file_path,
            content: submission.content,
            status: submission.status,
            grade: submission.grade,
            feedback: submission.feedback,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct EnrollmentRequest {
    student_id: Uuid,
    course_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateContextRequest {
    /// Omit for a course-wide broadcast push.
    student_id: Option<Uuid>,
    course_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct ContextPushResponse {
    success: bool,
    message: String,
    agent_id: Option<String>,
    knowledge_base_updated: bool,
}

impl From<ContextPushReply> for ContextPushResponse {
    fn from(reply: ContextPushReply) -> Self {
        Self {
            success: reply.success,
            message: reply.message,
            agent_id: reply.agent_id,
            knowledge_base_updated: reply.knowledge_base_updated,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ContextResponse {
    success: bool,
    #[schema(value_type = Object)]
    context: ContextSnapshot,
}

#[derive(Serialize, ToSchema)]
pub struct KnowledgeResponse {
    success: bool,
    #[schema(value_type = Option<Object>)]
    context: Option<serde_json::Value>,
    message: String,
}

impl From<ContextLookup> for KnowledgeResponse {
    fn from(lookup: ContextLookup) -> Self {
        Self {
            success: lookup.success,
            context: lookup.context,
            message: lookup.message,
        }
    }
}

fn call_status_str(status: AgentCallStatus) -> &'static str {
    match status {
        AgentCallStatus::Ready => "ready",
        AgentCallStatus::Processing => "processing",
        AgentCallStatus::Error => "error",
    }
}

fn tier_str(tier: EndpointTier) -> &'static str {
    match tier {
        EndpointTier::Primary => "primary",
        EndpointTier::Test => "test",
    }
}

fn readiness_str(readiness: Readiness) -> &'static str {
    match readiness {
        Readiness::Ready => "ready",
        Readiness::Degraded => "degraded",
        Readiness::Unreachable => "unreachable",
    }
}

fn parse_status(value: &str) -> Result<PublicationStatus, Rejection> {
    PublicationStatus::parse(value).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("Unknown assignment status '{}'", value),
        )
    })
}

//=========================================================================================
// Access Checks
//=========================================================================================

async fn current_user(state: &AppState, session: &Session) -> Result<User, Rejection> {
    state
        .profiles
        .profile(session.user_id)
        .await
        .map_err(|e| port_rejection("Failed to load profile", e))
}

async fn require_teacher(state: &AppState, session: &Session) -> Result<User, Rejection> {
    let user = current_user(state, session).await?;
    if user.role != Role::Teacher {
        return Err((
            StatusCode::FORBIDDEN,
            "Only teachers can change course data".to_string(),
        ));
    }
    Ok(user)
}

/// The course, provided the session user is the teacher who owns it.
async fn owned_course(
    state: &AppState,
    session: &Session,
    course_id: Uuid,
) -> Result<Course, Rejection> {
    let user = require_teacher(state, session).await?;
    let course = state
        .classroom
        .get_course(course_id)
        .await
        .map_err(|e| port_rejection("Failed to load course", e))?;
    if course.teacher_id != user.id {
        return Err((
            StatusCode::FORBIDDEN,
            "Course belongs to another teacher".to_string(),
        ));
    }
    Ok(course)
}

async fn owned_assignment(
    state: &AppState,
    session: &Session,
    assignment_id: Uuid,
) -> Result<Assignment, Rejection> {
    let assignment = state
        .classroom
        .get_assignment(assignment_id)
        .await
        .map_err(|e| port_rejection("Failed to load assignment", e))?;
    owned_course(state, session, assignment.course_id).await?;
    Ok(assignment)
}

//=========================================================================================
// Profile Handlers
//=========================================================================================

/// The signed-in user's profile.
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Profile of the session user", body = ProfileResponse),
        (status = 401, description = "Missing or unknown x-user-id")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, Rejection> {
    let user = current_user(&state, &session).await?;
    Ok(Json(ProfileResponse::from(user)))
}

/// Ends the session: drops the user's conversation state and clears the profile and
/// context caches.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Signed out")),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    state.sessions.end(session.user_id);
    state.profiles.sign_out();
    info!(user_id = %session.user_id, "Signed out.");
    StatusCode::NO_CONTENT
}

//=========================================================================================
// Conversation Handlers
//=========================================================================================

/// The user's threads, most recently updated first.
#[utoipa::path(
    get,
    path = "/threads",
    responses((status = 200, description = "Thread list", body = ThreadListResponse)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn list_threads_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, Rejection> {
    let orchestrator = state.sessions.orchestrator(&session);
    let threads = orchestrator
        .list_threads()
        .await
        .map_err(|e| port_rejection("Failed to list threads", e))?;
    Ok(Json(ThreadListResponse {
        active_thread_id: orchestrator.active_thread(),
        threads: threads.into_iter().map(ThreadResponse::from).collect(),
    }))
}

/// Creates an empty "New Chat" thread and selects it.
#[utoipa::path(
    post,
    path = "/threads",
    responses((status = 201, description = "Thread created", body = ThreadResponse)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_thread_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, Rejection> {
    let thread = state
        .sessions
        .orchestrator(&session)
        .new_thread()
        .await
        .map_err(|e| port_rejection("Failed to create thread", e))?;
    Ok((StatusCode::CREATED, Json(ThreadResponse::from(thread))))
}

#[utoipa::path(
    post,
    path = "/threads/{id}/select",
    responses(
        (status = 200, description = "Thread selected", body = ThreadResponse),
        (status = 401, description = "Thread belongs to another user"),
        (status = 404, description = "Thread not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Thread to select."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn select_thread_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(thread_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let thread = state
        .sessions
        .orchestrator(&session)
        .select_thread(thread_id)
        .await
        .map_err(|e| port_rejection("Failed to select thread", e))?;
    Ok(Json(ThreadResponse::from(thread)))
}

/// Deletes a thread with its messages and reports the new selection.
#[utoipa::path(
    delete,
    path = "/threads/{id}",
    responses(
        (status = 200, description = "Thread deleted", body = DeleteThreadResponse),
        (status = 404, description = "Thread not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Thread to delete."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_thread_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(thread_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let active_thread_id = state
        .sessions
        .orchestrator(&session)
        .delete_thread(thread_id)
        .await
        .map_err(|e| port_rejection("Failed to delete thread", e))?;
    Ok(Json(DeleteThreadResponse { active_thread_id }))
}

#[utoipa::path(
    get,
    path = "/threads/{id}/messages",
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageResponse]),
        (status = 404, description = "Thread not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Thread whose messages to list."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(thread_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let messages = state
        .sessions
        .orchestrator(&session)
        .messages(thread_id)
        .await
        .map_err(|e| port_rejection("Failed to list messages", e))?;
    let messages: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(Json(messages))
}

/// Sends a message to the agent.
///
/// The turn runs on its own task, so a client that disconnects mid-call does not stop
/// the response from being persisted. Agent failures still answer 200, with the
/// apology as the response and `status = error`.
#[utoipa::path(
    post,
    path = "/messages",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Turn completed", body = SendMessageResponse),
        (status = 400, description = "Empty message"),
        (status = 500, description = "The conversation store failed")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let text = req.message.trim().to_string();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message must not be empty".to_string()));
    }

    let orchestrator = state.sessions.orchestrator(&session);
    let turn =
        tokio::spawn(async move { orchestrator.send_message_to(req.thread_id, &text).await });

    let report = turn
        .await
        .map_err(|e| {
            error!("Send task failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to send message".to_string(),
            )
        })?
        .map_err(|e| port_rejection("Failed to send message", e))?;

    Ok(Json(SendMessageResponse::from(report)))
}

/// The user's agent call status: `ready`, `processing` or `error`.
#[utoipa::path(
    get,
    path = "/agent/status",
    responses((status = 200, description = "Current status", body = AgentStatusResponse)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn agent_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> impl IntoResponse {
    let (status, active_thread_id) = match state.sessions.existing(session.user_id) {
        Some(orchestrator) => (orchestrator.status(), orchestrator.active_thread()),
        None => (AgentCallStatus::Ready, None),
    };
    Json(AgentStatusResponse {
        status: call_status_str(status).to_string(),
        active_thread_id,
    })
}

/// Checks the agent platform. Advisory only: sending never depends on it.
#[utoipa::path(
    get,
    path = "/agent/health",
    responses((status = 200, description = "Health report", body = AgentHealthResponse))
)]
pub async fn agent_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health.check_health().await;
    let readiness = *state.readiness.borrow();
    Json(AgentHealthResponse {
        status: match report.status {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
        .to_string(),
        available: report.available,
        message: report.message,
        readiness: readiness_str(readiness).to_string(),
    })
}

//=========================================================================================
// Course Handlers
//=========================================================================================

#[utoipa::path(
    post,
    path = "/courses",
    request_body = CourseRequest,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 403, description = "Not a teacher")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CourseRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let teacher = require_teacher(&state, &session).await?;
    let course = state
        .classroom
        .create_course(NewCourse {
            title: req.title,
            description: req.description,
            teacher_id: teacher.id,
        })
        .await
        .map_err(|e| port_rejection("Failed to create course", e))?;
    info!(course_id = %course.id, "Course created.");
    Ok((StatusCode::CREATED, Json(CourseResponse::from(course))))
}

#[utoipa::path(
    put,
    path = "/courses/{id}",
    request_body = CourseUpdateRequest,
    responses(
        (status = 200, description = "Course updated", body = CourseResponse),
        (status = 403, description = "Not the course's teacher"),
        (status = 404, description = "Course not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Course to update."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<CourseUpdateRequest>,
) -> Result<impl IntoResponse, Rejection> {
    owned_course(&state, &session, course_id).await?;
    let course = state
        .classroom
        .update_course(
            course_id,
            CourseChanges {
                title: req.title,
                description: req.description,
            },
        )
        .await
        .map_err(|e| port_rejection("Failed to update course", e))?;
    Ok(Json(CourseResponse::from(course)))
}

#[utoipa::path(
    delete,
    path = "/courses/{id}",
    responses(
        (status = 204, description = "Course deleted"),
        (status = 403, description = "Not the course's teacher"),
        (status = 404, description = "Course not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Course to delete."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(course_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    owned_course(&state, &session, course_id).await?;
    state
        .classroom
        .delete_course(course_id)
        .await
        .map_err(|e| port_rejection("Failed to delete course", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Assignment Handlers
//=========================================================================================

#[utoipa::path(
    post,
    path = "/assignments",
    request_body = AssignmentRequest,
    responses(
        (status = 201, description = "Assignment created", body = AssignmentResponse),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Not the course's teacher")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<AssignmentRequest>,
) -> Result<impl IntoResponse, Rejection> {
    owned_course(&state, &session, req.course_id).await?;
    let status = match req.status.as_deref() {
        Some(value) => parse_status(value)?,
        None => PublicationStatus::Draft,
    };
    let assignment = state
        .classroom
        .create_assignment(NewAssignment {
            course_id: req.course_id,
            title: req.title,
            description: req.description,
            rubric: req.rubric,
            due_date: req.due_date,
            total_points: req.total_points.unwrap_or(100),
            status,
        })
        .await
        .map_err(|e| port_rejection("Failed to create assignment", e))?;
    Ok((StatusCode::CREATED, Json(AssignmentResponse::from(assignment))))
}

#[utoipa::path(
    put,
    path = "/assignments/{id}",
    request_body = AssignmentUpdateRequest,
    responses(
        (status = 200, description = "Assignment updated", body = AssignmentResponse),
        (status = 404, description = "Assignment not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Assignment to update."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn update_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(assignment_id): Path<Uuid>,
    Json(req): Json<AssignmentUpdateRequest>,
) -> Result<impl IntoResponse, Rejection> {
    owned_assignment(&state, &session, assignment_id).await?;
    let status = req.status.as_deref().map(parse_status).transpose()?;
    let assignment = state
        .classroom
        .update_assignment(
            assignment_id,
            AssignmentChanges {
                title: req.title,
                description: req.description,
                rubric: req.rubric,
                due_date: req.due_date,
                total_points: req.total_points,
                status,
            },
        )
        .await
        .map_err(|e| port_rejection("Failed to update assignment", e))?;
    Ok(Json(AssignmentResponse::from(assignment)))
}

#[utoipa::path(
    delete,
    path = "/assignments/{id}",
    responses(
        (status = 204, description = "Assignment deleted"),
        (status = 404, description = "Assignment not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Assignment to delete."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_assignment_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(assignment_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    owned_assignment(&state, &session, assignment_id).await?;
    state
        .classroom
        .delete_assignment(assignment_id)
        .await
        .map_err(|e| port_rejection("Failed to delete assignment", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Submission Handlers
//=========================================================================================

/// Turns in work for an assignment as the session user.
#[utoipa::path(
    post,
    path = "/submissions",
    request_body = SubmissionRequest,
    responses(
        (status = 201, description = "Submission created", body = SubmissionResponse),
        (status = 404, description = "Assignment not found")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn create_submission_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<SubmissionRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let submission = state
        .classroom
        .create_submission(NewSubmission {
            assignment_id: req.assignment_id,
            student_id: session.user_id,
            file_path: req.file_path,
            content: req.content,
        })
        .await
        .map_err(|e| port_rejection("Failed to create submission", e))?;
    Ok((StatusCode::CREATED, Json(SubmissionResponse::from(submission))))
}

#[utoipa::path(
    put,
    path = "/submissions/{id}/grade",
    request_body = GradeRequest,
    responses(
        (status = 200, description = "Submission graded", body = SubmissionResponse),
        (status = 403, description = "Not the course's teacher"),
        (status = 404, description = "Submission not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Submission to grade."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn grade_submission_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(submission_id): Path<Uuid>,
    Json(req): Json<GradeRequest>,
) -> Result<impl IntoResponse, Rejection> {
    let submission = state
        .classroom
        .get_submission(submission_id)
        .await
        .map_err(|e| port_rejection("Failed to load submission", e))?;
    owned_assignment(&state, &session, submission.assignment_id).await?;

    let graded = state
        .classroom
        .grade_submission(
            submission_id,
            Grade {
                score: req.score,
                feedback: req.feedback,
            },
        )
        .await
        .map_err(|e| port_rejection("Failed to grade submission", e))?;
    Ok(Json(SubmissionResponse::from(graded)))
}

/// Withdraws a submission. Allowed for its student and for the course's teacher.
#[utoipa::path(
    delete,
    path = "/submissions/{id}",
    responses(
        (status = 204, description = "Submission deleted"),
        (status = 404, description = "Submission not found")
    ),
    params(
        ("id" = Uuid, Path, description = "Submission to delete."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn delete_submission_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse, Rejection> {
    let submission = state
        .classroom
        .get_submission(submission_id)
        .await
        .map_err(|e| port_rejection("Failed to load submission", e))?;
    if submission.student_id != session.user_id {
        owned_assignment(&state, &session, submission.assignment_id).await?;
    }
    state
        .classroom
        .delete_submission(submission_id)
        .await
        .map_err(|e| port_rejection("Failed to delete submission", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Enrollment Handlers
//=========================================================================================

/// Students may enroll themselves; teachers may enroll anyone into their own courses.
async fn check_enrollment_access(
    state: &AppState,
    session: &Session,
    req: &EnrollmentRequest,
) -> Result<(), Rejection> {
    if req.student_id == session.user_id {
        return Ok(());
    }
    owned_course(state, session, req.course_id).await.map(|_| ())
}

#[utoipa::path(
    post,
    path = "/enrollments",
    request_body = EnrollmentRequest,
    responses((status = 204, description = "Student enrolled")),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<EnrollmentRequest>,
) -> Result<impl IntoResponse, Rejection> {
    check_enrollment_access(&state, &session, &req).await?;
    state
        .classroom
        .enroll(Enrollment {
            student_id: req.student_id,
            course_id: req.course_id,
        })
        .await
        .map_err(|e| port_rejection("Failed to enroll student", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/enrollments",
    request_body = EnrollmentRequest,
    responses((status = 204, description = "Student unenrolled")),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn unenroll_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<EnrollmentRequest>,
) -> Result<impl IntoResponse, Rejection> {
    check_enrollment_access(&state, &session, &req).await?;
    state
        .classroom
        .unenroll(Enrollment {
            student_id: req.student_id,
            course_id: req.course_id,
        })
        .await
        .map_err(|e| port_rejection("Failed to unenroll student", e))?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Voice Agent Context Handlers
//=========================================================================================

/// A student may read and push their own context; the course's teacher may do so for
/// anyone in the course, and is the only one allowed a course-wide push.
async fn check_context_access(
    state: &AppState,
    session: &Session,
    student_id: Option<Uuid>,
    course_id: Uuid,
) -> Result<(), Rejection> {
    if student_id == Some(session.user_id) {
        return Ok(());
    }
    owned_course(state, session, course_id).await.map(|_| ())
}

/// Builds and pushes a fresh snapshot right away, waiting for the platform's reply.
#[utoipa::path(
    post,
    path = "/voice-agent/update-context",
    request_body = UpdateContextRequest,
    responses(
        (status = 200, description = "Knowledge base replaced", body = ContextPushResponse),
        (status = 403, description = "Neither the student nor the course's teacher"),
        (status = 404, description = "Student not enrolled or course not found"),
        (status = 502, description = "Agent platform failed")
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn update_context_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<UpdateContextRequest>,
) -> Result<impl IntoResponse, Rejection> {
    check_context_access(&state, &session, req.student_id, req.course_id).await?;
    let reply = state
        .synchronizer
        .refresh(req.student_id, req.course_id)
        .await
        .map_err(|e| port_rejection("Failed to update agent context", e))?;
    Ok(Json(ContextPushResponse::from(reply)))
}

/// The locally built snapshot for a student, served from the context cache.
#[utoipa::path(
    get,
    path = "/voice-agent/context/{student_id}/{course_id}",
    responses(
        (status = 200, description = "Current snapshot", body = ContextResponse),
        (status = 403, description = "Neither the student nor the course's teacher"),
        (status = 404, description = "Student not enrolled or course not found")
    ),
    params(
        ("student_id" = Uuid, Path, description = "Student whose view to build."),
        ("course_id" = Uuid, Path, description = "Course to build."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_context_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((student_id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, Rejection> {
    check_context_access(&state, &session, Some(student_id), course_id).await?;
    let context = state
        .synchronizer
        .snapshot(student_id, course_id)
        .await
        .map_err(|e| port_rejection("Failed to build context", e))?;
    Ok(Json(ContextResponse {
        success: true,
        context,
    }))
}

/// What the agent platform currently holds for a student.
#[utoipa::path(
    get,
    path = "/voice-agent/knowledge/{student_id}/{course_id}",
    responses(
        (status = 200, description = "Platform-side context", body = KnowledgeResponse),
        (status = 403, description = "Neither the student nor the course's teacher"),
        (status = 502, description = "Agent platform failed")
    ),
    params(
        ("student_id" = Uuid, Path, description = "Student to look up."),
        ("course_id" = Uuid, Path, description = "Course to look up."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn get_knowledge_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path((student_id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, Rejection> {
    check_context_access(&state, &session, Some(student_id), course_id).await?;
    let lookup = state
        .platform
        .fetch_context(session.bearer(), student_id, course_id)
        .await
        .map_err(|e| port_rejection("Failed to fetch agent context", e))?;
    Ok(Json(KnowledgeResponse::from(lookup)))
}
