//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ClassroomStore` and `ConversationStore` ports from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use classroom_agent_core::domain::{
    Assignment, AssignmentChanges, Course, CourseChanges, Enrollment, Grade, Message,
    NewAssignment, NewCourse, NewSubmission, PublicationStatus, Role, Submission, Thread,
    ThreadActivity, User,
};
use classroom_agent_core::ports::{ClassroomStore, ConversationStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements both store ports.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Marks `course_id` as the course mirrored into the knowledge base and clears the
    /// flag everywhere else.
    pub async fn set_sync_scope(&self, course_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        sqlx::query("UPDATE courses SET sync_scoped = FALSE WHERE sync_scoped AND id <> $1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("UPDATE courses SET sync_scoped = TRUE WHERE id = $1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps `RowNotFound` onto `NotFound` for the named record.
fn not_found_or(kind: &'static str, id: Uuid) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", kind, id)),
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, role, display_name, email";
const COURSE_COLUMNS: &str = "id, title, description, teacher_id, sync_scoped";
const ASSIGNMENT_COLUMNS: &str =
    "id, course_id, title, description, rubric, due_date, total_points, status, created_at";
const SUBMISSION_COLUMNS: &str =
    "id, assignment_id, student_id, file_path, content, status, grade, feedback";
const THREAD_COLUMNS: &str =
    "id, owner_id, title, message_count, last_message_at, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, thread_id, author_id, request, response, created_at, updated_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    role: String,
    display_name: String,
    email: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            PortError::Unexpected(format!("User {} has unknown role '{}'", self.id, self.role))
        })?;
        Ok(User {
            id: self.id,
            role,
            display_name: self.display_name,
            email: self.email,
        })
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    teacher_id: Uuid,
    sync_scoped: bool,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            title: self.title,
            description: self.description,
            teacher_id: self.teacher_id,
            sync_scoped: self.sync_scoped,
        }
    }
}

#[derive(FromRow)]
struct AssignmentRecord {
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
impl AssignmentRecord {
    fn to_domain(self) -> PortResult<Assignment> {
        let status = PublicationStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Assignment {} has unknown status '{}'",
                self.id, self.status
            ))
        })?;
        Ok(Assignment {
            id: self.id,
            course_id: self.course_id,
            title: self.title,
            description: self.description,
            rubric: self.rubric,
            due_date: self.due_date,
            total_points: self.total_points,
            status,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct SubmissionRecord {
    id: Uuid,
    assignment_id: Uuid,
    student_id: Uuid,
    file_path: Option<String>,
    content: Option<String>,
    status: String,
    grade: Option<f64>,
    feedback: Option<String>,
}
impl SubmissionRecord {
    fn to_domain(self) -> Submission {
        Submission {
            id: self.id,
            assignment_id: self.assignment_id,
            student_id: self.student_id,
            file_path: self.file_path,
            content: self.content,
            status: self.status,
            grade: self.grade,
            feedback: self.feedback,
        }
    }
}

#[derive(FromRow)]
struct ThreadRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    message_count: i32,
    last_message_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ThreadRecord {
    fn to_domain(self) -> Thread {
        Thread {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            message_count: self.message_count,
            last_message_at: self.last_message_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: Uuid,
    thread_id: Uuid,
    author_id: Uuid,
    request: String,
    response: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl MessageRecord {
    fn to_domain(self) -> Message {
        Message {
            id: self.id,
            thread_id: self.thread_id,
            author_id: self.author_id,
            request: self.request,
            response: self.response,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

//=========================================================================================
// `ClassroomStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ClassroomStore for PgStore {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("User", user_id))?;
        record.to_domain()
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(&format!(
            "SELECT {} FROM courses WHERE id = $1",
            COURSE_COLUMNS
        ))
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Course", course_id))?;
        Ok(record.to_domain())
    }

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM assignments WHERE id = $1",
            ASSIGNMENT_COLUMNS
        ))
        .bind(assignment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Assignment", assignment_id))?;
        record.to_domain()
    }

    async fn list_assignments(&self, course_id: Uuid) -> PortResult<Vec<Assignment>> {
        let records = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {} FROM assignments WHERE course_id = $1 ORDER BY created_at ASC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_submission(&self, submission_id: Uuid) -> PortResult<Submission> {
        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "SELECT {} FROM submissions WHERE id = $1",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Submission", submission_id))?;
        Ok(record.to_domain())
    }

    async fn find_submission(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
    ) -> PortResult<Option<Submission>> {
        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "SELECT {} FROM submissions WHERE assignment_id = $1 AND student_id = $2 \
             ORDER BY created_at DESC LIMIT 1",
            SUBMISSION_COLUMNS
        ))
        .bind(assignment_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(SubmissionRecord::to_domain))
    }

    async fn is_enrolled(&self, student_id: Uuid, course_id: Uuid) -> PortResult<bool> {
        let enrolled: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM enrollments WHERE student_id = $1 AND course_id = $2)",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(enrolled)
    }

    async fn create_course(&self, course: NewCourse) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(&format!(
            "INSERT INTO courses (id, title, description, teacher_id) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(course.title)
        .bind(course.description)
        .bind(course.teacher_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn update_course(&self, course_id: Uuid, changes: CourseChanges) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(&format!(
            "UPDATE courses SET title = COALESCE($2, title), \
             description = COALESCE($3, description) WHERE id = $1 RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(course_id)
        .bind(changes.title)
        .bind(changes.description)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Course", course_id))?;
        Ok(record.to_domain())
    }

    async fn delete_course(&self, course_id: Uuid) -> PortResult<Course> {
        let record = sqlx::query_as::<_, CourseRecord>(&format!(
            "DELETE FROM courses WHERE id = $1 RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(course_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Course", course_id))?;
        Ok(record.to_domain())
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment> {
        let course_id = assignment.course_id;
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "INSERT INTO assignments \
             (id, course_id, title, description, rubric, due_date, total_points, status) \
             SELECT $1, id, $3, $4, $5, $6, $7, $8 FROM courses WHERE id = $2 \
             RETURNING {}",
            ASSIGNMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(assignment.title)
        .bind(assignment.description)
        .bind(assignment.rubric)
        .bind(assignment.due_date)
        .bind(assignment.total_points)
        .bind(assignment.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Course", course_id))?;
        record.to_domain()
    }

    async fn update_assignment(
        &self,
        assignment_id: Uuid,
        changes: AssignmentChanges,
    ) -> PortResult<Assignment> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "UPDATE assignments SET title = COALESCE($2, title), \
             description = COALESCE($3, description), rubric = COALESCE($4, rubric), \
             due_date = COALESCE($5, due_date), total_points = COALESCE($6, total_points), \
             status = COALESCE($7, status) WHERE id = $1 RETURNING {}",
            ASSIGNMENT_COLUMNS
        ))
        .bind(assignment_id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.rubric)
        .bind(changes.due_date)
        .bind(changes.total_points)
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Assignment", assignment_id))?;
        record.to_domain()
    }

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "DELETE FROM assignments WHERE id = $1 RETURNING {}",
            ASSIGNMENT_COLUMNS
        ))
        .bind(assignment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Assignment", assignment_id))?;
        record.to_domain()
    }

    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission> {
        let assignment_id = submission.assignment_id;
        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "INSERT INTO submissions (id, assignment_id, student_id, file_path, content, status) \
             SELECT $1, id, $3, $4, $5, 'submitted' FROM assignments WHERE id = $2 \
             RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(assignment_id)
        .bind(submission.student_id)
        .bind(submission.file_path)
        .bind(submission.content)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Assignment", assignment_id))?;
        Ok(record.to_domain())
    }

    async fn grade_submission(&self, submission_id: Uuid, grade: Grade) -> PortResult<Submission> {
        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "UPDATE submissions SET grade = $2, feedback = $3, status = 'graded' \
             WHERE id = $1 RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_id)
        .bind(grade.score)
        .bind(grade.feedback)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Submission", submission_id))?;
        Ok(record.to_domain())
    }

    async fn delete_submission(&self, submission_id: Uuid) -> PortResult<Submission> {
        let record = sqlx::query_as::<_, SubmissionRecord>(&format!(
            "DELETE FROM submissions WHERE id = $1 RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Submission", submission_id))?;
        Ok(record.to_domain())
    }

    async fn enroll(&self, enrollment: Enrollment) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO enrollments (student_id, course_id) VALUES ($1, $2) \
             ON CONFLICT (student_id, course_id) DO NOTHING",
        )
        .bind(enrollment.student_id)
        .bind(enrollment.course_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn unenroll(&self, enrollment: Enrollment) -> PortResult<()> {
        sqlx::query("DELETE FROM enrollments WHERE student_id = $1 AND course_id = $2")
            .bind(enrollment.student_id)
            .bind(enrollment.course_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `ConversationStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConversationStore for PgStore {
    async fn create_thread(&self, owner_id: Uuid, title: &str) -> PortResult<Thread> {
        let record = sqlx::query_as::<_, ThreadRecord>(&format!(
            "INSERT INTO chat_threads (id, owner_id, title) VALUES ($1, $2, $3) RETURNING {}",
            THREAD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_thread(&self, thread_id: Uuid) -> PortResult<Thread> {
        let record = sqlx::query_as::<_, ThreadRecord>(&format!(
            "SELECT {} FROM chat_threads WHERE id = $1",
            THREAD_COLUMNS
        ))
        .bind(thread_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Thread", thread_id))?;
        Ok(record.to_domain())
    }

    async fn list_threads(&self, owner_id: Uuid) -> PortResult<Vec<Thread>> {
        let records = sqlx::query_as::<_, ThreadRecord>(&format!(
            "SELECT {} FROM chat_threads WHERE owner_id = $1 ORDER BY updated_at DESC",
            THREAD_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let threads = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(threads)
    }

    async fn record_thread_activity(
        &self,
        thread_id: Uuid,
        activity: ThreadActivity,
    ) -> PortResult<Thread> {
        let record = sqlx::query_as::<_, ThreadRecord>(&format!(
            "UPDATE chat_threads SET title = COALESCE($2, title), \
             last_message_at = $3, updated_at = $4 WHERE id = $1 RETURNING {}",
            THREAD_COLUMNS
        ))
        .bind(thread_id)
        .bind(activity.title)
        .bind(activity.last_message_at)
        .bind(activity.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Thread", thread_id))?;
        Ok(record.to_domain())
    }

    async fn delete_thread(&self, thread_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM chat_threads WHERE id = $1")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Thread {} not found", thread_id)));
        }
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        request: &str,
    ) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "WITH bumped AS ( \
                 UPDATE chat_threads SET message_count = message_count + 1 \
                 WHERE id = $2 RETURNING id \
             ) \
             INSERT INTO chat_messages (id, thread_id, author_id, request) \
             SELECT $1, id, $3, $4 FROM bumped RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(thread_id)
        .bind(author_id)
        .bind(request)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found_or("Thread", thread_id))?;
        Ok(record.to_domain())
    }

    async fn set_message_response(&self, message_id: Uuid, response: &str) -> PortResult<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            "UPDATE chat_messages SET response = $2, updated_at = NOW() \
             WHERE id = $1 AND response IS NULL RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .bind(response)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match record {
            Some(record) => Ok(record.to_domain()),
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM chat_messages WHERE id = $1)")
                        .bind(message_id)
                        .fetch_one(&self.pool)
                        .await
                        .map_err(unexpected)?;
                if exists {
                    Err(PortError::Conflict(format!(
                        "Message {} already has a response",
                        message_id
                    )))
                } else {
                    Err(PortError::NotFound(format!("Message {} not found", message_id)))
                }
            }
        }
    }

    async fn list_messages(&self, thread_id: Uuid) -> PortResult<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {} FROM chat_messages WHERE thread_id = $1 ORDER BY created_at ASC",
            MESSAGE_COLUMNS
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let messages = records.into_iter().map(|r| r.to_domain()).collect();
        Ok(messages)
    }
}
