//! crates/classroom_agent_core/src/memory.rs
//!
//! An in-process implementation of the store ports. Used by the test suites and by
//! local runs that have no database.

use crate::domain::{
    Assignment, AssignmentChanges, Course, CourseChanges, Enrollment, Grade, Message,
    NewAssignment, NewCourse, NewSubmission, Submission, Thread, ThreadActivity, User,
};
use crate::ports::{ClassroomStore, ConversationStore, PortError, PortResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    courses: HashMap<Uuid, Course>,
    assignments: HashMap<Uuid, Assignment>,
    submissions: HashMap<Uuid, Submission>,
    enrollments: HashSet<(Uuid, Uuid)>,
    threads: HashMap<Uuid, Thread>,
    messages: HashMap<Uuid, Message>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users are created by the auth system, never by this layer; tests seed them here.
    pub fn insert_user(&self, user: User) {
        self.tables().users.insert(user.id, user);
    }

    /// Marks the given course as the one mirrored into the knowledge base.
    pub fn set_sync_scoped(&self, course_id: Uuid) {
        for course in self.tables().courses.values_mut() {
            course.sync_scoped = course.id == course_id;
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(kind: &str, id: Uuid) -> PortError {
    PortError::NotFound(format!("{} {} not found", kind, id))
}

#[async_trait]
impl ClassroomStore for InMemoryStore {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.tables()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| not_found("User", user_id))
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        self.tables()
            .courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| not_found("Course", course_id))
    }

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        self.tables()
            .assignments
            .get(&assignment_id)
            .cloned()
            .ok_or_else(|| not_found("Assignment", assignment_id))
    }

    async fn list_assignments(&self, course_id: Uuid) -> PortResult<Vec<Assignment>> {
        let mut assignments: Vec<Assignment> = self
            .tables()
            .assignments
            .values()
            .filter(|a| a.course_id == course_id)
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.created_at);
        Ok(assignments)
    }

    async fn get_submission(&self, submission_id: Uuid) -> PortResult<Submission> {
        self.tables()
            .submissions
            .get(&submission_id)
            .cloned()
            .ok_or_else(|| not_found("Submission", submission_id))
    }

    async fn find_submission(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
    ) -> PortResult<Option<Submission>> {
        Ok(self
            .tables()
            .submissions
            .values()
            .find(|s| s.assignment_id == assignment_id && s.student_id == student_id)
            .cloned())
    }

    async fn is_enrolled(&self, student_id: Uuid, course_id: Uuid) -> PortResult<bool> {
        Ok(self.tables().enrollments.contains(&(student_id, course_id)))
    }

    async fn create_course(&self, course: NewCourse) -> PortResult<Course> {
        let course = Course {
            id: Uuid::new_v4(),
            title: course.title,
            description: course.description,
            teacher_id: course.teacher_id,
            sync_scoped: false,
        };
        self.tables().courses.insert(course.id, course.clone());
        Ok(course)
    }

    async fn update_course(&self, course_id: Uuid, changes: CourseChanges) -> PortResult<Course> {
        let mut tables = self.tables();
        let course = tables
            .courses
            .get_mut(&course_id)
            .ok_or_else(|| not_found("Course", course_id))?;
        if let Some(title) = changes.title {
            course.title = title;
        }
        if let Some(description) = changes.description {
            course.description = Some(description);
        }
        Ok(course.clone())
    }

    async fn delete_course(&self, course_id: Uuid) -> PortResult<Course> {
        let mut tables = self.tables();
        let course = tables
            .courses
            .remove(&course_id)
            .ok_or_else(|| not_found("Course", course_id))?;
        let removed: HashSet<Uuid> = tables
            .assignments
            .values()
            .filter(|a| a.course_id == course_id)
            .map(|a| a.id)
            .collect();
        tables.assignments.retain(|id, _| !removed.contains(id));
        tables
            .submissions
            .retain(|_, s| !removed.contains(&s.assignment_id));
        tables.enrollments.retain(|(_, course)| *course != course_id);
        Ok(course)
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment> {
        let mut tables = self.tables();
        if !tables.courses.contains_key(&assignment.course_id) {
            return Err(not_found("Course", assignment.course_id));
        }
        let assignment = Assignment {
            id: Uuid::new_v4(),
            course_id: assignment.course_id,
            title: assignment.title,
            description: assignment.description,
            rubric: assignment.rubric,
            due_date: assignment.due_date,
            total_points: assignment.total_points,
            status: assignment.status,
            created_at: Utc::now(),
        };
        tables.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    async fn update_assignment(
        &self,
        assignment_id: Uuid,
        changes: AssignmentChanges,
    ) -> PortResult<Assignment> {
        let mut tables = self.tables();
        let assignment = tables
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| not_found("Assignment", assignment_id))?;
        if let Some(title) = changes.title {
            assignment.title = title;
        }
        if let Some(description) = changes.description {
            assignment.description = Some(description);
        }
        if let Some(rubric) = changes.rubric {
            assignment.rubric = Some(rubric);
        }
        if let Some(due_date) = changes.due_date {
            assignment.due_date = Some(due_date);
        }
        if let Some(points) = changes.total_points {
            assignment.total_points = points;
        }
        if let Some(status) = changes.status {
            assignment.status = status;
        }
        Ok(assignment.clone())
    }

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        let mut tables = self.tables();
        let assignment = tables
            .assignments
            .remove(&assignment_id)
            .ok_or_else(|| not_found("Assignment", assignment_id))?;
        tables
            .submissions
            .retain(|_, s| s.assignment_id != assignment_id);
        Ok(assignment)
    }

    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission> {
        let mut tables = self.tables();
        if !tables.assignments.contains_key(&submission.assignment_id) {
            return Err(not_found("Assignment", submission.assignment_id));
        }
        let submission = Submission {
            id: Uuid::new_v4(),
            assignment_id: submission.assignment_id,
            student_id: submission.student_id,
            file_path: submission.file_path,
            content: submission.content,
            status: "submitted".to_string(),
            grade: None,
            feedback: None,
        };
        tables.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn grade_submission(&self, submission_id: Uuid, grade: Grade) -> PortResult<Submission> {
        let mut tables = self.tables();
        let submission = tables
            .submissions
            .get_mut(&submission_id)
            .ok_or_else(|| not_found("Submission", submission_id))?;
        submission.grade = Some(grade.score);
        submission.feedback = grade.feedback;
        submission.status = "graded".to_string();
        Ok(submission.clone())
    }

    async fn delete_submission(&self, submission_id: Uuid) -> PortResult<Submission> {
        self.tables()
            .submissions
            .remove(&submission_id)
            .ok_or_else(|| not_found("Submission", submission_id))
    }

    async fn enroll(&self, enrollment: Enrollment) -> PortResult<()> {
        self.tables()
            .enrollments
            .insert((enrollment.student_id, enrollment.course_id));
        Ok(())
    }

    async fn unenroll(&self, enrollment: Enrollment) -> PortResult<()> {
        self.tables()
            .enrollments
            .remove(&(enrollment.student_id, enrollment.course_id));
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_thread(&self, owner_id: Uuid, title: &str) -> PortResult<Thread> {
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
            message_count: 0,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables().threads.insert(thread.id, thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, thread_id: Uuid) -> PortResult<Thread> {
        self.tables()
            .threads
            .get(&thread_id)
            .cloned()
            .ok_or_else(|| not_found("Thread", thread_id))
    }

    async fn list_threads(&self, owner_id: Uuid) -> PortResult<Vec<Thread>> {
        let mut threads: Vec<Thread> = self
            .tables()
            .threads
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        threads.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(threads)
    }

    async fn record_thread_activity(
        &self,
        thread_id: Uuid,
        activity: ThreadActivity,
    ) -> PortResult<Thread> {
        let mut tables = self.tables();
        let thread = tables
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| not_found("Thread", thread_id))?;
        if let Some(title) = activity.title {
            thread.title = title;
        }
        thread.last_message_at = Some(activity.last_message_at);
        thread.updated_at = activity.updated_at;
        Ok(thread.clone())
    }

    async fn delete_thread(&self, thread_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables();
        tables
            .threads
            .remove(&thread_id)
            .ok_or_else(|| not_found("Thread", thread_id))?;
        tables.messages.retain(|_, m| m.thread_id != thread_id);
        Ok(())
    }

    async fn create_message(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        request: &str,
    ) -> PortResult<Message> {
        let mut tables = self.tables();
        let thread = tables
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| not_found("Thread", thread_id))?;
        thread.message_count += 1;
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            thread_id,
            author_id,
            request: request.to_string(),
            response: None,
            created_at: now,
            updated_at: now,
        };
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn set_message_response(&self, message_id: Uuid, response: &str) -> PortResult<Message> {
        let mut tables = self.tables();
        let message = tables
            .messages
            .get_mut(&message_id)
            .ok_or_else(|| not_found("Message", message_id))?;
        if message.response.is_some() {
            return Err(PortError::Conflict(format!(
                "Message {} already has a response",
                message_id
            )));
        }
        message.response = Some(response.to_string());
        message.updated_at = Utc::now();
        Ok(message.clone())
    }

    async fn list_messages(&self, thread_id: Uuid) -> PortResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .tables()
            .messages
            .values()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_response_is_written_exactly_once() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let thread = store.create_thread(owner, "New Chat").await.unwrap();
        let message = store.create_message(thread.id, owner, "hi").await.unwrap();
        assert!(message.response.is_none());

        store.set_message_response(message.id, "hello").await.unwrap();
        let err = store
            .set_message_response(message.id, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleting_a_thread_removes_its_messages() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let thread = store.create_thread(owner, "New Chat").await.unwrap();
        store.create_message(thread.id, owner, "one").await.unwrap();
        store.create_message(thread.id, owner, "two").await.unwrap();

        store.delete_thread(thread.id).await.unwrap();

        assert!(store.list_messages(thread.id).await.unwrap().is_empty());
        assert!(matches!(
            store.get_thread(thread.id).await,
            Err(PortError::NotFound(_))
        ));
    }
}
