//! crates/classroom_agent_core/src/synced_store.rs
//!
//! A `ClassroomStore` decorator that reports every successful mutation to a
//! `MutationObserver`. Wrapping the real store with it makes each create, update and
//! delete a synchronization trigger without the callers knowing about sync at all.

use crate::domain::{
    Assignment, AssignmentChanges, Course, CourseChanges, Enrollment, Grade, NewAssignment,
    NewCourse, NewSubmission, Submission, User,
};
use crate::ports::{ClassroomStore, MutationObserver, PortResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub struct SyncedClassroomStore {
    inner: Arc<dyn ClassroomStore>,
    observer: Arc<dyn MutationObserver>,
}

impl SyncedClassroomStore {
    pub fn new(inner: Arc<dyn ClassroomStore>, observer: Arc<dyn MutationObserver>) -> Self {
        Self { inner, observer }
    }

    /// Submissions only know their assignment; the course comes from there.
    async fn notify_for_submission(&self, submission: &Submission) {
        match self.inner.get_assignment(submission.assignment_id).await {
            Ok(assignment) => self
                .observer
                .notify_mutation(assignment.course_id, Some(submission.student_id)),
            Err(e) => warn!(
                submission_id = %submission.id,
                error = %e,
                "Could not resolve course of mutated submission; skipping sync."
            ),
        }
    }
}

#[async_trait]
impl ClassroomStore for SyncedClassroomStore {
    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.inner.get_user(user_id).await
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<Course> {
        self.inner.get_course(course_id).await
    }

    async fn get_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        self.inner.get_assignment(assignment_id).await
    }

    async fn list_assignments(&self, course_id: Uuid) -> PortResult<Vec<Assignment>> {
        self.inner.list_assignments(course_id).await
    }

    async fn get_submission(&self, submission_id: Uuid) -> PortResult<Submission> {
        self.inner.get_submission(submission_id).await
    }

    async fn find_submission(
        &self,
        assignment_id: Uuid,
        student_id: Uuid,
    ) -> PortResult<Option<Submission>> {
        self.inner.find_submission(assignment_id, student_id).await
    }

    async fn is_enrolled(&self, student_id: Uuid, course_id: Uuid) -> PortResult<bool> {
        self.inner.is_enrolled(student_id, course_id).await
    }

    async fn create_course(&self, course: NewCourse) -> PortResult<Course> {
        let course = self.inner.create_course(course).await?;
        self.observer.notify_mutation(course.id, None);
        Ok(course)
    }

    async fn update_course(&self, course_id: Uuid, changes: CourseChanges) -> PortResult<Course> {
        let course = self.inner.update_course(course_id, changes).await?;
        self.observer.notify_mutation(course.id, None);
        Ok(course)
    }

    async fn delete_course(&self, course_id: Uuid) -> PortResult<Course> {
        let course = self.inner.delete_course(course_id).await?;
        self.observer.notify_mutation(course.id, None);
        Ok(course)
    }

    async fn create_assignment(&self, assignment: NewAssignment) -> PortResult<Assignment> {
        let assignment = self.inner.create_assignment(assignment).await?;
        self.observer.notify_mutation(assignment.course_id, None);
        Ok(assignment)
    }

    async fn update_assignment(
        &self,
        assignment_id: Uuid,
        changes: AssignmentChanges,
    ) -> PortResult<Assignment> {
        let assignment = self.inner.update_assignment(assignment_id, changes).await?;
        self.observer.notify_mutation(assignment.course_id, None);
        Ok(assignment)
    }

    async fn delete_assignment(&self, assignment_id: Uuid) -> PortResult<Assignment> {
        let assignment = self.inner.delete_assignment(assignment_id).await?;
        self.observer.notify_mutation(assignment.course_id, None);
        Ok(assignment)
    }

    async fn create_submission(&self, submission: NewSubmission) -> PortResult<Submission> {
        let submission = self.inner.create_submission(submission).await?;
        self.notify_for_submission(&submission).await;
        Ok(submission)
    }

    async fn grade_submission(&self, submission_id: Uuid, grade: Grade) -> PortResult<Submission> {
        let submission = self.inner.grade_submission(submission_id, grade).await?;
        self.notify_for_submission(&submission).await;
        Ok(submission)
    }

    async fn delete_submission(&self, submission_id: Uuid) -> PortResult<Submission> {
        let submission = self.inner.delete_submission(submission_id).await?;
        self.notify_for_submission(&submission).await;
        Ok(submission)
    }

    async fn enroll(&self, enrollment: Enrollment) -> PortResult<()> {
        self.inner.enroll(enrollment).await?;
        self.observer
            .notify_mutation(enrollment.course_id, Some(enrollment.student_id));
        Ok(())
    }

    /// A student who just left the course has no snapshot of their own any more, so the
    /// course is re-pushed as a broadcast.
    async fn unenroll(&self, enrollment: Enrollment) -> PortResult<()> {
        self.inner.unenroll(enrollment).await?;
        self.observer.notify_mutation(enrollment.course_id, None);
        Ok(())
    }
}
