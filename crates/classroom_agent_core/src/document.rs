//! crates/classroom_agent_core/src/document.rs
//!
//! Renders a `ContextSnapshot` into the plain-text knowledge document that the voice
//! agent indexes.

use crate::domain::{AssignmentContext, ContextSnapshot, StudentInfo};
use std::fmt::Write;

const RULE: &str = "--------------------------------------------------------------------------------";

pub fn render_knowledge_document(snapshot: &ContextSnapshot) -> String {
    let mut doc = String::new();
    let course = &snapshot.course;

    // `write!` into a String cannot fail.
    let _ = writeln!(doc, "COURSE CONTEXT FOR AI TEACHING ASSISTANT");
    let _ = writeln!(doc, "Generated: {}", snapshot.built_at.to_rfc3339());
    let _ = writeln!(doc);

    if let Some(student) = &snapshot.student {
        write_student(&mut doc, student);
    }

    let _ = writeln!(doc, "=== COURSE INFORMATION ===");
    let _ = writeln!(doc, "Course ID: {}", course.id);
    let _ = writeln!(doc, "Course Title: {}", course.title);
    let _ = writeln!(
        doc,
        "Course Description: {}",
        course.description.as_deref().unwrap_or("No description available")
    );
    let _ = writeln!(doc);

    let _ = writeln!(doc, "=== ASSIGNMENTS IN THIS COURSE ===");
    let _ = writeln!(doc, "Total Assignments: {}", course.assignments.len());

    for (index, assignment) in course.assignments.iter().enumerate() {
        write_assignment(&mut doc, index + 1, assignment, snapshot.student.is_some());
    }

    let _ = writeln!(doc);
    let _ = writeln!(doc, "=== SUMMARY FOR AI ASSISTANT ===");
    match &snapshot.student {
        Some(student) => {
            let _ = writeln!(
                doc,
                "You are helping {} with the {} course.",
                student.name, course.title
            );
            let _ = writeln!(doc, "Only discuss {}'s own work and progress.", student.name);
            let _ = writeln!(
                doc,
                "Refer to the grades and feedback above when asked about them, and encourage \
                 completion of missing assignments."
            );
            let _ = writeln!(
                doc,
                "PRIVACY: Never mention or discuss other students' work or performance."
            );
        }
        None => {
            let _ = writeln!(
                doc,
                "This document describes the {} course as a whole. It contains no \
                 student-specific information.",
                course.title
            );
        }
    }
    let _ = writeln!(
        doc,
        "If you don't have specific information, guide the student to contact their instructor."
    );

    doc
}

fn write_student(doc: &mut String, student: &StudentInfo) {
    let _ = writeln!(doc, "=== STUDENT INFORMATION ===");
    let _ = writeln!(doc, "Student Name: {}", student.name);
    let _ = writeln!(doc, "Student ID: {}", student.id);
    let _ = writeln!(
        doc,
        "Student Email: {}",
        student.email.as_deref().unwrap_or("Not on file")
    );
    let _ = writeln!(
        doc,
        "IMPORTANT: This knowledge base is ONLY for {}.",
        student.name
    );
    let _ = writeln!(doc);
}

fn write_assignment(doc: &mut String, number: usize, assignment: &AssignmentContext, per_student: bool) {
    let _ = writeln!(doc);
    let _ = writeln!(doc, "--- ASSIGNMENT {}: {} ---", number, assignment.title);
    let _ = writeln!(doc, "Assignment ID: {}", assignment.id);
    let _ = writeln!(
        doc,
        "Description: {}",
        assignment.description.as_deref().unwrap_or("No description available")
    );
    let due = assignment
        .due_date
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "No due date set".to_string());
    let _ = writeln!(doc, "Due Date: {}", due);
    let _ = writeln!(doc, "Total Points: {}", assignment.total_points);
    let _ = writeln!(doc, "Status: {}", assignment.status.as_str());
    let _ = writeln!(doc);
    let _ = writeln!(doc, "RUBRIC:");
    let _ = writeln!(
        doc,
        "{}",
        assignment.rubric.as_deref().unwrap_or("No rubric available")
    );

    if per_student {
        let _ = writeln!(doc);
        let _ = writeln!(doc, "STUDENT'S SUBMISSION STATUS:");
        match &assignment.submission {
            Some(submission) => {
                let _ = writeln!(doc, "Has Submitted: Yes");
                let _ = writeln!(doc, "Submission Status: {}", submission.status);
                let grade = submission
                    .grade
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "Not yet graded".to_string());
                let _ = writeln!(doc, "Grade: {}", grade);
                let _ = writeln!(
                    doc,
                    "Feedback: {}",
                    submission.feedback.as_deref().unwrap_or("No feedback provided yet")
                );
                let _ = writeln!(doc, "SUBMISSION CONTENT:");
                let _ = writeln!(
                    doc,
                    "{}",
                    submission
                        .content
                        .as_deref()
                        .unwrap_or("No content available (file-based submission)")
                );
            }
            None => {
                let _ = writeln!(doc, "Has Submitted: No");
                let _ = writeln!(
                    doc,
                    "No submission yet - remind the student about the assignment and deadline."
                );
            }
        }
    }

    let _ = writeln!(doc, "{}", RULE);
}
