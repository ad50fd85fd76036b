use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::store::{Document, StoreError};

pub const COURSES: &str = "courses";
pub const ASSIGNMENTS: &str = "assignments";
pub const SUBMISSIONS: &str = "submissions";

/// A course. `teacher_id` is set at creation and never reassigned;
/// `student_ids` is duplicate-free (enrollment rejects duplicates).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub teacher_id: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub course_id: String,
    pub due_date: NaiveDate,
}

/// A student's submission. `grade` 0 is the ungraded sentinel; grading
/// moves it into 1..=100 and there is no transition back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(default)]
    pub id: String,
    pub assignment_id: String,
    pub student_id: String,
    #[serde(default)]
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub grade: u8,
    #[serde(default)]
    pub feedback: String,
}

impl Course {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut course: Course = serde_json::from_value(doc.attributes.clone())
            .map_err(|e| StoreError::Decode(format!("course {}: {e}", doc.id)))?;
        course.id = doc.id.clone();
        Ok(course)
    }

    /// Attribute map as stored; the id lives on the document, not in it.
    pub fn attributes(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "teacherId": self.teacher_id,
            "studentIds": self.student_ids,
        })
    }
}

impl Assignment {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut assignment: Assignment = serde_json::from_value(doc.attributes.clone())
            .map_err(|e| StoreError::Decode(format!("assignment {}: {e}", doc.id)))?;
        assignment.id = doc.id.clone();
        Ok(assignment)
    }

    pub fn attributes(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "courseId": self.course_id,
            "dueDate": self.due_date,
        })
    }
}

impl Submission {
    pub fn from_document(doc: &Document) -> Result<Self, StoreError> {
        let mut submission: Submission = serde_json::from_value(doc.attributes.clone())
            .map_err(|e| StoreError::Decode(format!("submission {}: {e}", doc.id)))?;
        submission.id = doc.id.clone();
        Ok(submission)
    }

    pub fn attributes(&self) -> Value {
        json!({
            "assignmentId": self.assignment_id,
            "studentId": self.student_id,
            "content": self.content,
            "submittedAt": self.submitted_at,
            "grade": self.grade,
            "feedback": self.feedback,
        })
    }
}
