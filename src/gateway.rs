//! The authorization gateway: mediates every course, assignment, and
//! submission operation between the caller, the document store, and the
//! policy decision point. Holds no state of its own — every operation
//! re-fetches documents and re-evaluates policy from scratch, so instances
//! can be scaled horizontally with no shared memory.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::errors::GatewayError;
use crate::identity::{Principal, Role};
use crate::models::{Assignment, Course, Submission, ASSIGNMENTS, COURSES, SUBMISSIONS};
use crate::pdp::{PolicyChecker, ResourceDescriptor};
use crate::store::{DocumentStore, Filter, StoreError};

/// Attempt budget for the enrollment read-modify-write loop. Each retry
/// re-reads the course at its current revision before updating again.
const ENROLL_UPDATE_ATTEMPTS: usize = 3;
const ENROLL_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Only an admin may set this to a principal other than itself.
    #[serde(default)]
    pub teacher_id: Option<String>,
}

pub struct Gateway {
    store: Arc<dyn DocumentStore>,
    policy: Arc<dyn PolicyChecker>,
}

impl Gateway {
    pub fn new(store: Arc<dyn DocumentStore>, policy: Arc<dyn PolicyChecker>) -> Self {
        Self { store, policy }
    }

    /// List the courses the principal is allowed to see.
    ///
    /// Admins see everything, teachers see their own courses (filter pushed
    /// to the store), and students see the subset of all courses the PDP
    /// explicitly allows. A PDP error for an individual course excludes
    /// that course (fail-closed, best-effort partial list) and is logged
    /// for audit — it never fails the whole request.
    pub async fn list_courses(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Course>, GatewayError> {
        match principal.role {
            Role::Admin => {
                let docs = self.store.list(COURSES, None).await?;
                docs.iter()
                    .map(|d| Course::from_document(d).map_err(Into::into))
                    .collect()
            }
            Role::Teacher => {
                let filter = Filter::new().eq("teacherId", &principal.id);
                let docs = self.store.list(COURSES, Some(&filter)).await?;
                docs.iter()
                    .map(|d| Course::from_document(d).map_err(Into::into))
                    .collect()
            }
            Role::Student => {
                let docs = self.store.list(COURSES, None).await?;
                let mut visible = Vec::new();
                for doc in &docs {
                    let course = Course::from_document(doc)?;
                    let descriptor = ResourceDescriptor::course(&course);
                    match self.policy.check(&principal.id, "read", &descriptor).await {
                        Ok(true) => visible.push(course),
                        Ok(false) => {
                            tracing::debug!(
                                course_id = %course.id,
                                principal = %principal.id,
                                "course excluded by policy"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(
                                course_id = %course.id,
                                principal = %principal.id,
                                error = %e,
                                "PDP unreachable, excluding course"
                            );
                        }
                    }
                }
                Ok(visible)
            }
            Role::Unassigned => Ok(Vec::new()),
        }
    }

    /// Create a course owned by `teacher_id` (defaulting to the caller).
    /// The PDP create check runs before any write is attempted.
    pub async fn create_course(
        &self,
        principal: &Principal,
        request: CreateCourseRequest,
    ) -> Result<Course, GatewayError> {
        if request.title.trim().is_empty() {
            return Err(GatewayError::Validation("title is required".into()));
        }

        let teacher_id = match request.teacher_id {
            Some(id) if id != principal.id && principal.role != Role::Admin => {
                return Err(GatewayError::Forbidden(
                    "only admins may create a course for another teacher".into(),
                ));
            }
            Some(id) => id,
            None => principal.id.clone(),
        };

        let descriptor = ResourceDescriptor::course_type();
        if !self.policy.check(&principal.id, "create", &descriptor).await? {
            return Err(GatewayError::Forbidden(
                "not allowed to create courses".into(),
            ));
        }

        let course = Course {
            id: String::new(),
            title: request.title,
            description: request.description,
            teacher_id,
            student_ids: Vec::new(),
        };
        let doc = self.store.create(COURSES, course.attributes()).await?;
        let course = Course::from_document(&doc)?;

        self.sync_course(&course).await;
        Ok(course)
    }

    /// Enroll the calling student in a course. Re-enrollment is rejected
    /// with a conflict, not silently ignored. The membership update is
    /// revision-checked and retried a bounded number of times so two racing
    /// enrollments cannot drop or duplicate an entry.
    pub async fn enroll(
        &self,
        principal: &Principal,
        course_id: &str,
    ) -> Result<Course, GatewayError> {
        if principal.role != Role::Student {
            return Err(GatewayError::Forbidden(
                "only students can enroll in courses".into(),
            ));
        }

        let descriptor = ResourceDescriptor::course_id(course_id);
        if !self.policy.check(&principal.id, "enroll", &descriptor).await? {
            return Err(GatewayError::Forbidden(
                "not allowed to enroll in this course".into(),
            ));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let doc = self
                .store
                .get(COURSES, course_id)
                .await?
                .ok_or_else(|| GatewayError::not_found("course", course_id))?;
            let mut course = Course::from_document(&doc)?;

            if course.student_ids.iter().any(|s| s == &principal.id) {
                return Err(GatewayError::Conflict(
                    "already enrolled in this course".into(),
                ));
            }
            course.student_ids.push(principal.id.clone());

            match self
                .store
                .update(
                    COURSES,
                    course_id,
                    json!({ "studentIds": course.student_ids }),
                    Some(doc.revision),
                )
                .await
            {
                Ok(updated) => {
                    let course = Course::from_document(&updated)?;
                    self.sync_course(&course).await;
                    return Ok(course);
                }
                Err(StoreError::Conflict { .. }) if attempt < ENROLL_UPDATE_ATTEMPTS => {
                    tracing::debug!(course_id, attempt, "enrollment revision conflict, retrying");
                    tokio::time::sleep(ENROLL_RETRY_DELAY * attempt as u32).await;
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(GatewayError::Conflict(
                        "course was modified concurrently, retry the enrollment".into(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// List a course's assignments. A single-resource read: PDP deny or
    /// unreachability is a permission error (fail-closed), not an empty
    /// list.
    pub async fn list_assignments(
        &self,
        principal: &Principal,
        course_id: &str,
    ) -> Result<Vec<Assignment>, GatewayError> {
        let descriptor = ResourceDescriptor::course_id(course_id);
        let allowed = match self.policy.check(&principal.id, "read", &descriptor).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(course_id, error = %e, "PDP unreachable, denying course read");
                false
            }
        };
        if !allowed {
            return Err(GatewayError::Forbidden(
                "not allowed to access this course".into(),
            ));
        }

        let filter = Filter::new().eq("courseId", course_id);
        let docs = self.store.list(ASSIGNMENTS, Some(&filter)).await?;
        docs.iter()
            .map(|d| Assignment::from_document(d).map_err(Into::into))
            .collect()
    }

    /// Record a submission for an assignment. The due-date gate is a hard
    /// business rule evaluated after the PDP check, independent of its
    /// result.
    pub async fn submit_assignment(
        &self,
        principal: &Principal,
        assignment_id: &str,
        content: String,
    ) -> Result<Submission, GatewayError> {
        if principal.role != Role::Student {
            return Err(GatewayError::Forbidden(
                "only students can submit assignments".into(),
            ));
        }

        let descriptor = ResourceDescriptor::assignment(assignment_id);
        if !self.policy.check(&principal.id, "submit", &descriptor).await? {
            return Err(GatewayError::Forbidden(
                "not allowed to submit this assignment".into(),
            ));
        }

        let doc = self
            .store
            .get(ASSIGNMENTS, assignment_id)
            .await?
            .ok_or_else(|| GatewayError::not_found("assignment", assignment_id))?;
        let assignment = Assignment::from_document(&doc)?;

        // Submissions must arrive before the due date begins; anything on
        // or after the due date itself is late.
        let now = Utc::now();
        let due_start = assignment.due_date.and_time(NaiveTime::MIN).and_utc();
        if now > due_start {
            return Err(GatewayError::PastDue(assignment.due_date));
        }

        let submission = Submission {
            id: String::new(),
            assignment_id: assignment_id.to_string(),
            student_id: principal.id.clone(),
            content,
            submitted_at: now,
            grade: 0,
            feedback: String::new(),
        };
        let doc = self
            .store
            .create(SUBMISSIONS, submission.attributes())
            .await?;
        Ok(Submission::from_document(&doc)?)
    }

    /// Grade a submission. The role check runs locally before any PDP or
    /// store call; the PDP check targets the submission's assignment.
    pub async fn grade_submission(
        &self,
        principal: &Principal,
        submission_id: &str,
        grade: u8,
        feedback: String,
    ) -> Result<Submission, GatewayError> {
        if principal.role != Role::Teacher && principal.role != Role::Admin {
            return Err(GatewayError::Forbidden(
                "only teachers and admins can grade submissions".into(),
            ));
        }
        if grade == 0 || grade > 100 {
            return Err(GatewayError::Validation(
                "grade must be between 1 and 100".into(),
            ));
        }

        let doc = self
            .store
            .get(SUBMISSIONS, submission_id)
            .await?
            .ok_or_else(|| GatewayError::not_found("submission", submission_id))?;
        let submission = Submission::from_document(&doc)?;

        let descriptor = ResourceDescriptor::assignment(&submission.assignment_id);
        if !self.policy.check(&principal.id, "grade", &descriptor).await? {
            return Err(GatewayError::Forbidden(
                "not allowed to grade this assignment".into(),
            ));
        }

        let updated = self
            .store
            .update(
                SUBMISSIONS,
                submission_id,
                json!({ "grade": grade, "feedback": feedback }),
                Some(doc.revision),
            )
            .await?;
        Ok(Submission::from_document(&updated)?)
    }

    /// Push updated course attributes to the PDP. Best-effort: the store
    /// mutation has already committed, so a failure here only widens the
    /// window in which the PDP evaluates stale attributes. That staleness
    /// window is a documented contract of the gateway, not an accident.
    async fn sync_course(&self, course: &Course) {
        let attributes = json!({
            "teacherId": course.teacher_id,
            "studentIds": course.student_ids,
        });
        if let Err(e) = self
            .policy
            .sync_resource("course", &course.id, attributes)
            .await
        {
            tracing::warn!(course_id = %course.id, error = %e, "PDP resource sync failed");
        }
    }
}
