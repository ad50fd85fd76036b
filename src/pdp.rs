//! Client-side contract for the external policy decision point. The PDP is
//! the authority for every allow/deny decision; the gateway only adds the
//! local role checks described alongside each operation and never caches a
//! decision across requests.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::models::Course;

/// Ephemeral attribute bundle describing the object a check is about.
/// Built per request, passed to the PDP, never stored.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub resource_type: &'static str,
    pub resource_id: Option<String>,
    pub attributes: Value,
}

impl ResourceDescriptor {
    /// Type-level descriptor, for checks that are not about one instance
    /// (e.g. `create` on `course`).
    pub fn course_type() -> Self {
        Self {
            resource_type: "course",
            resource_id: None,
            attributes: Value::Null,
        }
    }

    pub fn course(course: &Course) -> Self {
        Self {
            resource_type: "course",
            resource_id: Some(course.id.clone()),
            attributes: json!({
                "teacherId": course.teacher_id,
                "studentIds": course.student_ids,
            }),
        }
    }

    pub fn course_id(id: &str) -> Self {
        Self {
            resource_type: "course",
            resource_id: Some(id.to_string()),
            attributes: Value::Null,
        }
    }

    pub fn assignment(id: &str) -> Self {
        Self {
            resource_type: "assignment",
            resource_id: Some(id.to_string()),
            attributes: Value::Null,
        }
    }

    /// Reference string: "type/id", or just "type" for type-level checks.
    pub fn reference(&self) -> String {
        match &self.resource_id {
            Some(id) => format!("{}/{}", self.resource_type, id),
            None => self.resource_type.to_string(),
        }
    }

    /// Fully-qualified permission like "course:enroll".
    pub fn permission(&self, action: &str) -> String {
        format!("{}:{}", self.resource_type, action)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum PdpError {
    #[error("PDP unreachable: {0}")]
    #[diagnostic(
        code(coursegate::pdp::transport),
        help("Unreachable checks are treated as deny on filtering paths and abort mutations")
    )]
    Transport(String),

    #[error("Malformed PDP response: {0}")]
    #[diagnostic(code(coursegate::pdp::decode))]
    Decode(String),
}

/// Policy evaluation seam. Injected into the gateway so tests can
/// substitute an in-process rule table for the hosted PDP.
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    /// Ask whether `principal_id` may perform `action` on the resource.
    /// A transport failure is an `Err`, never an implicit allow.
    async fn check(
        &self,
        principal_id: &str,
        action: &str,
        resource: &ResourceDescriptor,
    ) -> Result<bool, PdpError>;

    /// Push updated resource attributes so subsequent checks see them.
    /// Best-effort: callers log failures and keep their mutation.
    async fn sync_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        attributes: Value,
    ) -> Result<(), PdpError>;
}

// ---------- Wire types ----------

#[derive(Debug, Serialize)]
struct CheckRequest {
    /// e.g. "user/alice"
    principal: String,
    /// e.g. "course:enroll"
    permission: String,
    /// e.g. "course/c-123"
    resource: String,
    /// Resource attributes for ABAC evaluation
    context: Value,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    allowed: bool,
}

#[derive(Debug, Serialize)]
struct SyncRequest {
    resource_type: String,
    resource_id: String,
    attributes: Value,
}

pub struct HttpPolicyClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpPolicyClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, PdpError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PdpError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PolicyChecker for HttpPolicyClient {
    async fn check(
        &self,
        principal_id: &str,
        action: &str,
        resource: &ResourceDescriptor,
    ) -> Result<bool, PdpError> {
        let request = CheckRequest {
            principal: format!("user/{principal_id}"),
            permission: resource.permission(action),
            resource: resource.reference(),
            context: resource.attributes.clone(),
        };
        let response = self
            .http
            .post(format!("{}/v1/check", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| PdpError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PdpError::Transport(format!(
                "check returned {}",
                response.status()
            )));
        }
        let body: CheckResponse = response
            .json()
            .await
            .map_err(|e| PdpError::Decode(e.to_string()))?;
        Ok(body.allowed)
    }

    async fn sync_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        attributes: Value,
    ) -> Result<(), PdpError> {
        let request = SyncRequest {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            attributes,
        };
        let response = self
            .http
            .post(format!("{}/v1/resources", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| PdpError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PdpError::Transport(format!(
                "resource sync returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
