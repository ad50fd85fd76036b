use async_trait::async_trait;
use axum::http::HeaderMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Role assigned to a principal at account creation. There is no
/// role-change operation anywhere in the gateway.
///
/// `Unassigned` is the explicit variant for a credential that resolved but
/// carries no recognized role. It is never a silent default that grants
/// access: every local role check denies it, and it short-circuits the
/// course visibility filter to an empty result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Unassigned,
}

impl Role {
    pub fn from_name(name: &str) -> Self {
        match name {
            "admin" => Role::Admin,
            "teacher" => Role::Teacher,
            "student" => Role::Student,
            _ => Role::Unassigned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Unassigned => "unassigned",
        }
    }
}

/// The acting identity resolved from a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
}

/// Extract the bearer token from an `Authorization` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[derive(Debug, Error, Diagnostic)]
pub enum IdentityError {
    #[error("Invalid or expired credential")]
    #[diagnostic(code(coursegate::identity::invalid_credential))]
    InvalidCredential,

    #[error("Identity resolver unreachable: {0}")]
    #[diagnostic(code(coursegate::identity::transport))]
    Transport(String),

    #[error("Malformed identity response: {0}")]
    #[diagnostic(code(coursegate::identity::decode))]
    Decode(String),
}

/// Credential-to-identity resolution. Injected so tests can substitute a
/// static token map for the hosted service.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Principal, IdentityError>;
}

/// Account record returned by the hosted identity service. The service may
/// report several roles; the first recognized one wins.
#[derive(Debug, Deserialize)]
struct AccountResponse {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

pub struct HttpIdentityResolver {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpIdentityResolver {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, IdentityError> {
        let response = self
            .http
            .get(format!("{}/v1/account", self.endpoint))
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(IdentityError::InvalidCredential);
        }
        if !status.is_success() {
            return Err(IdentityError::Transport(format!(
                "identity resolver returned {status}"
            )));
        }

        let account: AccountResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Decode(e.to_string()))?;

        let role = account
            .roles
            .iter()
            .map(|r| Role::from_name(r))
            .find(|r| *r != Role::Unassigned)
            .unwrap_or(Role::Unassigned);

        Ok(Principal {
            id: account.id,
            name: account.name,
            email: account.email,
            role,
        })
    }
}
