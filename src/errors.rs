use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::pdp::PdpError;
use crate::store::StoreError;

/// Operation-level error taxonomy. Every inbound operation recovers into
/// one of these at the handler boundary; the `IntoResponse` impl translates
/// it into the `{success, message}` envelope.
#[derive(Debug, Error, Diagnostic)]
pub enum GatewayError {
    #[error("Missing or invalid credential")]
    #[diagnostic(code(coursegate::unauthenticated))]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    #[diagnostic(code(coursegate::forbidden))]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    #[diagnostic(code(coursegate::validation))]
    Validation(String),

    #[error("{kind} `{id}` not found")]
    #[diagnostic(code(coursegate::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    #[diagnostic(code(coursegate::conflict))]
    Conflict(String),

    #[error("Assignment is past due (due date was {0})")]
    #[diagnostic(code(coursegate::past_due))]
    PastDue(NaiveDate),

    #[error("Upstream service error: {0}")]
    #[diagnostic(
        code(coursegate::upstream),
        help("Check that the document store, identity, and PDP endpoints are reachable")
    )]
    Upstream(String),
}

impl GatewayError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        GatewayError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::PastDue(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IdentityError> for GatewayError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::InvalidCredential => GatewayError::Unauthenticated,
            IdentityError::Transport(msg) => GatewayError::Upstream(msg),
            IdentityError::Decode(msg) => GatewayError::Upstream(msg),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { collection, id } => GatewayError::Conflict(format!(
                "document {collection}/{id} was modified concurrently"
            )),
            StoreError::Transport(msg) => GatewayError::Upstream(msg),
            StoreError::Decode(msg) => GatewayError::Upstream(msg),
        }
    }
}

/// Used where a PDP failure aborts the operation (mutating paths). The
/// filtering paths handle `PdpError` at the call site instead, fail-closed.
impl From<PdpError> for GatewayError {
    fn from(value: PdpError) -> Self {
        GatewayError::Upstream(value.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed with upstream error");
        }
        let body = json!({ "success": false, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
