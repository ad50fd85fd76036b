//! HTTP surface of the gateway. Handlers resolve the acting principal from
//! the bearer credential, delegate to the gateway, and translate results
//! into the `{success, message, data}` envelope.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::errors::GatewayError;
use crate::gateway::{CreateCourseRequest, Gateway};
use crate::identity::{self, IdentityResolver, Principal};
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub identity: Arc<dyn IdentityResolver>,
    pub gateway: Arc<Gateway>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn success<T: Serialize>(status: StatusCode, message: &str, data: T) -> Response {
    let body = Envelope {
        success: true,
        message: Some(message.to_string()),
        data: Some(data),
    };
    (status, Json(body)).into_response()
}

pub fn router(state: AppState) -> Router {
    // The SPA frontend is served from another origin; mirror the original
    // deployment's permissive CORS.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/courses", get(list_courses).post(create_course))
        .route("/api/courses/{id}/enroll", post(enroll))
        .route("/api/courses/{id}/assignments", get(list_assignments))
        .route("/api/assignments/{id}/submissions", post(submit_assignment))
        .route("/api/submissions/{id}/grade", post(grade_submission))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState) -> miette::Result<()> {
    let addr = state.settings.listen_addr();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "Authorization gateway listening");
    axum::serve(listener, app).await.into_diagnostic()?;
    Ok(())
}

/// Resolve the acting principal or reject before any other processing.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, GatewayError> {
    let token = identity::bearer_token(headers).ok_or(GatewayError::Unauthenticated)?;
    Ok(state.identity.resolve(token).await?)
}

/// Unwrap a buffered JSON body, turning extractor rejections (malformed
/// JSON, missing fields, wrong content type) into the envelope's
/// validation error instead of axum's plain-text default.
fn decode_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(GatewayError::Validation(rejection.body_text())),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn list_courses(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match state.gateway.list_courses(&principal).await {
        Ok(courses) => success(StatusCode::OK, "Courses retrieved successfully", courses),
        Err(e) => e.into_response(),
    }
}

async fn create_course(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateCourseRequest>, JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let request = match decode_body(body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    match state.gateway.create_course(&principal, request).await {
        Ok(course) => success(StatusCode::CREATED, "Course created successfully", course),
        Err(e) => e.into_response(),
    }
}

async fn enroll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match state.gateway.enroll(&principal, &course_id).await {
        Ok(course) => success(StatusCode::OK, "Successfully enrolled in course", course),
        Err(e) => e.into_response(),
    }
}

async fn list_assignments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(course_id): Path<String>,
) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match state.gateway.list_assignments(&principal, &course_id).await {
        Ok(assignments) => success(
            StatusCode::OK,
            "Assignments retrieved successfully",
            assignments,
        ),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    content: String,
}

async fn submit_assignment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(assignment_id): Path<String>,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let body = match decode_body(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    match state
        .gateway
        .submit_assignment(&principal, &assignment_id, body.content)
        .await
    {
        Ok(submission) => success(
            StatusCode::CREATED,
            "Submission created successfully",
            submission,
        ),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct GradeBody {
    grade: u8,
    #[serde(default)]
    feedback: String,
}

async fn grade_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
    body: Result<Json<GradeBody>, JsonRejection>,
) -> Response {
    let principal = match authenticate(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let body = match decode_body(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    match state
        .gateway
        .grade_submission(&principal, &submission_id, body.grade, body.feedback)
        .await
    {
        Ok(submission) => success(
            StatusCode::OK,
            "Submission graded successfully",
            submission,
        ),
        Err(e) => e.into_response(),
    }
}
