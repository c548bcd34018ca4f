//! services/api/src/web/sessions.rs
//!
//! Handlers for creating, joining and inspecting sessions.

use crate::error::{ApiError, ErrorBody};
use crate::web::extract::{ApiJson, ApiPath};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use pdf_exchange_core::{Session, SessionCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct JoinSessionRequest {
    pub session_code: String,
}

#[derive(Serialize, ToSchema)]
pub struct JoinSessionResponse {
    pub session_code: String,
    /// The credential for every later call. Send it as `X-User-Token`.
    pub user_token: String,
    /// Set when the server allocated a PDF right away.
    pub assigned_pdf_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct SessionView {
    pub session_code: String,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            session_code: session.code.to_string(),
            created_at: session.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionInfoResponse {
    pub session: SessionView,
    pub active_users: u64,
    pub total_pdfs: u64,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /sessions/create - Start a new session
#[utoipa::path(
    post,
    path = "/sessions/create",
    tag = "sessions",
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 503, description = "No free session code could be found", body = ErrorBody)
    )
)]
pub async fn create_session_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.create_session().await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_code: session.code.to_string(),
            created_at: session.created_at,
        }),
    ))
}

/// POST /sessions/join - Join a session and receive a fresh user token
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Joined", body = JoinSessionResponse),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn join_session_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<JoinSessionRequest>,
) -> Result<Json<JoinSessionResponse>, ApiError> {
    let code = SessionCode::from_user_input(&req.session_code);
    let membership = state.tokens.join(&code).await?;

    // A failed early allocation must not fail the join; the client asks again.
    let assigned_pdf_id = if state.config.allocate_on_join {
        match state
            .allocations
            .request_allocation(&code, &membership.user_token)
            .await
        {
            Ok(allocation) => allocation.pdf().map(|pdf| pdf.id),
            Err(e) => {
                warn!(code = %code, "Allocation on join failed: {e}");
                None
            }
        }
    } else {
        None
    };

    Ok(Json(JoinSessionResponse {
        session_code: membership.session_code.to_string(),
        user_token: membership.user_token.as_str().to_string(),
        assigned_pdf_id,
    }))
}

/// GET /sessions/{code} - Session overview
#[utoipa::path(
    get,
    path = "/sessions/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "The session code.")),
    responses(
        (status = 200, description = "Session found", body = SessionInfoResponse),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn session_info_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let (session, stats) = state.sessions.overview(&code).await?;
    Ok(Json(SessionInfoResponse {
        session: session.into(),
        active_users: stats.members,
        total_pdfs: stats.uploads,
    }))
}
