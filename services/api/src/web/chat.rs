//! services/api/src/web/chat.rs
//!
//! Handlers for the per-PDF discussion threads.

use crate::error::{ApiError, ErrorBody};
use crate::web::extract::{ApiJson, ApiPath, ApiQuery};
use crate::web::rest::MessageView;
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use pdf_exchange_core::{ExchangeError, SessionCode, UserToken};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub message: String,
    /// The thread to post to. Defaults to the sender's assigned PDF.
    pub pdf_id: Option<Uuid>,
}

#[derive(Deserialize, IntoParams)]
pub struct MessagesQuery {
    /// Number of most recent messages to return (default 100, at most 500).
    pub limit: Option<usize>,
    /// The thread to read. Defaults to the caller's assigned PDF.
    pub pdf_id: Option<Uuid>,
}

#[derive(Deserialize, IntoParams)]
pub struct LimitQuery {
    /// Number of most recent messages to return (default 100, at most 500).
    pub limit: Option<usize>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /chat/{code}/send - Post to the thread of the caller's assigned PDF
#[utoipa::path(
    post,
    path = "/chat/{code}/send",
    tag = "chat",
    request_body = SendMessageRequest,
    params(
        ("code" = String, Path, description = "The session code."),
        ("x-user-token" = String, Header, description = "The member's token.")
    ),
    responses(
        (status = 201, description = "Message stored", body = MessageView),
        (status = 400, description = "Empty or overlong message", body = ErrorBody),
        (status = 401, description = "Caller is not assigned to this PDF", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
    Extension(token): Extension<UserToken>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let pdf_id = match req.pdf_id {
        Some(pdf_id) => pdf_id,
        None => state
            .allocations
            .my_assignment(&code, &token)
            .await?
            .map(|(assignment, _)| assignment.pdf_id)
            .ok_or(ExchangeError::Unauthorized)?,
    };

    let message = state
        .messages
        .append(&code, pdf_id, &token, &req.message)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageView::for_reader(message, &token)),
    ))
}

/// GET /chat/{code}/messages - Recent messages of a thread, oldest first
#[utoipa::path(
    get,
    path = "/chat/{code}/messages",
    tag = "chat",
    params(
        ("code" = String, Path, description = "The session code."),
        ("x-user-token" = String, Header, description = "The member's token."),
        MessagesQuery
    ),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageView]),
        (status = 400, description = "Malformed query or limit above 500", body = ErrorBody),
        (status = 401, description = "Caller may not read this thread", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
    Extension(token): Extension<UserToken>,
    ApiQuery(query): ApiQuery<MessagesQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let messages = state
        .messages
        .list_for_reader(&code, &token, query.pdf_id, query.limit)
        .await?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageView::for_reader(m, &token))
            .collect(),
    ))
}

/// GET /chat/{code}/pdf/{pdf_id}/messages - Recent messages of one PDF's thread
#[utoipa::path(
    get,
    path = "/chat/{code}/pdf/{pdf_id}/messages",
    tag = "chat",
    params(
        ("code" = String, Path, description = "The session code."),
        ("pdf_id" = Uuid, Path, description = "The PDF whose thread to read."),
        ("x-user-token" = String, Header, description = "The member's token."),
        LimitQuery
    ),
    responses(
        (status = 200, description = "Messages, oldest first", body = [MessageView]),
        (status = 400, description = "Malformed query or limit above 500", body = ErrorBody),
        (status = 401, description = "Caller may not read this thread", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn list_pdf_messages_handler(
    State(state): State<Arc<AppState>>,
    ApiPath((code, pdf_id)): ApiPath<(String, Uuid)>,
    Extension(token): Extension<UserToken>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let messages = state
        .messages
        .list(&code, pdf_id, &token, query.limit)
        .await?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageView::for_reader(m, &token))
            .collect(),
    ))
}
