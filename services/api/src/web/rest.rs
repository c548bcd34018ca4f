//! services/api/src/web/rest.rs
//!
//! Contains the service-level REST handlers, the response views shared by the
//! session, PDF and chat endpoints, and the master definition for the OpenAPI
//! specification.

use crate::error::ErrorBody;
use crate::web::{chat, pdfs, sessions};
use axum::{http::header, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use pdf_exchange_core::{Message, PdfAsset, UserToken};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Anonymous PDF Exchange",
        description = "Session-based PDF exchange with anonymous discussion threads."
    ),
    paths(
        health_handler,
        sessions::create_session_handler,
        sessions::join_session_handler,
        sessions::session_info_handler,
        pdfs::upload_pdf_handler,
        pdfs::list_session_pdfs_handler,
        pdfs::my_assigned_handler,
        pdfs::request_allocation_handler,
        pdfs::download_pdf_handler,
        chat::send_message_handler,
        chat::list_messages_handler,
        chat::list_pdf_messages_handler,
    ),
    components(
        schemas(
            ErrorBody,
            HealthResponse,
            PdfView,
            MessageView,
            sessions::CreateSessionResponse,
            sessions::JoinSessionRequest,
            sessions::JoinSessionResponse,
            sessions::SessionView,
            sessions::SessionInfoResponse,
            pdfs::UploadResponse,
            pdfs::MyAssignedResponse,
            pdfs::AllocationResponse,
            chat::SendMessageRequest,
        )
    ),
    tags(
        (name = "sessions", description = "Create and join sessions."),
        (name = "pdfs", description = "Upload, allocate and download PDFs."),
        (name = "chat", description = "Per-PDF discussion threads.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Response Views
//=========================================================================================

/// Public metadata of an uploaded PDF. The uploader stays anonymous.
#[derive(Debug, Serialize, ToSchema)]
pub struct PdfView {
    pub id: Uuid,
    pub session_code: String,
    pub filename: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&PdfAsset> for PdfView {
    fn from(asset: &PdfAsset) -> Self {
        Self {
            id: asset.id,
            session_code: asset.session_code.to_string(),
            filename: asset.filename.clone(),
            size_bytes: asset.size_bytes,
            uploaded_at: asset.uploaded_at,
        }
    }
}

/// A chat message as seen by one reader.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageView {
    pub id: i64,
    pub session_code: String,
    pub pdf_id: Uuid,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// Whether the reader wrote this message.
    pub is_mine: bool,
}

impl MessageView {
    pub fn for_reader(message: Message, reader: &UserToken) -> Self {
        Self {
            is_mine: message.sender_token == *reader,
            id: message.id,
            session_code: message.session_code.to_string(),
            pdf_id: message.pdf_id,
            message: message.text,
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
}

//=========================================================================================
// Service Handlers
//=========================================================================================

pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Welcome to the Anonymous PDF Exchange API",
        "docs": "/swagger-ui",
        "openapi": "/api-docs/openapi.json",
    }))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /\n";

pub async fn robots_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], ROBOTS_TXT)
}
