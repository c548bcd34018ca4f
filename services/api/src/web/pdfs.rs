//! services/api/src/web/pdfs.rs
//!
//! Handlers for uploading, allocating and downloading PDFs.

use crate::error::{ApiError, ErrorBody};
use crate::web::extract::{ApiMultipart, ApiPath};
use crate::web::rest::PdfView;
use crate::web::state::AppState;
use axum::{
    body::Body,
    extract::{multipart::MultipartError, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use pdf_exchange_core::{Allocation, SessionCode, UserToken};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Name of the multipart field carrying the PDF.
const FILE_FIELD: &str = "file";

//=========================================================================================
// Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: &'static str,
    pub filename: String,
    pub pdf: PdfView,
}

#[derive(Serialize, ToSchema)]
pub struct MyAssignedResponse {
    pub assigned: bool,
    pub pdf: Option<PdfView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Serialize, ToSchema)]
pub struct AllocationResponse {
    pub message: &'static str,
    /// `null` while no PDF is available yet.
    pub pdf: Option<PdfView>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /pdfs/upload/{code} - Upload the caller's one PDF for this session
///
/// Accepts a multipart/form-data request with a `file` part.
#[utoipa::path(
    post,
    path = "/pdfs/upload/{code}",
    tag = "pdfs",
    request_body(content_type = "multipart/form-data", description = "The PDF to upload."),
    params(
        ("code" = String, Path, description = "The session code."),
        ("x-user-token" = String, Header, description = "The member's token.")
    ),
    responses(
        (status = 201, description = "PDF stored", body = UploadResponse),
        (status = 400, description = "Not a PDF or malformed form", body = ErrorBody),
        (status = 401, description = "Invalid token", body = ErrorBody),
        (status = 409, description = "The member already uploaded a PDF", body = ErrorBody),
        (status = 413, description = "File too large", body = ErrorBody)
    )
)]
pub async fn upload_pdf_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
    Extension(token): Extension<UserToken>,
    ApiMultipart(mut multipart): ApiMultipart,
) -> Result<impl IntoResponse, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let limit = state.config.max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.ok_or_else(|| {
        ApiError::BadRequest("Multipart form must include a `file` field".to_string())
    })?;
    if data.len() > limit {
        return Err(ApiError::PayloadTooLarge(limit));
    }

    let asset = state.uploads.upload(&code, &token, &filename, data).await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "PDF uploaded successfully",
            filename: asset.filename.clone(),
            pdf: PdfView::from(&asset),
        }),
    ))
}

fn multipart_error(e: MultipartError, limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(limit)
    } else {
        ApiError::BadRequest(format!("Failed to read multipart data: {}", e.body_text()))
    }
}

/// GET /pdfs/session/{code} - List the PDFs uploaded to a session
#[utoipa::path(
    get,
    path = "/pdfs/session/{code}",
    tag = "pdfs",
    params(
        ("code" = String, Path, description = "The session code."),
        ("x-user-token" = String, Header, description = "The member's token.")
    ),
    responses(
        (status = 200, description = "PDFs in upload order", body = [PdfView]),
        (status = 401, description = "Invalid token", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn list_session_pdfs_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
    Extension(token): Extension<UserToken>,
) -> Result<Json<Vec<PdfView>>, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let assets = state.uploads.list_by_session(&code, &token).await?;
    Ok(Json(assets.iter().map(PdfView::from).collect()))
}

/// GET /pdfs/my-assigned/{code} - The PDF currently assigned to the caller
#[utoipa::path(
    get,
    path = "/pdfs/my-assigned/{code}",
    tag = "pdfs",
    params(
        ("code" = String, Path, description = "The session code."),
        ("x-user-token" = String, Header, description = "The member's token.")
    ),
    responses(
        (status = 200, description = "Assignment state", body = MyAssignedResponse),
        (status = 401, description = "Invalid token", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn my_assigned_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
    Extension(token): Extension<UserToken>,
) -> Result<Json<MyAssignedResponse>, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let response = match state.allocations.my_assignment(&code, &token).await? {
        Some((_, pdf)) => MyAssignedResponse {
            assigned: true,
            pdf: Some(PdfView::from(&pdf)),
            message: None,
        },
        None => MyAssignedResponse {
            assigned: false,
            pdf: None,
            message: Some("No PDF assigned yet. Request allocation after PDFs are uploaded."),
        },
    };
    Ok(Json(response))
}

/// POST /pdfs/request-allocation/{code} - Ask for a PDF written by someone else
///
/// Idempotent: once a PDF has been assigned, every call returns it.
#[utoipa::path(
    post,
    path = "/pdfs/request-allocation/{code}",
    tag = "pdfs",
    params(
        ("code" = String, Path, description = "The session code."),
        ("x-user-token" = String, Header, description = "The member's token.")
    ),
    responses(
        (status = 200, description = "Allocation result; `pdf` is null when nothing is available yet", body = AllocationResponse),
        (status = 401, description = "Invalid token", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody)
    )
)]
pub async fn request_allocation_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(code): ApiPath<String>,
    Extension(token): Extension<UserToken>,
) -> Result<Json<AllocationResponse>, ApiError> {
    let code = SessionCode::from_user_input(&code);
    let allocation = state.allocations.request_allocation(&code, &token).await?;
    let message = match allocation {
        Allocation::Assigned(_) => "PDF assigned successfully",
        Allocation::AlreadyAssigned(_) => "PDF already assigned",
        Allocation::NoneAvailable => "No PDFs available yet",
    };
    Ok(Json(AllocationResponse {
        message,
        pdf: allocation.pdf().map(PdfView::from),
    }))
}

/// GET /pdfs/download/{id} - Stream a PDF to its uploader or an assigned reader
#[utoipa::path(
    get,
    path = "/pdfs/download/{id}",
    tag = "pdfs",
    params(
        ("id" = Uuid, Path, description = "The PDF id."),
        ("x-user-token" = String, Header, description = "The member's token.")
    ),
    responses(
        (status = 200, description = "The PDF bytes", content_type = "application/pdf"),
        (status = 401, description = "Not allowed to read this PDF", body = ErrorBody),
        (status = 404, description = "PDF not found", body = ErrorBody)
    )
)]
pub async fn download_pdf_handler(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<Uuid>,
    Extension(token): Extension<UserToken>,
) -> Result<impl IntoResponse, ApiError> {
    let (asset, stream) = state.uploads.open(id, &token).await?;
    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (header::CONTENT_LENGTH, asset.size_bytes.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", header_safe(&asset.filename)),
        ),
    ];
    Ok((headers, Body::from_stream(stream)))
}

/// Replaces characters that cannot appear inside a quoted header parameter.
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}
