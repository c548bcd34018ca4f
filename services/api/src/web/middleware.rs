//! services/api/src/web/middleware.rs
//!
//! Token middleware for routes that act on behalf of a session member.

use axum::{extract::Request, middleware::Next, response::Response};
use pdf_exchange_core::UserToken;

use crate::error::ApiError;

/// The header carrying the member's credential.
pub const USER_TOKEN_HEADER: &str = "x-user-token";

/// Middleware that extracts the `X-User-Token` header.
///
/// If present, inserts the `UserToken` into request extensions for handlers to use.
/// Whether the token belongs to the addressed session is checked by the handler,
/// since only it knows which session that is. If missing, returns 401 Unauthorized.
pub async fn require_token(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(USER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(UserToken::from)
        .ok_or(ApiError::MissingToken)?;

    req.extensions_mut().insert(token);
    Ok(next.run(req).await)
}
