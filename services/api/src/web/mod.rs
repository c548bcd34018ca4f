pub mod chat;
pub mod extract;
pub mod middleware;
pub mod pdfs;
pub mod rest;
pub mod sessions;
pub mod state;

use crate::config::CorsOrigins;
use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub use middleware::require_token;
use state::AppState;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds the complete API router. Every route is served both at the root and
/// under `/api`, the base path used by the browser client.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    let cors = cors_layer(&state.config.cors_origins);

    // Public routes (no token required)
    let public_routes = Router::new()
        .route("/sessions/create", post(sessions::create_session_handler))
        .route("/sessions/join", post(sessions::join_session_handler))
        .route("/sessions/{code}", get(sessions::session_info_handler));

    // Member routes (X-User-Token required)
    let member_routes = Router::new()
        .route("/pdfs/upload/{code}", post(pdfs::upload_pdf_handler))
        .route("/pdfs/session/{code}", get(pdfs::list_session_pdfs_handler))
        .route("/pdfs/my-assigned/{code}", get(pdfs::my_assigned_handler))
        .route(
            "/pdfs/request-allocation/{code}",
            post(pdfs::request_allocation_handler),
        )
        .route("/pdfs/download/{id}", get(pdfs::download_pdf_handler))
        .route("/chat/{code}/send", post(chat::send_message_handler))
        .route("/chat/{code}/messages", get(chat::list_messages_handler))
        .route(
            "/chat/{code}/pdf/{pdf_id}/messages",
            get(chat::list_pdf_messages_handler),
        )
        .route_layer(axum_middleware::from_fn(require_token));

    let api_routes: Router<Arc<AppState>> = Router::new().merge(public_routes).merge(member_routes);

    Router::new()
        .route("/", get(rest::root_handler))
        .route("/health", get(rest::health_handler))
        .route("/robots.txt", get(rest::robots_handler))
        .merge(api_routes.clone())
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &CorsOrigins) -> CorsLayer {
    let allow_origin = match origins {
        CorsOrigins::Any => AllowOrigin::any(),
        CorsOrigins::List(list) => {
            let parsed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "Ignoring unparsable CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(parsed)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(middleware::USER_TOKEN_HEADER)])
}
