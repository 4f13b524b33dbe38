//! HTTP middleware (CORS, 404 handler)

use axum::extract::Request;
use axum::http::{Method, header};
use axum::response::IntoResponse;
use tower_http::cors::{Any, CorsLayer};

use super::types::ApiError;

/// Create CORS layer. Identity travels in the Authorization header, so no
/// credentials are shared with the browser.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
        ])
}

/// Handle 404 Not Found with logging
pub async fn handle_404(req: Request) -> impl IntoResponse {
    tracing::debug!(method = %req.method(), uri = %req.uri(), "[404]");
    ApiError::not_found("ROUTE_NOT_FOUND", format!("No route for {}", req.uri().path()))
}
