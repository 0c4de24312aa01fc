use crate::{config::app::app_config, error::AppError};
use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Bare 200 for `OPTIONS`. Real CORS preflights are answered earlier by the
/// CORS layer.
pub async fn preflight_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

/// Bounds each request by `REQUEST_TIMEOUT_SECS`, answering 503 instead of
/// hanging on a saturated pool.
pub async fn timeout_middleware(request: Request, next: Next) -> Response {
    let limit = app_config().request_timeout;
    let method = request.method().clone();
    let uri = request.uri().clone();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!("Request timed out after {:?}: {} {}", limit, method, uri);
            AppError::Timeout.into_response()
        }
    }
}
