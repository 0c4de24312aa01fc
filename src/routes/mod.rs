//! One `any()` route per resource group under `/api`, the health check,
//! uploads, Swagger UI and the shared layer stack.

use crate::config::rate_limit::{RateLimitConfig, RateLimitGroup, RateLimitRule};
use crate::dispatch::validate_table;
use crate::handlers::{auth, category, comment, dashboard, follow, post, product, review, user};
use crate::middleware::{
    request::{preflight_middleware, timeout_middleware},
    security::security_headers_middleware,
};
use crate::response::ApiResponse;
use crate::services::{dashboard::DashboardService, post::MAX_MEDIA, upload::MAX_FILE_SIZE};
use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::any::Any;
use std::env;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any as AnyOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for a post with its full set of images plus form fields.
const MAX_BODY_BYTES: usize = (MAX_MEDIA + 1) * MAX_FILE_SIZE;

#[derive(OpenApi)]
#[openapi(
    info(title = "Agora API", description = "Community posts, products and reviews"),
    paths(
        health_check,
        auth::handle,
        user::handle,
        follow::handle,
        post::handle,
        post::handle_admin,
        comment::handle,
        comment::handle_admin,
        product::handle,
        product::handle_admin,
        review::handle,
        review::handle_admin,
        category::handle,
        dashboard::handle,
    ),
    components(schemas(
        crate::error::AppError,
        crate::services::session::SessionData,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::ResetPasswordRequest,
        auth::SessionStatus,
        user::UpdateProfileRequest,
        post::CreatePostRequest,
        post::UpdatePostRequest,
        comment::CommentRequest,
        product::ProductRequest,
        review::ReviewRequest,
        category::CategoryRequest,
    )),
    tags(
        (name = "auth", description = "Registration, login, sessions and password reset"),
        (name = "users", description = "Profiles, activity ranking and user administration"),
        (name = "follows", description = "Follow graph"),
        (name = "posts", description = "Posts, search and hot topics"),
        (name = "comments", description = "Comments on posts"),
        (name = "products", description = "Product catalogue"),
        (name = "reviews", description = "Product reviews and rating statistics"),
        (name = "categories", description = "Two-level category tree"),
        (name = "admin", description = "Moderation and dashboard"),
    )
)]
pub struct ApiDoc;

/// Fails when an action table is malformed, before any request is served.
fn validate_tables() -> anyhow::Result<()> {
    validate_table::<auth::AuthAction>()?;
    validate_table::<user::UserAction>()?;
    validate_table::<follow::FollowAction>()?;
    validate_table::<post::PostAction>()?;
    validate_table::<post::PostAdminAction>()?;
    validate_table::<comment::CommentAction>()?;
    validate_table::<comment::CommentAdminAction>()?;
    validate_table::<product::ProductAction>()?;
    validate_table::<product::ProductAdminAction>()?;
    validate_table::<review::ReviewAction>()?;
    validate_table::<review::ReviewAdminAction>()?;
    validate_table::<category::CategoryAction>()?;
    validate_table::<dashboard::DashboardAction>()?;
    Ok(())
}

fn api_routes(limits: &RateLimitConfig) -> anyhow::Result<Router> {
    let auth_group = Router::new().route("/auth", any(auth::handle));

    let content = Router::new()
        .route("/users", any(user::handle))
        .route("/follows", any(follow::handle))
        .route("/posts", any(post::handle))
        .route("/comments", any(comment::handle))
        .route("/products", any(product::handle))
        .route("/reviews", any(review::handle))
        .route("/categories", any(category::handle));

    let admin = Router::new()
        .route("/posts_admin", any(post::handle_admin))
        .route("/comments_admin", any(comment::handle_admin))
        .route("/products_admin", any(product::handle_admin))
        .route("/reviews_admin", any(review::handle_admin))
        .route("/dashboard", any(dashboard::handle));

    let mut api = Router::new();
    for (group, router) in [
        (RateLimitGroup::Auth, auth_group),
        (RateLimitGroup::Content, content),
        (RateLimitGroup::Admin, admin),
    ] {
        api = api.merge(if limits.enabled {
            with_rate_limit(router, limits.rule(group))?
        } else {
            router
        });
    }
    Ok(api)
}

fn with_rate_limit(router: Router, rule: RateLimitRule) -> anyhow::Result<Router> {

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(rule.per_second)
        .burst_size(rule.burst_size)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit rule {:?}", rule))?;

    Ok(router.layer(GovernorLayer::new(governor_conf)))
}

fn build_cors_layer() -> CorsLayer {
    let origins = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.trim() == "*" {
        cors.allow_origin(AnyOrigin)
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        // Session cookies only cross origins that are listed explicitly.
        cors.allow_origin(origins).allow_credentials(true)
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    ApiResponse::<()>::error("Đã xảy ra lỗi máy chủ, vui lòng thử lại sau")
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)
        .into_response()
}

async fn not_found() -> Response {
    ApiResponse::<()>::error("Không tìm thấy đường dẫn yêu cầu")
        .with_status(StatusCode::NOT_FOUND)
        .into_response()
}

/// Builds the full application. Extensions for the database, session
/// store, email and upload config are layered on by the caller.
pub fn create_app(upload_dir: &str, limits: &RateLimitConfig) -> anyhow::Result<Router> {
    validate_tables()?;
    crate::services::dashboard::mark_started();

    let api = Router::new()
        .route("/", get(health_check))
        .nest("/api", api_routes(limits)?)
        .fallback(not_found)
        .layer(middleware::from_fn(security_headers_middleware));

    Ok(Router::new()
        .merge(api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest_service("/uploads", ServeDir::new(upload_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response))
                .layer(build_cors_layer())
                .layer(middleware::from_fn(preflight_middleware))
                .layer(middleware::from_fn(timeout_middleware))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        ))
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is up; `database` reports reachability", body = serde_json::Value)
    ),
    tag = "admin"
)]
async fn health_check(Extension(db): Extension<DatabaseConnection>) -> impl IntoResponse {
    let db_ok = DashboardService::new(db).ping().await;

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "service": "agora",
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_ok,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tables_validate() {
        validate_tables().unwrap();
    }

    #[test]
    fn openapi_lists_every_group() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/auth",
            "/api/users",
            "/api/follows",
            "/api/posts",
            "/api/posts_admin",
            "/api/comments",
            "/api/comments_admin",
            "/api/products",
            "/api/products_admin",
            "/api/reviews",
            "/api/reviews_admin",
            "/api/categories",
            "/api/dashboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
