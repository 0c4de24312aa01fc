use crate::response::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Forbidden")]
    Forbidden,

    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Request timed out")]
    Timeout,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Payload too large")]
    PayloadTooLarge,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

impl utoipa::ToSchema for AppError {
    fn name() -> std::borrow::Cow<'static, str> {
        "ErrorResponse".into()
    }
}

impl utoipa::PartialSchema for AppError {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        <ErrorResponse as utoipa::PartialSchema>::schema()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::AccountDisabled(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Client-facing message. Storage and internal failures never expose
    /// their detail here.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                "Đã xảy ra lỗi máy chủ, vui lòng thử lại sau".to_string()
            }
            AppError::Unauthorized => "Vui lòng đăng nhập để tiếp tục".to_string(),
            AppError::InvalidCredentials => {
                "Tên đăng nhập hoặc mật khẩu không chính xác".to_string()
            }
            AppError::Forbidden => "Bạn không có quyền thực hiện thao tác này".to_string(),
            AppError::MethodNotAllowed => "Phương thức không được hỗ trợ".to_string(),
            AppError::Timeout => "Máy chủ đang bận, vui lòng thử lại sau".to_string(),
            AppError::PayloadTooLarge => "Tệp tải lên quá lớn".to_string(),
            AppError::AccountDisabled(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ApiResponse::<()>::error(self.client_message()).with_status(status);

        match &self {
            AppError::Database(e) => tracing::error!("Database error: {:?}", e),
            AppError::Internal(e) => tracing::error!("Internal error: {:?}", e),
            _ => {}
        }

        if status.is_server_error() && crate::config::app::app_config().debug {
            body.error = Some(self.to_string());
        }

        body.into_response()
    }
}

/// Maps a storage unique-constraint violation to a 409 with a readable
/// message. Every other database error passes through unchanged.
pub trait OrConflict<T> {
    fn or_conflict(self, message: &str) -> AppResult<T>;
}

impl<T> OrConflict<T> for Result<T, DbErr> {
    fn or_conflict(self, message: &str) -> AppResult<T> {
        self.map_err(|err| conflict_or_database(err, message))
    }
}

pub fn conflict_or_database(err: DbErr, message: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            tracing::debug!("Unique constraint violated: {}", detail);
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

/// Name of the violated unique constraint, if the error is one.
pub fn unique_violation_detail(err: &DbErr) -> Option<String> {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => Some(detail),
        _ => None,
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_are_distinct_for_auth_failures() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn storage_errors_are_generic_for_clients() {
        let err = AppError::Database(DbErr::Custom("relation \"posts\" does not exist".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.client_message().contains("posts"));
    }

    #[test]
    fn non_unique_db_error_is_not_conflict() {
        let err = conflict_or_database(DbErr::Custom("boom".into()), "dup");
        assert!(matches!(err, AppError::Database(_)));
    }

    #[test]
    fn validation_keeps_message() {
        let err = AppError::Validation("Thiếu tiêu đề".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.client_message(), "Thiếu tiêu đề");
    }
}
