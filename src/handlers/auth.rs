use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, user::update_profile},
    models::{UserModel, UserRole, UserStatus},
    response::ApiResponse,
    services::{
        auth::{AuthService, NewUser},
        email::EmailService,
        session::SessionData,
    },
    utils::{
        cookie::{build_clear_cookie, build_session_cookie},
        lenient::opt_trimmed,
        password::validate_password,
        strip_tags, validate_payload,
    },
};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

action_table!(pub enum AuthAction in "auth" {
    Register => "register" [Post],
    Login => "login" [Post],
    Logout => "logout" [Post],
    Status => "status" [Get],
    UpdateProfile => "update_profile" [Post, Put],
    ResetPassword => "reset_password" [Post],
});

/// Letters, digits, `_` and `.` only.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset").with_message(Cow::Borrowed(
            "Tên đăng nhập chỉ gồm chữ cái, chữ số, dấu chấm và gạch dưới",
        )))
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    /// 3-50 characters: letters, digits, `_` or `.`
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(
        required(message = "Vui lòng nhập tên đăng nhập"),
        length(min = 3, max = 50, message = "Tên đăng nhập phải từ 3 đến 50 ký tự"),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(
        required(message = "Vui lòng nhập email"),
        email(message = "Email không hợp lệ")
    )]
    pub email: Option<String>,
    /// At least 8 characters with upper case, lower case and a digit
    #[serde(default)]
    #[validate(
        required(message = "Vui lòng nhập mật khẩu"),
        custom(function = "validate_password")
    )]
    pub password: Option<String>,
    /// Defaults to the username
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(max = 100, message = "Họ tên tối đa 100 ký tự"))]
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// With `email` a reset link is requested; with `token` and
/// `new_password` the reset is completed.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(email(message = "Email không hợp lệ"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub token: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_password"))]
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub user: Option<SessionData>,
}

#[utoipa::path(
    method(get, post, put),
    path = "/api/auth",
    params(
        ("action" = String, Query, description = "register, login, logout, status, update_profile, reset_password"),
    ),
    request_body(content = RegisterRequest, description = "Body of the chosen action"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<UserModel>),
        (status = 201, description = "Account registered", body = ApiResponse<UserModel>),
        (status = 400, description = "Validation error or unknown action", body = AppError),
        (status = 401, description = "Wrong credentials or not logged in", body = AppError),
        (status = 403, description = "Account banned or inactive", body = AppError),
        (status = 405, description = "Method not allowed for this action", body = AppError),
        (status = 409, description = "Username or email taken", body = AppError),
    ),
    tag = "auth"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    match req.resolve::<AuthAction>()? {
        AuthAction::Register => register(&req).await,
        AuthAction::Login => login(&req).await,
        AuthAction::Logout => logout(&req).await,
        AuthAction::Status => status(&req),
        AuthAction::UpdateProfile => update_profile(&req).await,
        AuthAction::ResetPassword => reset_password(&req).await,
    }
}

async fn register(req: &ActionRequest) -> AppResult<Response> {
    let input: RegisterRequest = req.input()?;
    validate_payload(&input)?;

    let username = input.username.unwrap_or_default();
    let full_name = input
        .full_name
        .map(|n| strip_tags(&n))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| username.clone());

    let user = AuthService::new(req.db.clone())
        .register(NewUser {
            username: &username,
            email: &input.email.unwrap_or_default(),
            password: &input.password.unwrap_or_default(),
            full_name: &full_name,
            role: UserRole::User,
            status: UserStatus::Active,
        })
        .await?;

    tracing::info!(user_id = user.id, "User registered");
    Ok(ApiResponse::ok(user, "Đăng ký thành công")
        .with_status(StatusCode::CREATED)
        .into_response())
}

/// Replaces any session the client already had.
async fn login(req: &ActionRequest) -> AppResult<Response> {
    let input: LoginRequest = req.input()?;
    let identifier = input.username.or(input.email);
    let (Some(identifier), Some(password)) = (identifier, input.password.filter(|p| !p.is_empty()))
    else {
        return Err(AppError::Validation(
            "Vui lòng nhập tên đăng nhập và mật khẩu".to_string(),
        ));
    };

    let user = AuthService::new(req.db.clone())
        .login(&identifier, &password)
        .await?;

    if let Some(old) = req.session.token() {
        req.store.destroy(old).await?;
    }
    let token = req.store.create(&SessionData::from(&user)).await?;
    let cookie = build_session_cookie(&token, req.store.ttl_seconds());

    tracing::info!(user_id = user.id, "User logged in");
    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(user, "Đăng nhập thành công"),
    )
        .into_response())
}

async fn logout(req: &ActionRequest) -> AppResult<Response> {
    if let Some(token) = req.session.token() {
        req.store.destroy(token).await?;
    }
    Ok((
        [(header::SET_COOKIE, build_clear_cookie())],
        ApiResponse::done("Đăng xuất thành công"),
    )
        .into_response())
}

fn status(req: &ActionRequest) -> AppResult<Response> {
    let status = SessionStatus {
        authenticated: req.session.is_authenticated(),
        user: req.session.data().cloned(),
    };
    let message = if status.authenticated {
        "Đã đăng nhập"
    } else {
        "Chưa đăng nhập"
    };
    ok(status, message)
}

async fn reset_password(req: &ActionRequest) -> AppResult<Response> {
    let input: ResetPasswordRequest = req.input()?;
    validate_payload(&input)?;
    let service = AuthService::new(req.db.clone());

    if let Some(token) = input.token {
        let new_password = input.new_password.ok_or_else(|| {
            AppError::Validation("Vui lòng nhập mật khẩu mới".to_string())
        })?;
        let user_id = service.reset_password(&token, &new_password).await?;
        req.store.destroy_user(user_id).await?;
        tracing::info!(user_id, "Password reset completed");
        return done("Đặt lại mật khẩu thành công, vui lòng đăng nhập lại");
    }

    let email = input
        .email
        .ok_or_else(|| AppError::Validation("Vui lòng nhập email".to_string()))?;
    let email_service = req.extension::<EmailService>()?;
    service.request_password_reset(&email, &email_service).await?;
    done("Nếu email tồn tại trong hệ thống, hướng dẫn đặt lại mật khẩu đã được gửi")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{resolve, validate_table, Verb};
    use serde_json::json;

    #[test]
    fn table_is_valid() {
        validate_table::<AuthAction>().unwrap();
    }

    #[test]
    fn login_is_post_only() {
        assert!(matches!(
            resolve::<AuthAction>(Verb::Get, Some("login")),
            Err(AppError::MethodNotAllowed)
        ));
        assert_eq!(
            resolve::<AuthAction>(Verb::Put, Some("update_profile")).unwrap(),
            AuthAction::UpdateProfile
        );
    }

    #[test]
    fn username_charset() {
        assert!(validate_username("an_nguyen.99").is_ok());
        assert!(validate_username("an nguyen").is_err());
        assert!(validate_username("an<script>").is_err());
    }

    #[test]
    fn register_requires_fields() {
        let input: RegisterRequest = serde_json::from_value(json!({
            "username": "an",
            "email": "an@example.com",
            "password": "Secret123"
        }))
        .unwrap();
        assert_eq!(
            validate_payload(&input).unwrap_err().client_message(),
            "Tên đăng nhập phải từ 3 đến 50 ký tự"
        );

        let input: RegisterRequest = serde_json::from_value(json!({
            "username": "an_nguyen",
            "email": "an@example.com",
            "password": "weakpass"
        }))
        .unwrap();
        assert!(validate_payload(&input).is_err());

        let input: RegisterRequest = serde_json::from_value(json!({
            "username": "an_nguyen",
            "email": "an@example.com",
            "password": "Secret123"
        }))
        .unwrap();
        assert!(validate_payload(&input).is_ok());
    }
}
