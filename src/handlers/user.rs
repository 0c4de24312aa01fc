use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{auth::RegisterRequest, ok, page, require_id, PageParams},
    models::{UserModel, UserRole, UserStatus},
    response::ApiResponse,
    services::{
        action_log,
        auth::{AuthService, NewUser},
        user::{ProfileUpdate, UserFilter, UserService},
    },
    utils::{
        cookie::build_clear_cookie,
        lenient::{opt_parse, opt_trimmed},
        password::validate_password,
        strip_tags, validate_payload,
    },
};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

action_table!(pub enum UserAction in "users" {
    GetProfileDetails => "get_profile_details" [Get],
    UpdateProfile => "update_profile" [Post, Put],
    GetActiveUsers => "get_active_users" [Get],
    DeactivateAccount => "deactivate_account" [Post],
    DeleteAccount => "delete_account" [Post],
    GetAllUsers => "get_all_users" [Get],
    CreateUser => "create_user" [Post],
    BanUser => "ban_user" [Post],
    UnbanUser => "unban_user" [Post],
    ChangeUserRole => "change_user_role" [Post],
    DeleteUserContent => "delete_user_content" [Post],
    DeleteUser => "delete_user" [Delete],
});

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(min = 1, max = 100, message = "Họ tên phải từ 1 đến 100 ký tự"))]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(email(message = "Email không hợp lệ"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(max = 1000, message = "Giới thiệu tối đa 1000 ký tự"))]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(max = 255, message = "Đường dẫn ảnh đại diện quá dài"))]
    pub profile_picture: Option<String>,
    /// Required together with `new_password`
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_password"))]
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserTarget {
    #[serde(default, alias = "id", deserialize_with = "opt_parse")]
    user_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ActiveUsersQuery {
    #[serde(default, deserialize_with = "opt_parse")]
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AllUsersQuery {
    #[serde(flatten)]
    page: PageParams,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    role: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    #[serde(flatten)]
    account: RegisterRequest,
    #[serde(default, deserialize_with = "opt_trimmed")]
    role: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeRoleRequest {
    #[serde(flatten)]
    target: UserTarget,
    #[serde(default, deserialize_with = "opt_trimmed")]
    role: Option<String>,
}

const DEFAULT_ACTIVE_USERS: u64 = 10;

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/users",
    params(
        ("action" = String, Query, description = "get_profile_details, update_profile, get_active_users, deactivate_account, delete_account; admin: get_all_users, create_user, ban_user, unban_user, change_user_role, delete_user_content, delete_user"),
        ("user_id" = Option<i32>, Query, description = "Target user"),
    ),
    request_body(content = UpdateProfileRequest, description = "Body of the chosen action"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<UserModel>),
        (status = 400, description = "Validation error or unknown action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not the owner or not an admin", body = AppError),
        (status = 404, description = "User not found", body = AppError),
        (status = 409, description = "Username or email taken", body = AppError),
    ),
    tag = "users"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    match req.resolve::<UserAction>()? {
        UserAction::GetProfileDetails => profile_details(&req).await,
        UserAction::UpdateProfile => update_profile(&req).await,
        UserAction::GetActiveUsers => active_users(&req).await,
        UserAction::DeactivateAccount | UserAction::DeleteAccount => deactivate(&req).await,
        UserAction::GetAllUsers => all_users(&req).await,
        UserAction::CreateUser => create_user(&req).await,
        UserAction::BanUser => ban_user(&req).await,
        UserAction::UnbanUser => unban_user(&req).await,
        UserAction::ChangeUserRole => change_role(&req).await,
        UserAction::DeleteUserContent => delete_content(&req).await,
        UserAction::DeleteUser => delete_user(&req).await,
    }
}

/// Defaults to the logged-in user when no id is given.
async fn profile_details(req: &ActionRequest) -> AppResult<Response> {
    let target: UserTarget = req.input()?;
    let user_id = match target.user_id.or(req.session.current_user_id()) {
        Some(id) => id,
        None => return Err(AppError::Validation("Thiếu ID người dùng".to_string())),
    };
    let profile = UserService::new(req.db.clone()).profile_details(user_id).await?;
    ok(profile, "Lấy thông tin người dùng thành công")
}

/// Shared by `auth` and `users`; the session copy of the identity is
/// refreshed afterwards.
pub(crate) async fn update_profile(req: &ActionRequest) -> AppResult<Response> {
    let user_id = req.session.require_auth()?;
    let input: UpdateProfileRequest = req.input()?;
    validate_payload(&input)?;

    let user = UserService::new(req.db.clone())
        .update_profile(
            user_id,
            ProfileUpdate {
                full_name: input.full_name.map(|n| strip_tags(&n)),
                email: input.email,
                bio: input.bio.map(|b| strip_tags(&b)),
                profile_picture: input.profile_picture,
                current_password: input.current_password,
                new_password: input.new_password,
            },
        )
        .await?;
    req.store.refresh_user(&user).await?;

    ok(user, "Cập nhật thông tin thành công")
}

async fn active_users(req: &ActionRequest) -> AppResult<Response> {
    let query: ActiveUsersQuery = req.input()?;
    let users = UserService::new(req.db.clone())
        .active_users(query.limit.unwrap_or(DEFAULT_ACTIVE_USERS))
        .await?;
    ok(users, "Lấy danh sách thành viên tích cực thành công")
}

/// Self-service, or an admin acting on `user_id`. Either way the account
/// is only deactivated.
async fn deactivate(req: &ActionRequest) -> AppResult<Response> {
    let actor_id = req.session.require_auth()?;
    let target: UserTarget = req.input()?;
    let user_id = target.user_id.unwrap_or(actor_id);
    if user_id != actor_id {
        req.session.require_admin()?;
    }

    UserService::new(req.db.clone()).deactivate(user_id).await?;
    req.store.destroy_user(user_id).await?;

    let response = ApiResponse::done("Tài khoản đã được vô hiệu hóa");
    if user_id == actor_id {
        Ok(([(header::SET_COOKIE, build_clear_cookie())], response).into_response())
    } else {
        Ok(response.into_response())
    }
}

async fn all_users(req: &ActionRequest) -> AppResult<Response> {
    req.session.require_admin()?;
    let query: AllUsersQuery = req.input()?;
    let pagination = query.page.pagination();
    let filter = UserFilter {
        status: query.status.and_then(|s| s.parse().ok()),
        role: query.role.and_then(|r| r.parse().ok()),
        search: query.search,
    };
    let result = UserService::new(req.db.clone())
        .list_all(filter, pagination)
        .await?;
    page(result, pagination, "Lấy danh sách người dùng thành công")
}

fn not_self(actor_id: i32, user_id: i32, message: &str) -> AppResult<()> {
    if actor_id == user_id {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(())
}

async fn create_user(req: &ActionRequest) -> AppResult<Response> {
    req.session.require_admin()?;
    let input: CreateUserRequest = req.input()?;
    let details = json!({
        "username": input.account.username,
        "email": input.account.email,
        "role": input.role,
    });

    let result = async {
        validate_payload(&input.account)?;
        let role = match input.role.as_deref() {
            None => UserRole::User,
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::Validation("Vai trò không hợp lệ".to_string()))?,
        };
        let status = UserStatus::coerce(input.status.as_deref(), UserStatus::Active);
        let username = input.account.username.clone().unwrap_or_default();
        let full_name = input
            .account
            .full_name
            .as_deref()
            .map(strip_tags)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| username.clone());

        AuthService::new(req.db.clone())
            .register(NewUser {
                username: &username,
                email: input.account.email.as_deref().unwrap_or_default(),
                password: input.account.password.as_deref().unwrap_or_default(),
                full_name: &full_name,
                role,
                status,
            })
            .await
    }
    .await;

    let user = action_log::record(&req.session, "create_user", details, result)?;
    Ok(ApiResponse::ok(user, "Tạo người dùng thành công")
        .with_status(StatusCode::CREATED)
        .into_response())
}

async fn ban_user(req: &ActionRequest) -> AppResult<Response> {
    let actor_id = req.session.require_admin()?;
    let target: UserTarget = req.input()?;
    let details = json!({ "user_id": target.user_id });

    let result = async {
        let user_id = require_id(target.user_id, "Thiếu ID người dùng")?;
        not_self(actor_id, user_id, "Bạn không thể tự cấm chính mình")?;
        let user = UserService::new(req.db.clone())
            .set_status(user_id, UserStatus::Banned)
            .await?;
        req.store.destroy_user(user_id).await?;
        Ok::<_, AppError>(user)
    }
    .await;

    let user = action_log::record(&req.session, "ban_user", details, result)?;
    ok(user, "Đã cấm người dùng")
}

async fn unban_user(req: &ActionRequest) -> AppResult<Response> {
    req.session.require_admin()?;
    let target: UserTarget = req.input()?;
    let details = json!({ "user_id": target.user_id });

    let result = async {
        let user_id = require_id(target.user_id, "Thiếu ID người dùng")?;
        UserService::new(req.db.clone()).unban(user_id).await
    }
    .await;

    let user = action_log::record(&req.session, "unban_user", details, result)?;
    ok(user, "Đã bỏ cấm người dùng")
}

async fn change_role(req: &ActionRequest) -> AppResult<Response> {
    let actor_id = req.session.require_admin()?;
    let input: ChangeRoleRequest = req.input()?;
    let details = json!({ "user_id": input.target.user_id, "role": input.role });

    let result = async {
        let user_id = require_id(input.target.user_id, "Thiếu ID người dùng")?;
        not_self(actor_id, user_id, "Bạn không thể tự thay đổi vai trò của mình")?;
        let role: UserRole = input
            .role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .ok_or_else(|| AppError::Validation("Vai trò không hợp lệ".to_string()))?;
        let user = UserService::new(req.db.clone())
            .change_role(user_id, role)
            .await?;
        req.store.refresh_user(&user).await?;
        Ok::<_, AppError>(user)
    }
    .await;

    let user = action_log::record(&req.session, "change_user_role", details, result)?;
    ok(user, "Đã cập nhật vai trò người dùng")
}

async fn delete_content(req: &ActionRequest) -> AppResult<Response> {
    req.session.require_admin()?;
    let target: UserTarget = req.input()?;
    let details = json!({ "user_id": target.user_id });

    let result = async {
        let user_id = require_id(target.user_id, "Thiếu ID người dùng")?;
        UserService::new(req.db.clone()).delete_content(user_id).await
    }
    .await;

    let deleted = action_log::record(&req.session, "delete_user_content", details, result)?;
    ok(deleted, "Đã xóa toàn bộ nội dung của người dùng")
}

async fn delete_user(req: &ActionRequest) -> AppResult<Response> {
    let actor_id = req.session.require_admin()?;
    let target: UserTarget = req.input()?;
    let details = json!({ "user_id": target.user_id });

    let result = async {
        let user_id = require_id(target.user_id, "Thiếu ID người dùng")?;
        not_self(actor_id, user_id, "Bạn không thể tự xóa tài khoản của mình")?;
        let deleted = UserService::new(req.db.clone()).delete_user(user_id).await?;
        req.store.destroy_user(user_id).await?;
        Ok::<_, AppError>(deleted)
    }
    .await;

    let deleted = action_log::record(&req.session, "delete_user", details, result)?;
    ok(deleted, "Đã xóa người dùng")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{resolve, validate_table, Verb};

    #[test]
    fn table_is_valid() {
        validate_table::<UserAction>().unwrap();
    }

    #[test]
    fn delete_user_requires_delete_method() {
        assert!(matches!(
            resolve::<UserAction>(Verb::Post, Some("delete_user")),
            Err(AppError::MethodNotAllowed)
        ));
        assert_eq!(
            resolve::<UserAction>(Verb::Delete, Some("delete_user")).unwrap(),
            UserAction::DeleteUser
        );
    }

    #[test]
    fn target_accepts_id_alias() {
        let t: UserTarget = serde_json::from_value(json!({"id": "7"})).unwrap();
        assert_eq!(t.user_id, Some(7));
    }

    #[test]
    fn self_targeting_rejected() {
        assert!(not_self(3, 3, "x").is_err());
        assert!(not_self(3, 4, "x").is_ok());
    }

    #[test]
    fn profile_update_validates_password_rule() {
        let input: UpdateProfileRequest =
            serde_json::from_value(json!({"new_password": "short"})).unwrap();
        assert!(validate_payload(&input).is_err());
        let input: UpdateProfileRequest =
            serde_json::from_value(json!({"full_name": "Nguyễn Văn An"})).unwrap();
        assert!(validate_payload(&input).is_ok());
    }
}
