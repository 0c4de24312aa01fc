use crate::{
    error::{unique_violation_detail, AppError, AppResult},
    models::{user, User, UserModel, UserRole, UserStatus},
    services::email::EmailService,
    utils::{
        hash_password,
        token::{generate_token, hash_token},
        verify_password,
    },
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    Set,
};

pub const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: &'a str,
    pub role: UserRole,
    pub status: UserStatus,
}

/// Maps a users unique-index violation to a 409 naming the taken field.
pub fn user_conflict(err: DbErr) -> AppError {
    match unique_violation_detail(&err) {
        Some(detail) if detail.contains("email") => {
            AppError::Conflict("Email đã được sử dụng".to_string())
        }
        Some(_) => AppError::Conflict("Tên đăng nhập đã tồn tại".to_string()),
        None => AppError::Database(err),
    }
}

pub struct AuthService {
    db: DatabaseConnection,
}

impl AuthService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn register(&self, new_user: NewUser<'_>) -> AppResult<UserModel> {
        let password_hash = hash_password(new_user.password)?;
        let now = chrono::Utc::now().naive_utc();

        let model = user::ActiveModel {
            username: Set(new_user.username.to_string()),
            email: Set(new_user.email.to_string()),
            password: Set(password_hash),
            full_name: Set(new_user.full_name.to_string()),
            role: Set(new_user.role.to_string()),
            status: Set(new_user.status.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        model.insert(&self.db).await.map_err(user_conflict)
    }

    /// Accepts a username or an email as the identifier.
    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<UserModel> {
        let user = User::find()
            .filter(
                Condition::any()
                    .add(user::Column::Username.eq(identifier))
                    .add(user::Column::Email.eq(identifier)),
            )
            .filter(user::Column::Status.ne(UserStatus::Deleted.as_str()))
            .one(&self.db)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !verify_password(password, &user.password)? {
            return Err(AppError::InvalidCredentials);
        }

        match user.status.parse::<UserStatus>() {
            Ok(UserStatus::Active) => Ok(user),
            Ok(UserStatus::Banned) => Err(AppError::AccountDisabled(
                "Tài khoản của bạn đã bị cấm".to_string(),
            )),
            _ => Err(AppError::AccountDisabled(
                "Tài khoản của bạn đã bị vô hiệu hóa".to_string(),
            )),
        }
    }

    /// Issues a reset token for an active account. Unknown emails are not
    /// revealed to the caller.
    pub async fn request_password_reset(
        &self,
        email: &str,
        email_service: &EmailService,
    ) -> AppResult<()> {
        let Some(user) = User::find()
            .filter(user::Column::Email.eq(email))
            .filter(user::Column::Status.eq(UserStatus::Active.as_str()))
            .one(&self.db)
            .await?
        else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_token()?;
        let now = chrono::Utc::now().naive_utc();
        let user_email = user.email.clone();

        let mut active: user::ActiveModel = user.into();
        active.password_reset_token = Set(Some(hash_token(&token)));
        active.password_reset_expires =
            Set(Some(now + chrono::Duration::hours(RESET_TOKEN_TTL_HOURS)));
        active.updated_at = Set(now);
        active.update(&self.db).await?;

        if let Err(e) = email_service
            .send_password_reset_email(&user_email, &token)
            .await
        {
            tracing::warn!("Failed to send password reset email: {e}");
        }

        Ok(())
    }

    /// Consumes a reset token and returns the affected user id.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AppResult<i32> {
        let invalid =
            || AppError::Validation("Mã đặt lại mật khẩu không hợp lệ hoặc đã hết hạn".to_string());

        let user = User::find()
            .filter(user::Column::PasswordResetToken.eq(hash_token(token)))
            .one(&self.db)
            .await?
            .ok_or_else(invalid)?;

        let now = chrono::Utc::now().naive_utc();
        if !matches!(user.password_reset_expires, Some(expires) if expires > now) {
            return Err(invalid());
        }

        let user_id = user.id;
        let mut active: user::ActiveModel = user.into();
        active.password = Set(hash_password(new_password)?);
        active.password_reset_token = Set(None);
        active.password_reset_expires = Set(None);
        active.updated_at = Set(now);
        active.update(&self.db).await?;

        Ok(user_id)
    }
}
