use crate::{
    error::{AppError, AppResult},
    models::{
        comment, follow, post, review, session, user, Comment, ContentStatus, Follow, Lifecycle,
        Post, Review, ReviewStatus, Session, User, UserModel, UserRole, UserStatus,
    },
    response::Pagination,
    services::{
        auth::user_conflict,
        sql::{self, Filters},
    },
    utils::{hash_password, verify_password},
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const POST_WEIGHT: i64 = 10;
pub const COMMENT_WEIGHT: i64 = 5;
pub const REVIEW_WEIGHT: i64 = 8;
pub const FOLLOWER_WEIGHT: i64 = 2;

#[derive(Debug, Clone, Serialize, FromQueryResult, ToSchema)]
pub struct UserCounts {
    pub posts: i64,
    pub reviews: i64,
    pub comments: i64,
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub user: UserModel,
    pub counts: UserCounts,
}

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct ActiveUser {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub post_count: i64,
    pub comment_count: i64,
    pub review_count: i64,
    pub follower_count: i64,
    pub activity_score: i64,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
    pub search: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DeletedContent {
    pub posts: u64,
    pub comments: u64,
    pub reviews: u64,
}

const COUNTS_SQL: &str = "SELECT \
    (SELECT COUNT(*) FROM posts WHERE user_id = $1 AND status = 'active') AS posts, \
    (SELECT COUNT(*) FROM reviews WHERE user_id = $1 AND status = 'active') AS reviews, \
    (SELECT COUNT(*) FROM comments WHERE user_id = $1 AND status = 'active') AS comments, \
    (SELECT COUNT(*) FROM followers WHERE following_id = $1) AS followers, \
    (SELECT COUNT(*) FROM followers WHERE follower_id = $1) AS following";

fn not_found() -> AppError {
    AppError::NotFound("Người dùng không tồn tại".to_string())
}

pub struct UserService {
    db: DatabaseConnection,
}

impl UserService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_by_id(&self, user_id: i32) -> AppResult<UserModel> {
        User::find_by_id(user_id)
            .filter(user::Column::Status.ne(UserStatus::Deleted.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn counts(&self, user_id: i32) -> AppResult<UserCounts> {
        sql::fetch_one(&self.db, COUNTS_SQL, vec![user_id.into()])
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Counts query returned no row")))
    }

    pub async fn profile_details(&self, user_id: i32) -> AppResult<UserProfile> {
        let user = self.get_by_id(user_id).await?;
        let counts = self.counts(user_id).await?;
        Ok(UserProfile { user, counts })
    }

    pub async fn update_profile(&self, user_id: i32, input: ProfileUpdate) -> AppResult<UserModel> {
        let existing = self.get_by_id(user_id).await?;

        let new_password_hash = match input.new_password.as_deref() {
            Some(new_password) => {
                let current = input.current_password.as_deref().ok_or_else(|| {
                    AppError::Validation("Vui lòng nhập mật khẩu hiện tại".to_string())
                })?;
                if !verify_password(current, &existing.password)? {
                    return Err(AppError::Validation(
                        "Mật khẩu hiện tại không chính xác".to_string(),
                    ));
                }
                Some(hash_password(new_password)?)
            }
            None => None,
        };

        let mut active: user::ActiveModel = existing.into();
        if let Some(full_name) = input.full_name {
            active.full_name = Set(full_name);
        }
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        if let Some(bio) = input.bio {
            active.bio = Set(Some(bio));
        }
        if let Some(picture) = input.profile_picture {
            active.profile_picture = Set(Some(picture));
        }
        if let Some(hash) = new_password_hash {
            active.password = Set(hash);
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());

        active.update(&self.db).await.map_err(user_conflict)
    }

    /// Only active accounts can be deactivated; a second call is a 404.
    pub async fn deactivate(&self, user_id: i32) -> AppResult<()> {
        let result = User::update_many()
            .col_expr(user::Column::Status, Expr::value(UserStatus::Inactive.as_str()))
            .col_expr(
                user::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::Status.eq(UserStatus::Active.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(
                "Người dùng không tồn tại hoặc đã bị vô hiệu hóa".to_string(),
            ));
        }
        Ok(())
    }

    /// Active users ranked by activity score, ties by post count.
    pub async fn active_users(&self, limit: u64) -> AppResult<Vec<ActiveUser>> {
        let score = format!(
            "(s.post_count * {POST_WEIGHT} + s.comment_count * {COMMENT_WEIGHT} \
             + s.review_count * {REVIEW_WEIGHT} + s.follower_count * {FOLLOWER_WEIGHT})"
        );
        let sql = format!(
            "SELECT u.id, u.username, u.full_name, u.profile_picture, \
                s.post_count, s.comment_count, s.review_count, s.follower_count, \
                {score} AS activity_score \
             FROM users u \
             CROSS JOIN LATERAL ( \
                SELECT \
                  (SELECT COUNT(*) FROM posts p WHERE p.user_id = u.id AND p.status = 'active') AS post_count, \
                  (SELECT COUNT(*) FROM comments c WHERE c.user_id = u.id AND c.status = 'active') AS comment_count, \
                  (SELECT COUNT(*) FROM reviews r WHERE r.user_id = u.id AND r.status = 'active') AS review_count, \
                  (SELECT COUNT(*) FROM followers f WHERE f.following_id = u.id) AS follower_count \
             ) s \
             WHERE u.status = 'active' AND {score} > 0 \
             ORDER BY activity_score DESC, s.post_count DESC, u.id ASC \
             LIMIT $1"
        );
        sql::fetch_all(&self.db, &sql, vec![sql::to_i64(limit).into()]).await
    }

    pub async fn list_all(
        &self,
        filter: UserFilter,
        pagination: Pagination,
    ) -> AppResult<(Vec<UserModel>, u64)> {
        let mut filters = Filters::new()
            .bind_opt("u.status = ?", filter.status.map(|s| s.as_str()))
            .bind_opt("u.role = ?", filter.role.map(|r| r.as_str()));
        if let Some(term) = filter.search {
            let pattern = sql::like_pattern(&term);
            filters = filters.bind_all(
                "(u.username ILIKE ? OR u.email ILIKE ? OR u.full_name ILIKE ?)",
                vec![pattern.clone().into(), pattern.clone().into(), pattern.into()],
            );
        }

        sql::fetch_page(
            &self.db,
            "u.*",
            "users u",
            &filters,
            "u.created_at DESC, u.id DESC",
            pagination,
        )
        .await
    }

    pub async fn set_status(&self, user_id: i32, status: UserStatus) -> AppResult<UserModel> {
        let existing = self.get_by_id(user_id).await?;
        let current = UserStatus::coerce(Some(&existing.status), UserStatus::Active);
        if !current.can_become(status) {
            return Err(AppError::Validation(
                "Không thể thay đổi trạng thái của tài khoản đã xóa".to_string(),
            ));
        }

        let mut active: user::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        Ok(active.update(&self.db).await?)
    }

    pub async fn unban(&self, user_id: i32) -> AppResult<UserModel> {
        let existing = self.get_by_id(user_id).await?;
        if existing.status != UserStatus::Banned.as_str() {
            return Err(AppError::Validation("Người dùng không bị cấm".to_string()));
        }
        self.set_status(user_id, UserStatus::Active).await
    }

    pub async fn change_role(&self, user_id: i32, role: UserRole) -> AppResult<UserModel> {
        let existing = self.get_by_id(user_id).await?;
        let mut active: user::ActiveModel = existing.into();
        active.role = Set(role.to_string());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        Ok(active.update(&self.db).await?)
    }

    /// Marks every post, comment and review of the user deleted.
    pub async fn delete_content(&self, user_id: i32) -> AppResult<DeletedContent> {
        self.get_by_id(user_id).await?;
        let txn = self.db.begin().await?;
        let result = mark_content_deleted(&txn, user_id).await;
        sql::finish(txn, result).await
    }

    /// Soft-deletes the user's content, drops follow edges and sessions,
    /// then removes the row, all in one transaction.
    pub async fn delete_user(&self, user_id: i32) -> AppResult<DeletedContent> {
        self.get_by_id(user_id).await?;
        let txn = self.db.begin().await?;
        let result = async {
            let deleted = mark_content_deleted(&txn, user_id).await?;

            Follow::delete_many()
                .filter(
                    Condition::any()
                        .add(follow::Column::FollowerId.eq(user_id))
                        .add(follow::Column::FollowingId.eq(user_id)),
                )
                .exec(&txn)
                .await?;
            Session::delete_many()
                .filter(session::Column::UserId.eq(user_id))
                .exec(&txn)
                .await?;

            let removed = User::delete_by_id(user_id).exec(&txn).await?;
            if removed.rows_affected == 0 {
                return Err(not_found());
            }
            Ok::<_, AppError>(deleted)
        }
        .await;
        sql::finish(txn, result).await
    }
}

async fn mark_content_deleted<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> AppResult<DeletedContent> {
    let now = chrono::Utc::now().naive_utc();
    let deleted = ContentStatus::Deleted.as_str();

    let posts = Post::update_many()
        .col_expr(post::Column::Status, Expr::value(deleted))
        .col_expr(post::Column::UpdatedAt, Expr::value(now))
        .filter(post::Column::UserId.eq(user_id))
        .filter(post::Column::Status.ne(deleted))
        .exec(conn)
        .await?;
    let comments = Comment::update_many()
        .col_expr(comment::Column::Status, Expr::value(deleted))
        .col_expr(comment::Column::UpdatedAt, Expr::value(now))
        .filter(comment::Column::UserId.eq(user_id))
        .filter(comment::Column::Status.ne(deleted))
        .exec(conn)
        .await?;
    let reviews = Review::update_many()
        .col_expr(review::Column::Status, Expr::value(ReviewStatus::Deleted.as_str()))
        .col_expr(review::Column::UpdatedAt, Expr::value(now))
        .filter(review::Column::UserId.eq(user_id))
        .filter(review::Column::Status.ne(ReviewStatus::Deleted.as_str()))
        .exec(conn)
        .await?;

    Ok(DeletedContent {
        posts: posts.rows_affected,
        comments: comments.rows_affected,
        reviews: reviews.rows_affected,
    })
}

