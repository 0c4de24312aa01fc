use crate::{
    error::{AppError, AppResult, OrConflict},
    models::{follow, user, Follow, User, UserStatus},
    response::Pagination,
    services::sql::{self, Filters},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, Set,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct FollowUser {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
    pub followed_at: chrono::NaiveDateTime,
}

const FOLLOW_USER_SELECT: &str =
    "u.id, u.username, u.full_name, u.profile_picture, f.created_at AS followed_at";

pub struct FollowService {
    db: DatabaseConnection,
}

impl FollowService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn follow(&self, follower_id: i32, following_id: i32) -> AppResult<()> {
        if follower_id == following_id {
            return Err(AppError::Validation(
                "Bạn không thể tự theo dõi chính mình".to_string(),
            ));
        }

        User::find_by_id(following_id)
            .filter(user::Column::Status.ne(UserStatus::Deleted.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Người dùng không tồn tại".to_string()))?;

        follow::ActiveModel {
            follower_id: Set(follower_id),
            following_id: Set(following_id),
            created_at: Set(chrono::Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .or_conflict("Bạn đã theo dõi người dùng này")?;

        Ok(())
    }

    pub async fn unfollow(&self, follower_id: i32, following_id: i32) -> AppResult<()> {
        let result = Follow::delete_many()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound(
                "Bạn chưa theo dõi người dùng này".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn is_following(&self, follower_id: i32, following_id: i32) -> AppResult<bool> {
        let count = Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Users who follow `user_id`, most recent first.
    pub async fn followers(
        &self,
        user_id: i32,
        pagination: Pagination,
    ) -> AppResult<(Vec<FollowUser>, u64)> {
        sql::fetch_page(
            &self.db,
            FOLLOW_USER_SELECT,
            "followers f JOIN users u ON u.id = f.follower_id",
            &Filters::new().bind("f.following_id = ?", user_id),
            "f.created_at DESC, f.id DESC",
            pagination,
        )
        .await
    }

    /// Users `user_id` follows, most recent first.
    pub async fn following(
        &self,
        user_id: i32,
        pagination: Pagination,
    ) -> AppResult<(Vec<FollowUser>, u64)> {
        sql::fetch_page(
            &self.db,
            FOLLOW_USER_SELECT,
            "followers f JOIN users u ON u.id = f.following_id",
            &Filters::new().bind("f.follower_id = ?", user_id),
            "f.created_at DESC, f.id DESC",
            pagination,
        )
        .await
    }
}
