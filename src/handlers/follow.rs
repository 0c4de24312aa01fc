use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, page, require_id, PageParams},
    response::{ApiResponse, PaginatedResponse},
    services::follow::{FollowService, FollowUser},
    utils::lenient::opt_parse,
};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

action_table!(pub enum FollowAction in "follows" {
    Follow => "follow" [Post],
    Unfollow => "unfollow" [Post, Delete],
    Check => "check" [Get],
    Followers => "followers" [Get],
    Following => "following" [Get],
});

#[derive(Debug, Default, Deserialize)]
struct FollowTarget {
    #[serde(default, alias = "following_id", deserialize_with = "opt_parse")]
    user_id: Option<i32>,
    #[serde(flatten)]
    page: PageParams,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FollowCheck {
    pub user_id: i32,
    pub is_following: bool,
}

#[utoipa::path(
    method(get, post, delete),
    path = "/api/follows",
    params(
        ("action" = String, Query, description = "follow, unfollow, check, followers, following"),
        ("user_id" = Option<i32>, Query, description = "The other user; followers/following default to the caller"),
    ),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<FollowUser>>),
        (status = 400, description = "Missing id or self-follow", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 404, description = "User or follow edge not found", body = AppError),
        (status = 409, description = "Already following", body = AppError),
    ),
    tag = "follows"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let action = req.resolve::<FollowAction>()?;
    let target: FollowTarget = req.input()?;
    let service = FollowService::new(req.db.clone());

    match action {
        FollowAction::Follow => {
            let follower_id = req.session.require_auth()?;
            let user_id = require_id(target.user_id, "Thiếu ID người dùng cần theo dõi")?;
            service.follow(follower_id, user_id).await?;
            done("Đã theo dõi người dùng")
        }
        FollowAction::Unfollow => {
            let follower_id = req.session.require_auth()?;
            let user_id = require_id(target.user_id, "Thiếu ID người dùng")?;
            service.unfollow(follower_id, user_id).await?;
            done("Đã bỏ theo dõi người dùng")
        }
        FollowAction::Check => {
            let follower_id = req.session.require_auth()?;
            let user_id = require_id(target.user_id, "Thiếu ID người dùng")?;
            let is_following = service.is_following(follower_id, user_id).await?;
            ok(
                FollowCheck {
                    user_id,
                    is_following,
                },
                "Kiểm tra theo dõi thành công",
            )
        }
        FollowAction::Followers | FollowAction::Following => {
            let user_id = target
                .user_id
                .or(req.session.current_user_id())
                .ok_or_else(|| AppError::Validation("Thiếu ID người dùng".to_string()))?;
            let pagination = target.page.pagination();
            if action == FollowAction::Followers {
                let result = service.followers(user_id, pagination).await?;
                page(result, pagination, "Lấy danh sách người theo dõi thành công")
            } else {
                let result = service.following(user_id, pagination).await?;
                page(result, pagination, "Lấy danh sách đang theo dõi thành công")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{resolve, validate_table, Verb};

    #[test]
    fn table_is_valid() {
        validate_table::<FollowAction>().unwrap();
    }

    #[test]
    fn unfollow_accepts_delete() {
        assert_eq!(
            resolve::<FollowAction>(Verb::Delete, Some("unfollow")).unwrap(),
            FollowAction::Unfollow
        );
        assert!(resolve::<FollowAction>(Verb::Delete, Some("follow")).is_err());
    }
}
