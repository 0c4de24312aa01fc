use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, page, require_id, IdParam, PageParams},
    models::ContentStatus,
    response::{ApiResponse, PaginatedResponse},
    services::{
        action_log,
        comment::{BulkCommentAction, CommentFilter, CommentService, CommentView},
    },
    utils::{
        lenient::{opt_id_list, opt_parse, opt_trimmed},
        strip_tags, validate_payload,
    },
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

action_table!(pub enum CommentAction in "comments" {
    List => "list" [Get],
    ListByUser => "list_by_user" [Get],
    Create => "create" [Post],
    Update => "update" [Put, Post],
    Delete => "delete" [Delete],
});

action_table!(pub enum CommentAdminAction in "comments_admin" {
    List => "list" [Get],
    UpdateStatus => "update_status" [Post, Put],
    BulkUpdate => "bulk_update" [Post],
});

const MAX_COMMENT_LEN: u64 = 5000;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CommentRequest {
    /// Required for create
    #[serde(default, deserialize_with = "opt_parse")]
    pub post_id: Option<i32>,
    /// Required for update and delete
    #[serde(default, alias = "comment_id", deserialize_with = "opt_parse")]
    pub id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(
        required(message = "Vui lòng nhập nội dung bình luận"),
        length(max = 5000, message = "Bình luận tối đa 5000 ký tự")
    )]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResult {
    pub affected: u64,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(flatten)]
    page: PageParams,
    #[serde(default, deserialize_with = "opt_parse")]
    post_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_parse")]
    user_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
    #[serde(default, alias = "q", deserialize_with = "opt_trimmed")]
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(default, alias = "comment_id", deserialize_with = "opt_parse")]
    id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    #[serde(default, alias = "comment_ids", deserialize_with = "opt_id_list")]
    ids: Option<Vec<i32>>,
    #[serde(default, alias = "bulk_action", deserialize_with = "opt_trimmed")]
    action: Option<String>,
}

fn comment_id(id: Option<i32>) -> AppResult<i32> {
    require_id(id, "Thiếu ID bình luận")
}

/// Tags stripped; a comment that was only markup is rejected.
fn clean_content(input: &CommentRequest) -> AppResult<String> {
    validate_payload(input)?;
    let content = strip_tags(input.content.as_deref().unwrap_or_default());
    if content.is_empty() {
        return Err(AppError::Validation("Vui lòng nhập nội dung bình luận".to_string()));
    }
    Ok(content)
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/comments",
    params(
        ("action" = String, Query, description = "list, list_by_user, create, update, delete"),
        ("post_id" = Option<i32>, Query, description = "Post whose comments are listed"),
        PageParams,
    ),
    request_body(content = CommentRequest, description = "JSON or form"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<CommentView>>),
        (status = 201, description = "Comment created", body = ApiResponse<CommentView>),
        (status = 400, description = "Validation error or unknown action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not the author", body = AppError),
        (status = 404, description = "Post or comment not found", body = AppError),
    ),
    tag = "comments"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let service = CommentService::new(req.db.clone());

    match req.resolve::<CommentAction>()? {
        CommentAction::List => {
            let query: ListQuery = req.input()?;
            let post_id = require_id(query.post_id, "Thiếu ID bài viết")?;
            let pagination = query.page.pagination();
            let result = service
                .list_for_post(post_id, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy danh sách bình luận thành công")
        }
        CommentAction::ListByUser => {
            let query: ListQuery = req.input()?;
            let user_id = query
                .user_id
                .or(req.session.current_user_id())
                .ok_or_else(|| AppError::Validation("Thiếu ID người dùng".to_string()))?;
            let pagination = query.page.pagination();
            let result = service
                .list_by_user(user_id, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy bình luận của người dùng thành công")
        }
        CommentAction::Create => {
            let user_id = req.session.require_auth()?;
            let input: CommentRequest = req.input()?;
            let post_id = require_id(input.post_id, "Thiếu ID bài viết")?;
            let content = clean_content(&input)?;
            let comment = service.create(post_id, user_id, content).await?;
            tracing::info!(comment_id = comment.id, post_id, user_id, "Comment created");
            Ok(ApiResponse::ok(comment, "Bình luận thành công")
                .with_status(StatusCode::CREATED)
                .into_response())
        }
        CommentAction::Update => {
            req.session.require_auth()?;
            let input: CommentRequest = req.input()?;
            let existing = service.find_editable(comment_id(input.id)?).await?;
            req.session.require_owner_or_admin(existing.user_id)?;
            let content = clean_content(&input)?;
            let comment = service.update(existing, content).await?;
            ok(comment, "Cập nhật bình luận thành công")
        }
        CommentAction::Delete => {
            req.session.require_auth()?;
            let IdParam { id } = req.input()?;
            let existing = service.find_editable(comment_id(id)?).await?;
            req.session.require_owner_or_admin(existing.user_id)?;
            service.soft_delete(existing.id).await?;
            done("Xóa bình luận thành công")
        }
    }
}

#[utoipa::path(
    method(get, post, put),
    path = "/api/comments_admin",
    params(
        ("action" = String, Query, description = "list, update_status, bulk_update"),
        PageParams,
    ),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<CommentView>>),
        (status = 400, description = "Invalid status, ids or bulk action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not an admin", body = AppError),
        (status = 404, description = "Comment not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn handle_admin(req: ActionRequest) -> AppResult<Response> {
    let action = req.resolve::<CommentAdminAction>()?;
    req.session.require_admin()?;
    let service = CommentService::new(req.db.clone());

    match action {
        CommentAdminAction::List => {
            let query: ListQuery = req.input()?;
            let pagination = query.page.pagination();
            let filter = CommentFilter {
                post_id: query.post_id,
                user_id: query.user_id,
                status: query.status.and_then(|s| s.parse().ok()),
                search: query.search,
            };
            let result = service
                .admin_list(filter, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy danh sách bình luận thành công")
        }
        CommentAdminAction::UpdateStatus => {
            let input: StatusRequest = req.input()?;
            let details = json!({ "comment_id": input.id, "status": input.status });
            let result = async {
                let id = comment_id(input.id)?;
                let status: ContentStatus = input
                    .status
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AppError::Validation("Trạng thái không hợp lệ".to_string()))?;
                service.update_status(id, status).await
            }
            .await;
            let comment =
                action_log::record(&req.session, "update_comment_status", details, result)?;
            ok(comment, "Cập nhật trạng thái bình luận thành công")
        }
        CommentAdminAction::BulkUpdate => {
            let input: BulkRequest = req.input()?;
            let details = json!({ "comment_ids": input.ids, "action": input.action });
            let result = async {
                let bulk = input
                    .action
                    .as_deref()
                    .and_then(BulkCommentAction::parse)
                    .ok_or_else(|| {
                        AppError::Validation("Hành động hàng loạt không hợp lệ".to_string())
                    })?;
                service
                    .bulk_update(input.ids.as_deref().unwrap_or_default(), bulk)
                    .await
            }
            .await;
            let affected =
                action_log::record(&req.session, "bulk_update_comments", details, result)?;
            ok(BulkResult { affected }, "Cập nhật hàng loạt thành công")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{resolve, validate_table, Verb};

    #[test]
    fn tables_are_valid() {
        validate_table::<CommentAction>().unwrap();
        validate_table::<CommentAdminAction>().unwrap();
    }

    #[test]
    fn comment_content_is_required_and_capped() {
        let input: CommentRequest = serde_json::from_value(json!({"post_id": 1})).unwrap();
        assert_eq!(
            clean_content(&input).unwrap_err().client_message(),
            "Vui lòng nhập nội dung bình luận"
        );

        let input: CommentRequest =
            serde_json::from_value(json!({"post_id": 1, "content": "<b></b>"})).unwrap();
        assert!(clean_content(&input).is_err());

        let long = "x".repeat(MAX_COMMENT_LEN as usize + 1);
        let input: CommentRequest =
            serde_json::from_value(json!({"post_id": 1, "content": long})).unwrap();
        assert!(clean_content(&input).is_err());

        let input: CommentRequest =
            serde_json::from_value(json!({"post_id": "1", "content": " <i>hay</i> "})).unwrap();
        assert_eq!(clean_content(&input).unwrap(), "hay");
        assert_eq!(input.post_id, Some(1));
    }

    #[test]
    fn hard_delete_only_through_bulk() {
        assert!(matches!(
            resolve::<CommentAdminAction>(Verb::Delete, Some("bulk_update")),
            Err(AppError::MethodNotAllowed)
        ));
        let input: BulkRequest =
            serde_json::from_value(json!({"comment_ids": "4,5", "action": "hard_delete"}))
                .unwrap();
        assert_eq!(input.ids, Some(vec![4, 5]));
        assert_eq!(
            input.action.as_deref().and_then(BulkCommentAction::parse),
            Some(BulkCommentAction::HardDelete)
        );
    }
}
