use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, page, require_id, IdParam, PageParams},
    models::ReviewStatus,
    response::{ApiResponse, PaginatedResponse},
    services::{
        action_log,
        review::{ReviewFilter, ReviewService, ReviewStats, ReviewUpdate, ReviewView},
    },
    utils::{
        lenient::{opt_list, opt_parse, opt_strict, opt_trimmed},
        strip_tags,
    },
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

action_table!(pub enum ReviewAction in "reviews" {
    List => "list" [Get],
    Get => "get" [Get],
    ListByUser => "list_by_user" [Get],
    ListFeatured => "list_featured" [Get],
    GetStats => "get_stats" [Get],
    Create => "create" [Post],
    Update => "update" [Put, Post],
    Delete => "delete" [Delete],
    MarkHelpful => "mark_helpful" [Post],
});

action_table!(pub enum ReviewAdminAction in "reviews_admin" {
    List => "list" [Get],
    UpdateStatus => "update_status" [Post, Put],
    Delete => "delete" [Delete, Post],
});

const DEFAULT_FEATURED: u64 = 10;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewRequest {
    /// Required for update and delete
    #[serde(default, alias = "review_id", deserialize_with = "opt_parse")]
    pub id: Option<i32>,
    /// Required for create
    #[serde(default, deserialize_with = "opt_parse")]
    pub product_id: Option<i32>,
    /// 1 to 5
    #[serde(default, deserialize_with = "opt_strict")]
    pub rating: Option<i32>,
    #[serde(default, alias = "content", deserialize_with = "opt_trimmed")]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "opt_list")]
    pub media: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HelpfulCount {
    pub review_id: i32,
    pub helpful_count: i32,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(flatten)]
    page: PageParams,
    #[serde(default, deserialize_with = "opt_parse")]
    product_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_parse")]
    user_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_parse")]
    rating: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(default, alias = "review_id", deserialize_with = "opt_parse")]
    id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

fn review_id(id: Option<i32>) -> AppResult<i32> {
    require_id(id, "Thiếu ID đánh giá")
}

fn clean_comment(raw: Option<&str>) -> Option<String> {
    raw.map(strip_tags).filter(|c| !c.is_empty())
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/reviews",
    params(
        ("action" = String, Query, description = "list, get, list_by_user, list_featured, get_stats, create, update, delete, mark_helpful"),
        ("product_id" = Option<i32>, Query, description = "Product for list and get_stats"),
        PageParams,
    ),
    request_body(content = ReviewRequest, description = "JSON or form"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<ReviewView>>),
        (status = 201, description = "Review created", body = ApiResponse<ReviewView>),
        (status = 400, description = "Rating out of range or missing field", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not the author", body = AppError),
        (status = 404, description = "Product or review not found", body = AppError),
        (status = 409, description = "Product already reviewed", body = AppError),
    ),
    tag = "reviews"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let service = ReviewService::new(req.db.clone());

    match req.resolve::<ReviewAction>()? {
        ReviewAction::List => {
            let query: ListQuery = req.input()?;
            let product_id = require_id(query.product_id, "Thiếu ID sản phẩm")?;
            let pagination = query.page.pagination();
            let result = service
                .list_for_product(product_id, query.rating, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy danh sách đánh giá thành công")
        }
        ReviewAction::Get => {
            let IdParam { id } = req.input()?;
            let review = service.get(review_id(id)?).await?;
            ok(review, "Lấy đánh giá thành công")
        }
        ReviewAction::ListByUser => {
            let query: ListQuery = req.input()?;
            let user_id = query
                .user_id
                .or(req.session.current_user_id())
                .ok_or_else(|| AppError::Validation("Thiếu ID người dùng".to_string()))?;
            let pagination = query.page.pagination();
            let result = service
                .list_by_user(user_id, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy đánh giá của người dùng thành công")
        }
        ReviewAction::ListFeatured => {
            let query: ListQuery = req.input()?;
            let limit = query.page.limit.unwrap_or(DEFAULT_FEATURED);
            let reviews = service.featured(limit).await?;
            ok(reviews, "Lấy đánh giá nổi bật thành công")
        }
        ReviewAction::GetStats => {
            let query: ListQuery = req.input()?;
            let product_id = require_id(query.product_id, "Thiếu ID sản phẩm")?;
            let stats: ReviewStats = service.stats(product_id).await?;
            ok(stats, "Lấy thống kê đánh giá thành công")
        }
        ReviewAction::Create => {
            let user_id = req.session.require_auth()?;
            let input: ReviewRequest = req.input()?;
            let product_id = require_id(input.product_id, "Thiếu ID sản phẩm")?;
            let rating = input
                .rating
                .ok_or_else(|| AppError::Validation("Vui lòng chọn điểm đánh giá".to_string()))?;
            let comment = clean_comment(input.comment.as_deref()).ok_or_else(|| {
                AppError::Validation("Vui lòng nhập nội dung đánh giá".to_string())
            })?;
            let review = service
                .create(product_id, user_id, rating, comment, input.media)
                .await?;
            tracing::info!(review_id = review.id, product_id, user_id, "Review created");
            Ok(ApiResponse::ok(review, "Đánh giá thành công")
                .with_status(StatusCode::CREATED)
                .into_response())
        }
        ReviewAction::Update => {
            req.session.require_auth()?;
            let input: ReviewRequest = req.input()?;
            let existing = service.find_editable(review_id(input.id)?).await?;
            req.session.require_owner_or_admin(existing.user_id)?;
            let update = ReviewUpdate {
                rating: input.rating,
                comment: clean_comment(input.comment.as_deref()),
                media: input.media,
            };
            let review = service.update(existing, update).await?;
            ok(review, "Cập nhật đánh giá thành công")
        }
        ReviewAction::Delete => {
            req.session.require_auth()?;
            let IdParam { id } = req.input()?;
            let existing = service.find_editable(review_id(id)?).await?;
            req.session.require_owner_or_admin(existing.user_id)?;
            service.soft_delete(existing.id).await?;
            done("Xóa đánh giá thành công")
        }
        ReviewAction::MarkHelpful => {
            let input: ReviewRequest = req.input()?;
            let id = review_id(input.id)?;
            let helpful_count = service.mark_helpful(id).await?;
            ok(
                HelpfulCount {
                    review_id: id,
                    helpful_count,
                },
                "Cảm ơn bạn đã đánh giá hữu ích",
            )
        }
    }
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/reviews_admin",
    params(
        ("action" = String, Query, description = "list, update_status, delete"),
        PageParams,
    ),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<ReviewView>>),
        (status = 400, description = "Invalid status or id", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not an admin", body = AppError),
        (status = 404, description = "Review not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn handle_admin(req: ActionRequest) -> AppResult<Response> {
    let action = req.resolve::<ReviewAdminAction>()?;
    req.session.require_admin()?;
    let service = ReviewService::new(req.db.clone());

    match action {
        ReviewAdminAction::List => {
            let query: ListQuery = req.input()?;
            let pagination = query.page.pagination();
            let filter = ReviewFilter {
                product_id: query.product_id,
                user_id: query.user_id,
                rating: query.rating,
                status: query.status.and_then(|s| s.parse().ok()),
            };
            let result = service
                .admin_list(filter, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy danh sách đánh giá thành công")
        }
        ReviewAdminAction::UpdateStatus => {
            let input: StatusRequest = req.input()?;
            let details = json!({ "review_id": input.id, "status": input.status });
            let result = async {
                let id = review_id(input.id)?;
                let status: ReviewStatus = input
                    .status
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AppError::Validation("Trạng thái không hợp lệ".to_string()))?;
                service.update_status(id, status).await
            }
            .await;
            let review =
                action_log::record(&req.session, "update_review_status", details, result)?;
            ok(review, "Cập nhật trạng thái đánh giá thành công")
        }
        ReviewAdminAction::Delete => {
            let IdParam { id } = req.input()?;
            let details = json!({ "review_id": id });
            let result = async { service.hard_delete(review_id(id)?).await }.await;
            action_log::record(&req.session, "delete_review", details, result)?;
            done("Đã xóa vĩnh viễn đánh giá")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{resolve, validate_table, Verb};

    #[test]
    fn tables_are_valid() {
        validate_table::<ReviewAction>().unwrap();
        validate_table::<ReviewAdminAction>().unwrap();
    }

    #[test]
    fn mark_helpful_is_post_only() {
        assert_eq!(
            resolve::<ReviewAction>(Verb::Post, Some("mark_helpful")).unwrap(),
            ReviewAction::MarkHelpful
        );
        assert!(matches!(
            resolve::<ReviewAction>(Verb::Get, Some("mark_helpful")),
            Err(AppError::MethodNotAllowed)
        ));
    }

    #[test]
    fn rating_is_parsed_strictly() {
        let input: ReviewRequest =
            serde_json::from_value(json!({"product_id": "3", "rating": "4"})).unwrap();
        assert_eq!(input.rating, Some(4));
        assert!(serde_json::from_value::<ReviewRequest>(json!({"rating": "tốt"})).is_err());
    }

    #[test]
    fn comment_markup_is_stripped() {
        assert_eq!(clean_comment(Some("<p>Rất tốt</p>")).as_deref(), Some("Rất tốt"));
        assert_eq!(clean_comment(Some("<br>")), None);
        assert_eq!(clean_comment(None), None);
    }
}
