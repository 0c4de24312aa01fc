use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, page, require_id, IdParam, PageParams},
    models::{ContentStatus, PostType},
    response::{ApiResponse, PaginatedResponse},
    services::{
        action_log,
        post::{
            check_lists, BulkPostAction, NewPost, PostFilter, PostService, PostUpdate, PostView,
            MAX_MEDIA,
        },
        upload::{UploadConfig, UploadService},
    },
    utils::{
        lenient::{opt_id_list, opt_list, opt_parse, opt_trimmed},
        require_text, strip_tags, validate_payload,
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

action_table!(pub enum PostAction in "posts" {
    List => "list" [Get],
    Get => "get" [Get],
    Search => "search" [Get],
    GetRecent => "get_recent" [Get],
    GetByCategory => "get_by_category" [Get],
    ListByUser => "list_by_user" [Get],
    ListHot => "list_hot" [Get],
    Create => "create" [Post],
    Update => "update" [Put, Post],
    Delete => "delete" [Delete],
});

action_table!(pub enum PostAdminAction in "posts_admin" {
    List => "list" [Get],
    UpdateStatus => "update_status" [Post, Put],
    Delete => "delete" [Delete, Post],
    BulkUpdate => "bulk_update" [Post],
});

const DEFAULT_RECENT: u64 = 10;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePostRequest {
    /// Up to 100 characters
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(
        required(message = "Vui lòng nhập tiêu đề"),
        length(max = 100, message = "Tiêu đề tối đa 100 ký tự")
    )]
    pub title: Option<String>,
    /// Markdown
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(required(message = "Vui lòng nhập nội dung"))]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "opt_parse")]
    #[validate(required(message = "Vui lòng chọn danh mục"))]
    pub category_id: Option<i32>,
    /// discussion, question, review or news; defaults to discussion
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub post_type: Option<String>,
    #[serde(default, deserialize_with = "opt_parse")]
    pub product_id: Option<i32>,
    /// Image paths, at most 10 including uploaded files
    #[serde(default, deserialize_with = "opt_list")]
    pub media: Option<Vec<String>>,
    /// At most 5 tags of up to 30 characters
    #[serde(default, deserialize_with = "opt_list")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePostRequest {
    #[serde(default, alias = "post_id", deserialize_with = "opt_parse")]
    pub id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(max = 100, message = "Tiêu đề tối đa 100 ký tự"))]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "opt_parse")]
    pub category_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub post_type: Option<String>,
    #[serde(default, deserialize_with = "opt_parse")]
    pub product_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_list")]
    pub media: Option<Vec<String>>,
    #[serde(default, deserialize_with = "opt_list")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedPost {
    pub post_id: i32,
    pub post: PostView,
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
    category_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_parse")]
    user_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    post_type: Option<String>,
    #[serde(default, alias = "q", alias = "keyword", deserialize_with = "opt_trimmed")]
    search: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(default, alias = "post_id", deserialize_with = "opt_parse")]
    id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    #[serde(default, alias = "post_ids", deserialize_with = "opt_id_list")]
    ids: Option<Vec<i32>>,
    #[serde(default, alias = "bulk_action", deserialize_with = "opt_trimmed")]
    action: Option<String>,
}

/// Unknown types are a 400; omitted means discussion.
fn parse_post_type(raw: Option<&str>) -> AppResult<Option<PostType>> {
    raw.map(|t| {
        t.parse()
            .map_err(|_| AppError::Validation("Loại bài viết không hợp lệ".to_string()))
    })
    .transpose()
}

fn clean_tags(tags: Option<Vec<String>>) -> Option<Vec<String>> {
    tags.map(|list| list.iter().map(|t| strip_tags(t)).collect())
}

fn post_id(id: Option<i32>) -> AppResult<i32> {
    require_id(id, "Thiếu ID bài viết")
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/posts",
    params(
        ("action" = String, Query, description = "list, get, search, get_recent, get_by_category, list_by_user, list_hot, create, update, delete"),
        ("id" = Option<i32>, Query, description = "Post id for get, update and delete"),
        PageParams,
    ),
    request_body(content = CreatePostRequest, description = "JSON, form or multipart with `media` files"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<PostView>>),
        (status = 201, description = "Post created", body = ApiResponse<CreatedPost>),
        (status = 400, description = "Validation error or unknown action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not the author", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
        (status = 413, description = "Upload too large", body = AppError),
    ),
    tag = "posts"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let service = PostService::new(req.db.clone());

    match req.resolve::<PostAction>()? {
        PostAction::List => {
            let query: ListQuery = req.input()?;
            let pagination = query.page.pagination();
            let filter = PostFilter {
                category_id: query.category_id,
                user_id: query.user_id,
                post_type: query.post_type.and_then(|t| t.parse().ok()),
                search: query.search,
                status: None,
            };
            let result = service.list(filter, query.page.sort_key(), pagination).await?;
            page(result, pagination, "Lấy danh sách bài viết thành công")
        }
        PostAction::Get => {
            let IdParam { id } = req.input()?;
            let post = service.get(post_id(id)?).await?;
            ok(post, "Lấy bài viết thành công")
        }
        PostAction::Search => {
            let query: ListQuery = req.input()?;
            let term = require_text(query.search.as_deref(), "Vui lòng nhập từ khóa tìm kiếm")?;
            let pagination = query.page.pagination();
            let result = service.search(&term, query.page.sort_key(), pagination).await?;
            page(result, pagination, "Tìm kiếm bài viết thành công")
        }
        PostAction::GetRecent => {
            let query: ListQuery = req.input()?;
            let posts = service.recent(query.page.limit.unwrap_or(DEFAULT_RECENT)).await?;
            ok(posts, "Lấy bài viết mới nhất thành công")
        }
        PostAction::GetByCategory => {
            let query: ListQuery = req.input()?;
            let category_id = require_id(query.category_id, "Thiếu ID danh mục")?;
            let pagination = query.page.pagination();
            let result = service
                .by_category(category_id, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy bài viết theo danh mục thành công")
        }
        PostAction::ListByUser => {
            let query: ListQuery = req.input()?;
            let user_id = query
                .user_id
                .or(req.session.current_user_id())
                .ok_or_else(|| AppError::Validation("Thiếu ID người dùng".to_string()))?;
            let pagination = query.page.pagination();
            let result = service
                .by_user(user_id, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy bài viết của người dùng thành công")
        }
        PostAction::ListHot => {
            let query: ListQuery = req.input()?;
            let (posts, fallback) = service.hot(query.page.limit).await?;
            let message = if fallback {
                "Chưa có chủ đề nổi bật, hiển thị bài viết mới nhất"
            } else {
                "Lấy chủ đề nổi bật thành công"
            };
            ok(posts, message)
        }
        PostAction::Create => create(&req, &service).await,
        PostAction::Update => {
            let input: UpdatePostRequest = req.input()?;
            validate_payload(&input)?;
            let existing = service.find_editable(post_id(input.id)?).await?;
            req.session.require_owner_or_admin(existing.user_id)?;

            let update = PostUpdate {
                title: input.title.map(|t| strip_tags(&t)),
                content: input.content,
                category_id: input.category_id,
                post_type: parse_post_type(input.post_type.as_deref())?,
                product_id: input.product_id,
                media: input.media,
                tags: clean_tags(input.tags),
            };
            let post = service.update(existing, update).await?;
            ok(post, "Cập nhật bài viết thành công")
        }
        PostAction::Delete => {
            let IdParam { id } = req.input()?;
            let existing = service.find_editable(post_id(id)?).await?;
            req.session.require_owner_or_admin(existing.user_id)?;
            service.soft_delete(existing.id).await?;
            done("Xóa bài viết thành công")
        }
    }
}

/// Uploaded `media` files are stored before the row is written and
/// removed again if the insert fails.
async fn create(req: &ActionRequest, service: &PostService) -> AppResult<Response> {
    let user_id = req.session.require_auth()?;
    let input: CreatePostRequest = req.input()?;
    validate_payload(&input)?;

    let title = strip_tags(input.title.as_deref().unwrap_or_default());
    let content = input.content.unwrap_or_default();
    if title.is_empty() {
        return Err(AppError::Validation("Vui lòng nhập tiêu đề".to_string()));
    }
    let post_type = parse_post_type(input.post_type.as_deref())?.unwrap_or(PostType::Discussion);
    let tags = clean_tags(input.tags);

    let files: Vec<_> = req.files("media").collect();
    let supplied = input.media.as_ref().map_or(0, Vec::len);
    if supplied + files.len() > MAX_MEDIA {
        return Err(AppError::Validation(format!(
            "Tối đa {} hình ảnh cho mỗi bài viết",
            MAX_MEDIA
        )));
    }
    check_lists(tags.as_deref(), input.media.as_deref())?;

    let upload_config = req.extension::<UploadConfig>()?;
    let uploaded = UploadService::save_images(&upload_config, &files, "posts").await?;
    let media = match (input.media, uploaded.is_empty()) {
        (media, true) => media,
        (Some(mut media), false) => {
            media.extend(uploaded.iter().cloned());
            Some(media)
        }
        (None, false) => Some(uploaded.clone()),
    };

    let created = service
        .create(NewPost {
            title,
            content,
            user_id,
            category_id: input.category_id.unwrap_or_default(),
            post_type,
            product_id: input.product_id,
            media,
            tags,
        })
        .await;

    let post = match created {
        Ok(post) => post,
        Err(e) => {
            UploadService::discard(&upload_config, &uploaded).await;
            return Err(e);
        }
    };

    tracing::info!(post_id = post.id, user_id, "Post created");
    Ok(ApiResponse::ok(
        CreatedPost {
            post_id: post.id,
            post,
        },
        "Tạo bài viết thành công",
    )
    .with_status(StatusCode::CREATED)
    .into_response())
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/posts_admin",
    params(
        ("action" = String, Query, description = "list, update_status, delete, bulk_update"),
        PageParams,
    ),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<PostView>>),
        (status = 400, description = "Invalid status, ids or bulk action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not an admin", body = AppError),
        (status = 404, description = "Post not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn handle_admin(req: ActionRequest) -> AppResult<Response> {
    let action = req.resolve::<PostAdminAction>()?;
    req.session.require_admin()?;
    let service = PostService::new(req.db.clone());

    match action {
        PostAdminAction::List => {
            let query: ListQuery = req.input()?;
            let pagination = query.page.pagination();
            let filter = PostFilter {
                category_id: query.category_id,
                user_id: query.user_id,
                post_type: query.post_type.and_then(|t| t.parse().ok()),
                search: query.search,
                status: query.status.and_then(|s| s.parse().ok()),
            };
            let result = service
                .admin_list(filter, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy danh sách bài viết thành công")
        }
        PostAdminAction::UpdateStatus => {
            let input: StatusRequest = req.input()?;
            let details = json!({ "post_id": input.id, "status": input.status });
            let result = async {
                let id = post_id(input.id)?;
                let status: ContentStatus = input
                    .status
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AppError::Validation("Trạng thái không hợp lệ".to_string()))?;
                service.update_status(id, status).await
            }
            .await;
            let post = action_log::record(&req.session, "update_post_status", details, result)?;
            ok(post, "Cập nhật trạng thái bài viết thành công")
        }
        PostAdminAction::Delete => {
            let IdParam { id } = req.input()?;
            let details = json!({ "post_id": id });
            let result = async { service.hard_delete(post_id(id)?).await }.await;
            action_log::record(&req.session, "delete_post", details, result)?;
            done("Đã xóa vĩnh viễn bài viết")
        }
        PostAdminAction::BulkUpdate => {
            let input: BulkRequest = req.input()?;
            let details = json!({ "post_ids": input.ids, "action": input.action });
            let result = async {
                let bulk = input
                    .action
                    .as_deref()
                    .and_then(BulkPostAction::parse)
                    .ok_or_else(|| {
                        AppError::Validation("Hành động hàng loạt không hợp lệ".to_string())
                    })?;
                service
                    .bulk_update(input.ids.as_deref().unwrap_or_default(), bulk)
                    .await
            }
            .await;
            let affected = action_log::record(&req.session, "bulk_update_posts", details, result)?;
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
        validate_table::<PostAction>().unwrap();
        validate_table::<PostAdminAction>().unwrap();
    }

    #[test]
    fn post_delete_is_delete_only() {
        assert!(matches!(
            resolve::<PostAction>(Verb::Post, Some("delete")),
            Err(AppError::MethodNotAllowed)
        ));
        assert_eq!(
            resolve::<PostAdminAction>(Verb::Post, Some("delete")).unwrap(),
            PostAdminAction::Delete
        );
    }

    #[test]
    fn post_types() {
        assert_eq!(parse_post_type(None).unwrap(), None);
        assert_eq!(parse_post_type(Some("news")).unwrap(), Some(PostType::News));
        assert!(parse_post_type(Some("poll")).is_err());
    }

    #[test]
    fn create_requires_title_content_category() {
        let input: CreatePostRequest =
            serde_json::from_value(json!({"content": "x", "category_id": 1})).unwrap();
        assert_eq!(
            validate_payload(&input).unwrap_err().client_message(),
            "Vui lòng nhập tiêu đề"
        );

        let long = "t".repeat(101);
        let input: CreatePostRequest =
            serde_json::from_value(json!({"title": long, "content": "x", "category_id": 1}))
                .unwrap();
        assert!(validate_payload(&input).is_err());
    }

    #[test]
    fn list_query_keeps_limit_in_page_params() {
        let query: ListQuery = serde_json::from_value(
            json!({"page": "1", "limit": "50", "category_id": "3", "q": "rust"}),
        )
        .unwrap();
        assert_eq!(query.page.limit, Some(50));
        assert_eq!(query.page.pagination().limit, 50);
        assert_eq!(query.category_id, Some(3));
        assert_eq!(query.search.as_deref(), Some("rust"));
    }

    #[test]
    fn bulk_body_action_overrides_dispatch_name() {
        let input: BulkRequest =
            serde_json::from_value(json!({"ids": [1, 2], "action": "hide"})).unwrap();
        assert_eq!(input.ids, Some(vec![1, 2]));
        assert_eq!(input.action.as_deref().and_then(BulkPostAction::parse), Some(BulkPostAction::Hide));
    }
}
