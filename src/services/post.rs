use crate::{
    error::{AppError, AppResult},
    models::{
        category, comment, post, Category, CategoryStatus, Comment, ContentStatus,
        Lifecycle, Post, PostModel, PostType, Product,
    },
    response::Pagination,
    services::{
        sql::{self, Filters},
        views::{Author, CategoryRef, AUTHOR_COLUMNS},
    },
    utils::{
        json_column::{decode_list, encode_list},
        render_markdown,
        sort::{SortKey, SortTable},
    },
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, FromQueryResult, QueryFilter, Set, TransactionTrait, Value,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const MAX_TAGS: usize = 5;
pub const MAX_TAG_LEN: usize = 30;
pub const MAX_MEDIA: usize = 10;
pub const MAX_TITLE_LEN: usize = 100;
pub const HOT_MAX_LIMIT: u64 = 10;
pub const HOT_VIEW_WEIGHT: f64 = 0.7;
pub const HOT_COMMENT_WEIGHT: f64 = 0.3;

pub const POST_SORT: SortTable = SortTable {
    newest: "p.created_at DESC, p.id DESC",
    oldest: "p.created_at ASC, p.id ASC",
    views: Some("p.view_count DESC, p.created_at DESC"),
    comments: Some("comment_count DESC, p.created_at DESC"),
    rating: None,
};

fn post_select() -> String {
    format!(
        "p.id, p.title, p.content, p.user_id, p.category_id, p.post_type, p.product_id, \
         p.media, p.tags, p.status, p.view_count, p.created_at, p.updated_at, \
         {AUTHOR_COLUMNS}, c.name AS category_name, \
         (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id AND cm.status = 'active') \
            AS comment_count"
    )
}

const POST_FROM: &str =
    "posts p JOIN users u ON u.id = p.user_id LEFT JOIN categories c ON c.id = p.category_id";

#[derive(Debug, FromQueryResult)]
pub struct PostRow {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub user_id: i32,
    pub category_id: i32,
    pub post_type: String,
    pub product_id: Option<i32>,
    pub media: Option<String>,
    pub tags: Option<String>,
    pub status: String,
    pub view_count: i32,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub author_username: String,
    pub author_full_name: String,
    pub author_picture: Option<String>,
    pub category_name: Option<String>,
    pub comment_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostView {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub content_html: String,
    pub post_type: String,
    pub status: String,
    pub view_count: i32,
    pub comment_count: i64,
    pub product_id: Option<i32>,
    pub media: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub author: Author,
    pub category: CategoryRef,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<PostRow> for PostView {
    fn from(row: PostRow) -> Self {
        Self {
            content_html: render_markdown(&row.content),
            media: decode_list(row.media.as_deref()),
            tags: decode_list(row.tags.as_deref()),
            author: Author {
                id: row.user_id,
                username: row.author_username,
                full_name: row.author_full_name,
                profile_picture: row.author_picture,
            },
            category: CategoryRef {
                id: row.category_id,
                name: row.category_name,
            },
            id: row.id,
            title: row.title,
            content: row.content,
            post_type: row.post_type,
            status: row.status,
            view_count: row.view_count,
            comment_count: row.comment_count,
            product_id: row.product_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Default)]
pub struct PostFilter {
    pub category_id: Option<i32>,
    pub user_id: Option<i32>,
    pub post_type: Option<PostType>,
    pub search: Option<String>,
    /// Admin listings only; public listings always show active posts.
    pub status: Option<ContentStatus>,
}

impl PostFilter {
    fn to_filters(&self) -> Filters {
        let mut filters = Filters::new()
            .bind_opt("p.category_id = ?", self.category_id)
            .bind_opt("p.user_id = ?", self.user_id)
            .bind_opt("p.post_type = ?", self.post_type.map(|t| t.as_str()))
            .bind_opt("p.status = ?", self.status.map(|s| s.as_str()));
        if let Some(term) = &self.search {
            let pattern = sql::like_pattern(term);
            filters = filters.bind_all(
                "(p.title ILIKE ? OR p.content ILIKE ? OR COALESCE(p.tags, '') ILIKE ?)",
                vec![pattern.clone().into(), pattern.clone().into(), pattern.into()],
            );
        }
        filters
    }
}

#[derive(Debug)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub user_id: i32,
    pub category_id: i32,
    pub post_type: PostType,
    pub product_id: Option<i32>,
    pub media: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<i32>,
    pub post_type: Option<PostType>,
    pub product_id: Option<i32>,
    pub media: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkPostAction {
    Activate,
    Deactivate,
    Hide,
    Delete,
}

impl BulkPostAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "activate" => Some(Self::Activate),
            "deactivate" => Some(Self::Deactivate),
            "hide" => Some(Self::Hide),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    fn target_status(&self) -> Option<ContentStatus> {
        match self {
            Self::Activate => Some(ContentStatus::Active),
            Self::Deactivate => Some(ContentStatus::Inactive),
            Self::Hide => Some(ContentStatus::Hidden),
            Self::Delete => None,
        }
    }
}

/// Rejects tag and media lists over their caps instead of truncating.
pub fn check_lists(tags: Option<&[String]>, media: Option<&[String]>) -> AppResult<()> {
    if let Some(tags) = tags {
        if tags.len() > MAX_TAGS {
            return Err(AppError::Validation(format!(
                "Tối đa {} thẻ cho mỗi bài viết",
                MAX_TAGS
            )));
        }
        if tags.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
            return Err(AppError::Validation(format!(
                "Mỗi thẻ tối đa {} ký tự",
                MAX_TAG_LEN
            )));
        }
    }
    if media.is_some_and(|m| m.len() > MAX_MEDIA) {
        return Err(AppError::Validation(format!(
            "Tối đa {} hình ảnh cho mỗi bài viết",
            MAX_MEDIA
        )));
    }
    Ok(())
}

fn not_found() -> AppError {
    AppError::NotFound("Bài viết không tồn tại".to_string())
}

fn gone() -> AppError {
    AppError::NotFound("Bài viết không tồn tại hoặc đã bị xóa".to_string())
}

pub struct PostService {
    db: DatabaseConnection,
}

impl PostService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn page(
        &self,
        filters: Filters,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<PostView>, u64)> {
        let (rows, total) = sql::fetch_page::<PostRow, _>(
            &self.db,
            &post_select(),
            POST_FROM,
            &filters,
            POST_SORT.order_by(sort),
            pagination,
        )
        .await?;
        Ok((rows.into_iter().map(PostView::from).collect(), total))
    }

    async fn view(&self, post_id: i32) -> AppResult<Option<PostView>> {
        let sql = format!("SELECT {} FROM {POST_FROM} WHERE p.id = $1", post_select());
        let row: Option<PostRow> = sql::fetch_one(&self.db, &sql, vec![post_id.into()]).await?;
        Ok(row.map(PostView::from))
    }

    pub async fn list(
        &self,
        filter: PostFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<PostView>, u64)> {
        let filter = PostFilter {
            status: Some(ContentStatus::Active),
            ..filter
        };
        self.page(filter.to_filters(), sort, pagination).await
    }

    /// Public read; counts one view.
    pub async fn get(&self, post_id: i32) -> AppResult<PostView> {
        let bumped = Post::update_many()
            .col_expr(
                post::Column::ViewCount,
                Expr::col(post::Column::ViewCount).add(1),
            )
            .filter(post::Column::Id.eq(post_id))
            .filter(post::Column::Status.eq(ContentStatus::Active.as_str()))
            .exec(&self.db)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(not_found());
        }
        self.view(post_id).await?.ok_or_else(not_found)
    }

    pub async fn search(
        &self,
        term: &str,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<PostView>, u64)> {
        let filter = PostFilter {
            search: Some(term.to_string()),
            ..Default::default()
        };
        self.list(filter, sort, pagination).await
    }

    pub async fn recent(&self, limit: u64) -> AppResult<Vec<PostView>> {
        let (items, _) = self
            .list(
                PostFilter::default(),
                Some(SortKey::Newest),
                Pagination::new(Some(1), Some(limit)),
            )
            .await?;
        Ok(items)
    }

    /// Posts in a category and its direct children.
    pub async fn by_category(
        &self,
        category_id: i32,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<PostView>, u64)> {
        Category::find_by_id(category_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Danh mục không tồn tại".to_string()))?;

        let filters = PostFilter {
            status: Some(ContentStatus::Active),
            ..Default::default()
        }
        .to_filters()
        .bind_all(
            "(p.category_id = ? OR p.category_id IN (SELECT id FROM categories WHERE parent_id = ?))",
            vec![category_id.into(), category_id.into()],
        );
        self.page(filters, sort, pagination).await
    }

    pub async fn by_user(
        &self,
        user_id: i32,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<PostView>, u64)> {
        let filter = PostFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.list(filter, sort, pagination).await
    }

    /// Active posts with views or comments ranked by hot score. When none
    /// qualify the newest active posts are returned and the flag is set.
    pub async fn hot(&self, limit: Option<u64>) -> AppResult<(Vec<PostView>, bool)> {
        let limit = Pagination::new(Some(1), limit)
            .clamp_limit(1, HOT_MAX_LIMIT)
            .limit;

        let sql = format!(
            "SELECT * FROM (SELECT {} FROM {POST_FROM} WHERE p.status = 'active') hot \
             WHERE hot.view_count > 0 OR hot.comment_count > 0 \
             ORDER BY ({HOT_VIEW_WEIGHT} * hot.view_count + {HOT_COMMENT_WEIGHT} * hot.comment_count) DESC, \
                hot.created_at DESC, hot.id DESC \
             LIMIT $1",
            post_select()
        );
        let rows: Vec<PostRow> =
            sql::fetch_all(&self.db, &sql, vec![sql::to_i64(limit).into()]).await?;

        if rows.is_empty() {
            return Ok((self.recent(limit).await?, true));
        }
        Ok((rows.into_iter().map(PostView::from).collect(), false))
    }

    async fn check_refs(&self, category_id: Option<i32>, product_id: Option<i32>) -> AppResult<()> {
        if let Some(category_id) = category_id {
            let exists = Category::find_by_id(category_id)
                .filter(category::Column::Status.eq(CategoryStatus::Active.as_str()))
                .one(&self.db)
                .await?;
            if exists.is_none() {
                return Err(AppError::Validation("Danh mục không tồn tại".to_string()));
            }
        }
        if let Some(product_id) = product_id {
            let exists = Product::find_by_id(product_id).one(&self.db).await?;
            if exists.is_none() {
                return Err(AppError::Validation("Sản phẩm không tồn tại".to_string()));
            }
        }
        Ok(())
    }

    pub async fn create(&self, input: NewPost) -> AppResult<PostView> {
        check_lists(input.tags.as_deref(), input.media.as_deref())?;
        self.check_refs(Some(input.category_id), input.product_id).await?;

        let now = chrono::Utc::now().naive_utc();
        let created = post::ActiveModel {
            title: Set(input.title),
            content: Set(input.content),
            user_id: Set(input.user_id),
            category_id: Set(input.category_id),
            post_type: Set(input.post_type.to_string()),
            product_id: Set(input.product_id),
            media: Set(encode_list(input.media.as_deref())),
            tags: Set(encode_list(input.tags.as_deref())),
            status: Set(ContentStatus::Active.to_string()),
            view_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        self.view(created.id).await?.ok_or_else(not_found)
    }

    /// A post that is not deleted, for owner checks before writes.
    pub async fn find_editable(&self, post_id: i32) -> AppResult<PostModel> {
        Post::find_by_id(post_id)
            .filter(post::Column::Status.ne(ContentStatus::Deleted.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(gone)
    }

    pub async fn update(&self, existing: PostModel, input: PostUpdate) -> AppResult<PostView> {
        check_lists(input.tags.as_deref(), input.media.as_deref())?;
        self.check_refs(input.category_id, input.product_id).await?;

        let post_id = existing.id;
        let mut active: post::ActiveModel = existing.into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(content) = input.content {
            active.content = Set(content);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(post_type) = input.post_type {
            active.post_type = Set(post_type.to_string());
        }
        if let Some(product_id) = input.product_id {
            active.product_id = Set(Some(product_id));
        }
        if input.media.is_some() {
            active.media = Set(encode_list(input.media.as_deref()));
        }
        if input.tags.is_some() {
            active.tags = Set(encode_list(input.tags.as_deref()));
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;

        self.view(post_id).await?.ok_or_else(not_found)
    }

    /// `deleted` is terminal, so a repeat call finds nothing to update.
    pub async fn soft_delete(&self, post_id: i32) -> AppResult<()> {
        let result = Post::update_many()
            .col_expr(post::Column::Status, Expr::value(ContentStatus::Deleted.as_str()))
            .col_expr(post::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(post::Column::Id.eq(post_id))
            .filter(post::Column::Status.ne(ContentStatus::Deleted.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(gone());
        }
        Ok(())
    }

    pub async fn admin_list(
        &self,
        filter: PostFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<PostView>, u64)> {
        self.page(filter.to_filters(), sort, pagination).await
    }

    pub async fn update_status(&self, post_id: i32, status: ContentStatus) -> AppResult<PostView> {
        let existing = Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or_else(not_found)?;
        let current = ContentStatus::coerce(Some(&existing.status), ContentStatus::Active);
        if !current.can_become(status) {
            return Err(AppError::Validation(
                "Không thể khôi phục bài viết đã xóa".to_string(),
            ));
        }

        let mut active: post::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;

        self.view(post_id).await?.ok_or_else(not_found)
    }

    /// Removes the post and its comments in one transaction.
    pub async fn hard_delete(&self, post_id: i32) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let result = delete_post_rows(&txn, post_id).await;
        sql::finish(txn, result).await
    }

    /// Applies one action to every id in a single transaction and returns
    /// the number of posts affected.
    pub async fn bulk_update(&self, ids: &[i32], action: BulkPostAction) -> AppResult<u64> {
        if ids.is_empty() {
            return Err(AppError::Validation(
                "Vui lòng chọn ít nhất một bài viết".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let result = async {
            match action.target_status() {
                Some(status) => {
                    let clause = format!(
                        "id IN ({}) AND status <> 'deleted'",
                        sql::placeholders(ids.len())
                    );
                    let filters = Filters::new().bind_all(
                        &clause,
                        ids.iter().map(|&id| Value::from(id)).collect(),
                    );
                    let sql = format!(
                        "UPDATE posts SET status = ${}, updated_at = NOW() {}",
                        filters.next_placeholder(),
                        filters.where_sql()
                    );
                    let mut values = filters.values();
                    values.push(status.as_str().into());
                    let done = txn.execute(sql::statement(&sql, values)).await?;
                    Ok(done.rows_affected())
                }
                None => {
                    let mut affected = 0;
                    for &id in ids {
                        match delete_post_rows(&txn, id).await {
                            Ok(()) => affected += 1,
                            Err(AppError::NotFound(_)) => {}
                            Err(e) => return Err(e),
                        }
                    }
                    Ok::<_, AppError>(affected)
                }
            }
        }
        .await;
        sql::finish(txn, result).await
    }
}

async fn delete_post_rows<C: ConnectionTrait>(conn: &C, post_id: i32) -> AppResult<()> {
    Comment::delete_many()
        .filter(comment::Column::PostId.eq(post_id))
        .exec(conn)
        .await?;
    let removed = Post::delete_by_id(post_id).exec(conn).await?;
    if removed.rows_affected == 0 {
        return Err(not_found());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(n: usize, len: usize) -> Vec<String> {
        (0..n).map(|_| "x".repeat(len)).collect()
    }

    #[test]
    fn list_caps_are_enforced_not_truncated() {
        assert!(check_lists(Some(&strings(5, 30)), Some(&strings(10, 5))).is_ok());
        assert!(check_lists(Some(&strings(6, 3)), None).is_err());
        assert!(check_lists(Some(&strings(1, 31)), None).is_err());
        assert!(check_lists(None, Some(&strings(11, 5))).is_err());
        assert!(check_lists(None, None).is_ok());
    }

    #[test]
    fn bulk_actions_parse() {
        assert_eq!(BulkPostAction::parse("Hide"), Some(BulkPostAction::Hide));
        assert_eq!(BulkPostAction::parse("purge"), None);
        assert_eq!(
            BulkPostAction::Deactivate.target_status(),
            Some(ContentStatus::Inactive)
        );
        assert_eq!(BulkPostAction::Delete.target_status(), None);
    }

    #[test]
    fn comment_sort_uses_alias() {
        assert_eq!(
            POST_SORT.order_by(Some(SortKey::Comments)),
            "comment_count DESC, p.created_at DESC"
        );
        assert_eq!(POST_SORT.order_by(Some(SortKey::Rating)), POST_SORT.newest);
    }
}
