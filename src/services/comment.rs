use crate::{
    error::{AppError, AppResult},
    models::{comment, post, Comment, CommentModel, ContentStatus, Lifecycle, Post},
    response::Pagination,
    services::{
        sql::{self, Filters},
        views::{Author, AUTHOR_COLUMNS},
    },
    utils::sort::{SortKey, SortTable},
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, FromQueryResult, QueryFilter, Set, TransactionTrait, Value,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const COMMENT_SORT: SortTable = SortTable {
    newest: "cm.created_at DESC, cm.id DESC",
    oldest: "cm.created_at ASC, cm.id ASC",
    views: None,
    comments: None,
    rating: None,
};

const COMMENT_FROM: &str =
    "comments cm JOIN users u ON u.id = cm.user_id JOIN posts p ON p.id = cm.post_id";

fn comment_select() -> String {
    format!(
        "cm.id, cm.post_id, cm.user_id, cm.content, cm.status, cm.created_at, cm.updated_at, \
         {AUTHOR_COLUMNS}, p.title AS post_title"
    )
}

#[derive(Debug, FromQueryResult)]
pub struct CommentRow {
    pub id: i32,
    pub post_id: i32,
    pub user_id: i32,
    pub content: String,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub author_username: String,
    pub author_full_name: String,
    pub author_picture: Option<String>,
    pub post_title: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CommentView {
    pub id: i32,
    pub post_id: i32,
    pub post_title: String,
    pub content: String,
    pub status: String,
    pub author: Author,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            post_title: row.post_title,
            content: row.content,
            status: row.status,
            author: Author {
                id: row.user_id,
                username: row.author_username,
                full_name: row.author_full_name,
                profile_picture: row.author_picture,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Default)]
pub struct CommentFilter {
    pub post_id: Option<i32>,
    pub user_id: Option<i32>,
    pub status: Option<ContentStatus>,
    pub search: Option<String>,
}

impl CommentFilter {
    fn to_filters(&self) -> Filters {
        let filters = Filters::new()
            .bind_opt("cm.post_id = ?", self.post_id)
            .bind_opt("cm.user_id = ?", self.user_id)
            .bind_opt("cm.status = ?", self.status.map(|s| s.as_str()));
        match &self.search {
            Some(term) => filters.bind("cm.content ILIKE ?", sql::like_pattern(term)),
            None => filters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkCommentAction {
    Activate,
    Deactivate,
    Hide,
    Delete,
    HardDelete,
}

impl BulkCommentAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "activate" => Some(Self::Activate),
            "deactivate" => Some(Self::Deactivate),
            "hide" => Some(Self::Hide),
            "delete" => Some(Self::Delete),
            "hard_delete" => Some(Self::HardDelete),
            _ => None,
        }
    }

    fn target_status(&self) -> Option<ContentStatus> {
        match self {
            Self::Activate => Some(ContentStatus::Active),
            Self::Deactivate => Some(ContentStatus::Inactive),
            Self::Hide => Some(ContentStatus::Hidden),
            Self::Delete => Some(ContentStatus::Deleted),
            Self::HardDelete => None,
        }
    }
}

fn not_found() -> AppError {
    AppError::NotFound("Bình luận không tồn tại".to_string())
}

fn gone() -> AppError {
    AppError::NotFound("Bình luận không tồn tại hoặc đã bị xóa".to_string())
}

pub struct CommentService {
    db: DatabaseConnection,
}

impl CommentService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn page(
        &self,
        filter: CommentFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<CommentView>, u64)> {
        let (rows, total) = sql::fetch_page::<CommentRow, _>(
            &self.db,
            &comment_select(),
            COMMENT_FROM,
            &filter.to_filters(),
            COMMENT_SORT.order_by(sort),
            pagination,
        )
        .await?;
        Ok((rows.into_iter().map(CommentView::from).collect(), total))
    }

    async fn view(&self, comment_id: i32) -> AppResult<CommentView> {
        let sql = format!("SELECT {} FROM {COMMENT_FROM} WHERE cm.id = $1", comment_select());
        let row: Option<CommentRow> =
            sql::fetch_one(&self.db, &sql, vec![comment_id.into()]).await?;
        row.map(CommentView::from).ok_or_else(not_found)
    }

    /// Active comments of an active post.
    pub async fn list_for_post(
        &self,
        post_id: i32,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<CommentView>, u64)> {
        self.active_post(post_id).await?;
        let filter = CommentFilter {
            post_id: Some(post_id),
            status: Some(ContentStatus::Active),
            ..Default::default()
        };
        self.page(filter, sort, pagination).await
    }

    pub async fn list_by_user(
        &self,
        user_id: i32,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<CommentView>, u64)> {
        let filter = CommentFilter {
            user_id: Some(user_id),
            status: Some(ContentStatus::Active),
            ..Default::default()
        };
        self.page(filter, sort, pagination).await
    }

    async fn active_post(&self, post_id: i32) -> AppResult<()> {
        Post::find_by_id(post_id)
            .filter(post::Column::Status.eq(ContentStatus::Active.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Bài viết không tồn tại".to_string()))?;
        Ok(())
    }

    pub async fn create(&self, post_id: i32, user_id: i32, content: String) -> AppResult<CommentView> {
        self.active_post(post_id).await?;

        let now = chrono::Utc::now().naive_utc();
        let created = comment::ActiveModel {
            post_id: Set(post_id),
            user_id: Set(user_id),
            content: Set(content),
            status: Set(ContentStatus::Active.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        self.view(created.id).await
    }

    pub async fn find_editable(&self, comment_id: i32) -> AppResult<CommentModel> {
        Comment::find_by_id(comment_id)
            .filter(comment::Column::Status.ne(ContentStatus::Deleted.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(gone)
    }

    pub async fn update(&self, existing: CommentModel, content: String) -> AppResult<CommentView> {
        let comment_id = existing.id;
        let mut active: comment::ActiveModel = existing.into();
        active.content = Set(content);
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;
        self.view(comment_id).await
    }

    pub async fn soft_delete(&self, comment_id: i32) -> AppResult<()> {
        let result = Comment::update_many()
            .col_expr(comment::Column::Status, Expr::value(ContentStatus::Deleted.as_str()))
            .col_expr(comment::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(comment::Column::Id.eq(comment_id))
            .filter(comment::Column::Status.ne(ContentStatus::Deleted.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(gone());
        }
        Ok(())
    }

    pub async fn admin_list(
        &self,
        filter: CommentFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<CommentView>, u64)> {
        self.page(filter, sort, pagination).await
    }

    pub async fn update_status(
        &self,
        comment_id: i32,
        status: ContentStatus,
    ) -> AppResult<CommentView> {
        let existing = Comment::find_by_id(comment_id)
            .one(&self.db)
            .await?
            .ok_or_else(not_found)?;
        let current = ContentStatus::coerce(Some(&existing.status), ContentStatus::Active);
        if !current.can_become(status) {
            return Err(AppError::Validation(
                "Không thể khôi phục bình luận đã xóa".to_string(),
            ));
        }

        let mut active: comment::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;
        self.view(comment_id).await
    }

    pub async fn bulk_update(&self, ids: &[i32], action: BulkCommentAction) -> AppResult<u64> {
        if ids.is_empty() {
            return Err(AppError::Validation(
                "Vui lòng chọn ít nhất một bình luận".to_string(),
            ));
        }

        let clause = format!("id IN ({}) AND status <> 'deleted'", sql::placeholders(ids.len()));
        let filters = Filters::new().bind_all(&clause, ids.iter().map(|&id| Value::from(id)).collect());

        let txn = self.db.begin().await?;
        let result = async {
            let done = match action.target_status() {
                Some(status) => {
                    let sql = format!(
                        "UPDATE comments SET status = ${}, updated_at = NOW() {}",
                        filters.next_placeholder(),
                        filters.where_sql()
                    );
                    let mut values = filters.values();
                    values.push(status.as_str().into());
                    txn.execute(sql::statement(&sql, values)).await?
                }
                None => {
                    let in_list = format!("id IN ({})", sql::placeholders(ids.len()));
                    let filters = Filters::new()
                        .bind_all(&in_list, ids.iter().map(|&id| Value::from(id)).collect());
                    let sql = format!("DELETE FROM comments {}", filters.where_sql());
                    txn.execute(sql::statement(&sql, filters.values())).await?
                }
            };
            Ok::<_, AppError>(done.rows_affected())
        }
        .await;
        sql::finish(txn, result).await
    }
}
