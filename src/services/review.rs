use crate::{
    error::{AppError, AppResult, OrConflict},
    models::{product, review, Lifecycle, Product, ProductStatus, Review, ReviewModel, ReviewStatus},
    response::Pagination,
    services::{
        sql::{self, Filters},
        views::{Author, AUTHOR_COLUMNS},
    },
    utils::{
        json_column::{decode_list, encode_list},
        sort::{SortKey, SortTable},
    },
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, Set,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

pub const REVIEW_SORT: SortTable = SortTable {
    newest: "r.created_at DESC, r.id DESC",
    oldest: "r.created_at ASC, r.id ASC",
    views: None,
    comments: Some("r.helpful_count DESC, r.created_at DESC"),
    rating: Some("r.rating DESC, r.created_at DESC"),
};

const REVIEW_FROM: &str =
    "reviews r JOIN users u ON u.id = r.user_id JOIN products pr ON pr.id = r.product_id";

fn review_select() -> String {
    format!(
        "r.id, r.product_id, r.user_id, r.rating, r.comment, r.media, r.helpful_count, \
         r.status, r.created_at, r.updated_at, {AUTHOR_COLUMNS}, pr.name AS product_name"
    )
}

#[derive(Debug, FromQueryResult)]
pub struct ReviewRow {
    pub id: i32,
    pub product_id: i32,
    pub user_id: i32,
    pub rating: i32,
    pub comment: String,
    pub media: Option<String>,
    pub helpful_count: i32,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub author_username: String,
    pub author_full_name: String,
    pub author_picture: Option<String>,
    pub product_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewView {
    pub id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub rating: i32,
    pub comment: String,
    pub media: Option<Vec<String>>,
    pub helpful_count: i32,
    pub status: String,
    pub author: Author,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<ReviewRow> for ReviewView {
    fn from(row: ReviewRow) -> Self {
        Self {
            media: decode_list(row.media.as_deref()),
            author: Author {
                id: row.user_id,
                username: row.author_username,
                full_name: row.author_full_name,
                profile_picture: row.author_picture,
            },
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            rating: row.rating,
            comment: row.comment,
            helpful_count: row.helpful_count,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RatingBucket {
    pub rating: i32,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewStats {
    pub product_id: i32,
    pub total_reviews: i64,
    pub average_rating: f64,
    pub distribution: Vec<RatingBucket>,
}

#[derive(Debug, FromQueryResult)]
struct BucketRow {
    rating: i32,
    count: i64,
}

#[derive(Debug, Default)]
pub struct ReviewFilter {
    pub product_id: Option<i32>,
    pub user_id: Option<i32>,
    pub rating: Option<i32>,
    pub status: Option<ReviewStatus>,
}

impl ReviewFilter {
    fn to_filters(&self) -> Filters {
        Filters::new()
            .bind_opt("r.product_id = ?", self.product_id)
            .bind_opt("r.user_id = ?", self.user_id)
            .bind_opt("r.rating = ?", self.rating)
            .bind_opt("r.status = ?", self.status.map(|s| s.as_str()))
    }
}

#[derive(Debug, Default)]
pub struct ReviewUpdate {
    pub rating: Option<i32>,
    pub comment: Option<String>,
    pub media: Option<Vec<String>>,
}

pub fn check_rating(rating: i32) -> AppResult<()> {
    if !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(AppError::Validation(format!(
            "Điểm đánh giá phải từ {} đến {}",
            MIN_RATING, MAX_RATING
        )));
    }
    Ok(())
}

/// Weighted mean over a 1..=5 histogram, rounded to one decimal.
pub fn average_rating(buckets: &[RatingBucket]) -> f64 {
    let total: i64 = buckets.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    let sum: i64 = buckets.iter().map(|b| i64::from(b.rating) * b.count).sum();
    ((sum as f64 / total as f64) * 10.0).round() / 10.0
}

fn not_found() -> AppError {
    AppError::NotFound("Đánh giá không tồn tại".to_string())
}

fn gone() -> AppError {
    AppError::NotFound("Đánh giá không tồn tại hoặc đã bị xóa".to_string())
}

pub struct ReviewService {
    db: DatabaseConnection,
}

impl ReviewService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn page(
        &self,
        filter: ReviewFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ReviewView>, u64)> {
        let (rows, total) = sql::fetch_page::<ReviewRow, _>(
            &self.db,
            &review_select(),
            REVIEW_FROM,
            &filter.to_filters(),
            REVIEW_SORT.order_by(sort),
            pagination,
        )
        .await?;
        Ok((rows.into_iter().map(ReviewView::from).collect(), total))
    }

    async fn view(&self, review_id: i32) -> AppResult<ReviewView> {
        let sql = format!("SELECT {} FROM {REVIEW_FROM} WHERE r.id = $1", review_select());
        let row: Option<ReviewRow> =
            sql::fetch_one(&self.db, &sql, vec![review_id.into()]).await?;
        row.map(ReviewView::from).ok_or_else(not_found)
    }

    pub async fn list_for_product(
        &self,
        product_id: i32,
        rating: Option<i32>,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ReviewView>, u64)> {
        let filter = ReviewFilter {
            product_id: Some(product_id),
            rating,
            status: Some(ReviewStatus::Active),
            ..Default::default()
        };
        self.page(filter, sort, pagination).await
    }

    pub async fn get(&self, review_id: i32) -> AppResult<ReviewView> {
        let review = self.view(review_id).await?;
        if review.status != ReviewStatus::Active.as_str() {
            return Err(not_found());
        }
        Ok(review)
    }

    pub async fn list_by_user(
        &self,
        user_id: i32,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ReviewView>, u64)> {
        let filter = ReviewFilter {
            user_id: Some(user_id),
            status: Some(ReviewStatus::Active),
            ..Default::default()
        };
        self.page(filter, sort, pagination).await
    }

    /// The most helpful active review of each product (newest wins ties),
    /// then the top `limit` of those by helpful count.
    pub async fn featured(&self, limit: u64) -> AppResult<Vec<ReviewView>> {
        let sql = format!(
            "SELECT * FROM ( \
                SELECT {}, ROW_NUMBER() OVER ( \
                    PARTITION BY r.product_id \
                    ORDER BY r.helpful_count DESC, r.created_at DESC, r.id DESC \
                ) AS rn \
                FROM {REVIEW_FROM} \
                WHERE r.status = 'active' AND pr.status = 'active' \
             ) ranked \
             WHERE ranked.rn = 1 \
             ORDER BY ranked.helpful_count DESC, ranked.created_at DESC, ranked.id DESC \
             LIMIT $1",
            review_select()
        );
        let rows: Vec<ReviewRow> =
            sql::fetch_all(&self.db, &sql, vec![sql::to_i64(limit).into()]).await?;
        Ok(rows.into_iter().map(ReviewView::from).collect())
    }

    pub async fn stats(&self, product_id: i32) -> AppResult<ReviewStats> {
        Product::find_by_id(product_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Sản phẩm không tồn tại".to_string()))?;

        let rows: Vec<BucketRow> = sql::fetch_all(
            &self.db,
            "SELECT rating, COUNT(*) AS count FROM reviews \
             WHERE product_id = $1 AND status = 'active' GROUP BY rating",
            vec![product_id.into()],
        )
        .await?;

        let distribution: Vec<RatingBucket> = (MIN_RATING..=MAX_RATING)
            .rev()
            .map(|rating| RatingBucket {
                rating,
                count: rows
                    .iter()
                    .find(|r| r.rating == rating)
                    .map_or(0, |r| r.count),
            })
            .collect();

        Ok(ReviewStats {
            product_id,
            total_reviews: distribution.iter().map(|b| b.count).sum(),
            average_rating: average_rating(&distribution),
            distribution,
        })
    }

    /// One active review per user and product; a second one is a 409.
    pub async fn create(
        &self,
        product_id: i32,
        user_id: i32,
        rating: i32,
        comment: String,
        media: Option<Vec<String>>,
    ) -> AppResult<ReviewView> {
        check_rating(rating)?;
        Product::find_by_id(product_id)
            .filter(product::Column::Status.eq(ProductStatus::Active.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Sản phẩm không tồn tại".to_string()))?;

        let now = chrono::Utc::now().naive_utc();
        let created = review::ActiveModel {
            product_id: Set(product_id),
            user_id: Set(user_id),
            rating: Set(rating),
            comment: Set(comment),
            media: Set(encode_list(media.as_deref())),
            helpful_count: Set(0),
            status: Set(ReviewStatus::Active.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .or_conflict("Bạn đã đánh giá sản phẩm này rồi")?;

        self.view(created.id).await
    }

    pub async fn find_editable(&self, review_id: i32) -> AppResult<ReviewModel> {
        Review::find_by_id(review_id)
            .filter(review::Column::Status.ne(ReviewStatus::Deleted.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(gone)
    }

    pub async fn update(&self, existing: ReviewModel, input: ReviewUpdate) -> AppResult<ReviewView> {
        if let Some(rating) = input.rating {
            check_rating(rating)?;
        }

        let review_id = existing.id;
        let mut active: review::ActiveModel = existing.into();
        if let Some(rating) = input.rating {
            active.rating = Set(rating);
        }
        if let Some(comment) = input.comment {
            active.comment = Set(comment);
        }
        if input.media.is_some() {
            active.media = Set(encode_list(input.media.as_deref()));
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;
        self.view(review_id).await
    }

    pub async fn soft_delete(&self, review_id: i32) -> AppResult<()> {
        let result = Review::update_many()
            .col_expr(review::Column::Status, Expr::value(ReviewStatus::Deleted.as_str()))
            .col_expr(review::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(review::Column::Id.eq(review_id))
            .filter(review::Column::Status.ne(ReviewStatus::Deleted.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(gone());
        }
        Ok(())
    }

    /// Anyone may vote; returns the new count.
    pub async fn mark_helpful(&self, review_id: i32) -> AppResult<i32> {
        let result = Review::update_many()
            .col_expr(
                review::Column::HelpfulCount,
                Expr::col(review::Column::HelpfulCount).add(1),
            )
            .filter(review::Column::Id.eq(review_id))
            .filter(review::Column::Status.eq(ReviewStatus::Active.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(not_found());
        }
        Ok(self.view(review_id).await?.helpful_count)
    }

    pub async fn admin_list(
        &self,
        filter: ReviewFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ReviewView>, u64)> {
        self.page(filter, sort, pagination).await
    }

    pub async fn update_status(&self, review_id: i32, status: ReviewStatus) -> AppResult<ReviewView> {
        let existing = Review::find_by_id(review_id)
            .one(&self.db)
            .await?
            .ok_or_else(not_found)?;
        let current = ReviewStatus::coerce(Some(&existing.status), ReviewStatus::Active);
        if !current.can_become(status) {
            return Err(AppError::Validation(
                "Không thể khôi phục đánh giá đã xóa".to_string(),
            ));
        }

        let mut active: review::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active
            .update(&self.db)
            .await
            .or_conflict("Người dùng đã có một đánh giá khác cho sản phẩm này")?;
        self.view(review_id).await
    }

    pub async fn hard_delete(&self, review_id: i32) -> AppResult<()> {
        let result = Review::delete_by_id(review_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}
