use crate::{
    error::{AppError, AppResult},
    models::{
        category, product, review, Category, CategoryStatus, Product, ProductModel,
        ProductStatus, Review,
    },
    response::Pagination,
    services::{
        sql::{self, Filters},
        views::{Author, CategoryRef, AUTHOR_COLUMNS},
    },
    utils::{
        json_column::{decode_list, decode_object, encode_list, encode_object},
        sort::{SortKey, SortTable},
    },
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, Set, TransactionTrait,
};
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

pub const PRODUCT_SORT: SortTable = SortTable {
    newest: "p.created_at DESC, p.id DESC",
    oldest: "p.created_at ASC, p.id ASC",
    views: Some("p.view_count DESC, p.created_at DESC"),
    comments: Some("review_count DESC, p.created_at DESC"),
    rating: Some("avg_rating DESC NULLS LAST, p.created_at DESC"),
};

const PRODUCT_FROM: &str =
    "products p JOIN users u ON u.id = p.creator_id LEFT JOIN categories c ON c.id = p.category_id";

fn product_select() -> String {
    format!(
        "p.id, p.name, p.description, p.price, p.category_id, p.creator_id, p.images, p.specs, \
         p.status, p.view_count, p.created_at, p.updated_at, \
         {AUTHOR_COLUMNS}, c.name AS category_name, \
         (SELECT COUNT(*) FROM reviews r WHERE r.product_id = p.id AND r.status = 'active') \
            AS review_count, \
         (SELECT AVG(r.rating)::float8 FROM reviews r \
            WHERE r.product_id = p.id AND r.status = 'active') AS avg_rating"
    )
}

#[derive(Debug, FromQueryResult)]
pub struct ProductRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category_id: i32,
    pub creator_id: i32,
    pub images: Option<String>,
    pub specs: Option<String>,
    pub status: String,
    pub view_count: i32,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub author_username: String,
    pub author_full_name: String,
    pub author_picture: Option<String>,
    pub category_name: Option<String>,
    pub review_count: i64,
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductView {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub images: Option<Vec<String>>,
    #[schema(value_type = Option<Object>)]
    pub specs: Option<Map<String, Value>>,
    pub status: String,
    pub view_count: i32,
    pub review_count: i64,
    pub avg_rating: Option<f64>,
    pub creator: Author,
    pub category: CategoryRef,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl From<ProductRow> for ProductView {
    fn from(row: ProductRow) -> Self {
        Self {
            images: decode_list(row.images.as_deref()),
            specs: decode_object(row.specs.as_deref()),
            creator: Author {
                id: row.creator_id,
                username: row.author_username,
                full_name: row.author_full_name,
                profile_picture: row.author_picture,
            },
            category: CategoryRef {
                id: row.category_id,
                name: row.category_name,
            },
            avg_rating: row.avg_rating.map(|r| (r * 10.0).round() / 10.0),
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            status: row.status,
            view_count: row.view_count,
            review_count: row.review_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Default)]
pub struct ProductFilter {
    pub category_id: Option<i32>,
    pub creator_id: Option<i32>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Admin listings only; public listings always show active products.
    pub status: Option<ProductStatus>,
}

impl ProductFilter {
    fn to_filters(&self) -> Filters {
        let mut filters = Filters::new()
            .bind_opt("p.category_id = ?", self.category_id)
            .bind_opt("p.creator_id = ?", self.creator_id)
            .bind_opt("p.price >= ?", self.min_price)
            .bind_opt("p.price <= ?", self.max_price)
            .bind_opt("p.status = ?", self.status.map(|s| s.as_str()));
        if let Some(term) = &self.search {
            let pattern = sql::like_pattern(term);
            filters = filters.bind_all(
                "(p.name ILIKE ? OR p.description ILIKE ?)",
                vec![pattern.clone().into(), pattern.into()],
            );
        }
        filters
    }
}

#[derive(Debug)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category_id: i32,
    pub creator_id: i32,
    pub images: Option<Vec<String>>,
    pub specs: Option<Map<String, Value>>,
    pub status: ProductStatus,
}

#[derive(Debug, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub category_id: Option<i32>,
    pub images: Option<Vec<String>>,
    pub specs: Option<Map<String, Value>>,
    pub status: Option<ProductStatus>,
}

pub fn check_price(price: Decimal) -> AppResult<()> {
    if price.is_sign_negative() {
        return Err(AppError::Validation("Giá sản phẩm không được âm".to_string()));
    }
    Ok(())
}

fn not_found() -> AppError {
    AppError::NotFound("Sản phẩm không tồn tại".to_string())
}

fn gone() -> AppError {
    AppError::NotFound("Sản phẩm không tồn tại hoặc đã ngừng kinh doanh".to_string())
}

pub struct ProductService {
    db: DatabaseConnection,
}

impl ProductService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn page(
        &self,
        filter: ProductFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ProductView>, u64)> {
        let (rows, total) = sql::fetch_page::<ProductRow, _>(
            &self.db,
            &product_select(),
            PRODUCT_FROM,
            &filter.to_filters(),
            PRODUCT_SORT.order_by(sort),
            pagination,
        )
        .await?;
        Ok((rows.into_iter().map(ProductView::from).collect(), total))
    }

    async fn view(&self, product_id: i32) -> AppResult<ProductView> {
        let sql = format!("SELECT {} FROM {PRODUCT_FROM} WHERE p.id = $1", product_select());
        let row: Option<ProductRow> =
            sql::fetch_one(&self.db, &sql, vec![product_id.into()]).await?;
        row.map(ProductView::from).ok_or_else(not_found)
    }

    pub async fn list(
        &self,
        filter: ProductFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ProductView>, u64)> {
        let filter = ProductFilter {
            status: Some(ProductStatus::Active),
            ..filter
        };
        self.page(filter, sort, pagination).await
    }

    /// Public read of an active product; counts one view.
    pub async fn get(&self, product_id: i32) -> AppResult<ProductView> {
        let bumped = Product::update_many()
            .col_expr(
                product::Column::ViewCount,
                Expr::col(product::Column::ViewCount).add(1),
            )
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Status.eq(ProductStatus::Active.as_str()))
            .exec(&self.db)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(not_found());
        }
        self.view(product_id).await
    }

    pub async fn list_by_user(
        &self,
        creator_id: i32,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ProductView>, u64)> {
        let filter = ProductFilter {
            creator_id: Some(creator_id),
            ..Default::default()
        };
        self.list(filter, sort, pagination).await
    }

    async fn check_category(&self, category_id: i32) -> AppResult<()> {
        let exists = Category::find_by_id(category_id)
            .filter(category::Column::Status.eq(CategoryStatus::Active.as_str()))
            .one(&self.db)
            .await?;
        if exists.is_none() {
            return Err(AppError::Validation("Danh mục không tồn tại".to_string()));
        }
        Ok(())
    }

    pub async fn create(&self, input: NewProduct) -> AppResult<ProductView> {
        check_price(input.price)?;
        self.check_category(input.category_id).await?;

        let now = chrono::Utc::now().naive_utc();
        let created = product::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            category_id: Set(input.category_id),
            creator_id: Set(input.creator_id),
            images: Set(encode_list(input.images.as_deref())),
            specs: Set(encode_object(input.specs.as_ref())),
            status: Set(input.status.to_string()),
            view_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        self.view(created.id).await
    }

    pub async fn find(&self, product_id: i32) -> AppResult<ProductModel> {
        Product::find_by_id(product_id)
            .one(&self.db)
            .await?
            .ok_or_else(not_found)
    }

    pub async fn update(&self, existing: ProductModel, input: ProductUpdate) -> AppResult<ProductView> {
        if let Some(price) = input.price {
            check_price(price)?;
        }
        if let Some(category_id) = input.category_id {
            self.check_category(category_id).await?;
        }

        let product_id = existing.id;
        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if input.images.is_some() {
            active.images = Set(encode_list(input.images.as_deref()));
        }
        if input.specs.is_some() {
            active.specs = Set(encode_object(input.specs.as_ref()));
        }
        if let Some(status) = input.status {
            active.status = Set(status.to_string());
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;

        self.view(product_id).await
    }

    /// Owner delete takes the product off sale. A product that is already
    /// inactive reports not found.
    pub async fn soft_delete(&self, product_id: i32) -> AppResult<()> {
        let result = Product::update_many()
            .col_expr(product::Column::Status, Expr::value(ProductStatus::Inactive.as_str()))
            .col_expr(product::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Status.ne(ProductStatus::Inactive.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(gone());
        }
        Ok(())
    }

    pub async fn admin_list(
        &self,
        filter: ProductFilter,
        sort: Option<SortKey>,
        pagination: Pagination,
    ) -> AppResult<(Vec<ProductView>, u64)> {
        self.page(filter, sort, pagination).await
    }

    pub async fn update_status(
        &self,
        product_id: i32,
        status: ProductStatus,
    ) -> AppResult<ProductView> {
        let existing = self.find(product_id).await?;
        let mut active: product::ActiveModel = existing.into();
        active.status = Set(status.to_string());
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await?;
        self.view(product_id).await
    }

    /// Removes the product's reviews, then the product.
    pub async fn hard_delete(&self, product_id: i32) -> AppResult<u64> {
        let txn = self.db.begin().await?;
        let result = async {
            let reviews = Review::delete_many()
                .filter(review::Column::ProductId.eq(product_id))
                .exec(&txn)
                .await?;
            let removed = Product::delete_by_id(product_id).exec(&txn).await?;
            if removed.rows_affected == 0 {
                return Err(not_found());
            }
            Ok(reviews.rows_affected)
        }
        .await;
        sql::finish(txn, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn negative_prices_rejected() {
        assert!(check_price(Decimal::from_str("-0.01").unwrap()).is_err());
        assert!(check_price(Decimal::ZERO).is_ok());
        assert!(check_price(Decimal::from_str("199000.50").unwrap()).is_ok());
    }

    #[test]
    fn rating_sort_puts_unrated_last() {
        assert_eq!(
            PRODUCT_SORT.order_by(Some(SortKey::Rating)),
            "avg_rating DESC NULLS LAST, p.created_at DESC"
        );
    }
}
