use crate::{
    error::{AppError, AppResult, OrConflict},
    models::{category, Category, CategoryModel, CategoryStatus},
    services::sql::{self, Filters},
};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, Set,
};
use serde::Serialize;
use utoipa::ToSchema;

const CATEGORY_SELECT: &str = "c.id, c.name, c.description, c.parent_id, c.image, c.icon, \
    c.status, c.created_at, c.updated_at, \
    (SELECT COUNT(*) FROM posts p WHERE p.category_id = c.id AND p.status = 'active') AS post_count, \
    (SELECT COUNT(*) FROM products pr WHERE pr.category_id = c.id AND pr.status = 'active') \
        AS product_count";

const DUPLICATE: &str = "Danh mục đã tồn tại";

#[derive(Debug, Clone, Serialize, FromQueryResult, ToSchema)]
pub struct CategoryView {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub status: String,
    pub post_count: i64,
    pub product_count: i64,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryNode {
    #[serde(flatten)]
    pub category: CategoryView,
    pub children: Vec<CategoryView>,
}

#[derive(Debug, Default)]
pub struct CategoryFilter {
    /// `Some(None)` selects roots only.
    pub parent_id: Option<Option<i32>>,
    pub status: Option<CategoryStatus>,
}

#[derive(Debug)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    pub image: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Default)]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` moves the category to the root level.
    pub parent_id: Option<Option<i32>>,
    pub image: Option<String>,
    pub icon: Option<String>,
    pub status: Option<CategoryStatus>,
}

/// Groups children under their roots, keeping the input order.
pub fn build_tree(categories: Vec<CategoryView>) -> Vec<CategoryNode> {
    let (roots, children): (Vec<_>, Vec<_>) =
        categories.into_iter().partition(|c| c.parent_id.is_none());

    roots
        .into_iter()
        .map(|root| {
            let kids = children
                .iter()
                .filter(|c| c.parent_id == Some(root.id))
                .cloned()
                .collect();
            CategoryNode {
                category: root,
                children: kids,
            }
        })
        .collect()
}

fn not_found() -> AppError {
    AppError::NotFound("Danh mục không tồn tại".to_string())
}

pub struct CategoryService {
    db: DatabaseConnection,
}

impl CategoryService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn fetch(&self, filters: Filters) -> AppResult<Vec<CategoryView>> {
        let sql = format!(
            "SELECT {CATEGORY_SELECT} FROM categories c {} ORDER BY c.name ASC, c.id ASC",
            filters.where_sql()
        );
        sql::fetch_all(&self.db, &sql, filters.values()).await
    }

    pub async fn list(&self, filter: CategoryFilter) -> AppResult<Vec<CategoryView>> {
        let status = filter.status.unwrap_or(CategoryStatus::Active);
        let mut filters = Filters::new().bind("c.status = ?", status.as_str());
        filters = match filter.parent_id {
            Some(Some(parent_id)) => filters.bind("c.parent_id = ?", parent_id),
            Some(None) => filters.raw("c.parent_id IS NULL"),
            None => filters,
        };
        self.fetch(filters).await
    }

    pub async fn get(&self, category_id: i32) -> AppResult<CategoryNode> {
        let category = self
            .fetch(Filters::new().bind("c.id = ?", category_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(not_found)?;
        let children = self
            .fetch(
                Filters::new()
                    .bind("c.parent_id = ?", category_id)
                    .bind("c.status = ?", CategoryStatus::Active.as_str()),
            )
            .await?;
        Ok(CategoryNode { category, children })
    }

    pub async fn tree(&self) -> AppResult<Vec<CategoryNode>> {
        let all = self
            .fetch(Filters::new().bind("c.status = ?", CategoryStatus::Active.as_str()))
            .await?;
        Ok(build_tree(all))
    }

    async fn find(&self, category_id: i32) -> AppResult<CategoryModel> {
        Category::find_by_id(category_id)
            .one(&self.db)
            .await?
            .ok_or_else(not_found)
    }

    /// A parent must exist and be a root; the tree is two levels deep.
    async fn check_parent(&self, parent_id: i32) -> AppResult<()> {
        let parent = Category::find_by_id(parent_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Validation("Danh mục cha không tồn tại".to_string()))?;
        if !parent.is_root() {
            return Err(AppError::Validation(
                "Danh mục chỉ hỗ trợ tối đa hai cấp".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create(&self, input: NewCategory) -> AppResult<CategoryNode> {
        if let Some(parent_id) = input.parent_id {
            self.check_parent(parent_id).await?;
        }

        let now = chrono::Utc::now().naive_utc();
        let created = category::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            parent_id: Set(input.parent_id),
            image: Set(input.image),
            icon: Set(input.icon),
            status: Set(CategoryStatus::Active.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .or_conflict(DUPLICATE)?;

        self.get(created.id).await
    }

    pub async fn update(&self, category_id: i32, input: CategoryUpdate) -> AppResult<CategoryNode> {
        let existing = self.find(category_id).await?;

        if let Some(Some(parent_id)) = input.parent_id {
            if parent_id == category_id {
                return Err(AppError::Validation(
                    "Danh mục không thể là cha của chính nó".to_string(),
                ));
            }
            self.check_parent(parent_id).await?;
            let children = Category::find()
                .filter(category::Column::ParentId.eq(category_id))
                .count(&self.db)
                .await?;
            if children > 0 {
                return Err(AppError::Validation(
                    "Danh mục chỉ hỗ trợ tối đa hai cấp".to_string(),
                ));
            }
        }

        let mut active: category::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(parent_id) = input.parent_id {
            active.parent_id = Set(parent_id);
        }
        if let Some(image) = input.image {
            active.image = Set(Some(image));
        }
        if let Some(icon) = input.icon {
            active.icon = Set(Some(icon));
        }
        if let Some(status) = input.status {
            active.status = Set(status.to_string());
        }
        active.updated_at = Set(chrono::Utc::now().naive_utc());
        active.update(&self.db).await.or_conflict(DUPLICATE)?;

        self.get(category_id).await
    }

    /// Deactivates the category. A second call reports not found.
    pub async fn soft_delete(&self, category_id: i32) -> AppResult<()> {
        let result = Category::update_many()
            .col_expr(category::Column::Status, Expr::value(CategoryStatus::Inactive.as_str()))
            .col_expr(category::Column::UpdatedAt, Expr::value(chrono::Utc::now().naive_utc()))
            .filter(category::Column::Id.eq(category_id))
            .filter(category::Column::Status.ne(CategoryStatus::Inactive.as_str()))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(
                "Danh mục không tồn tại hoặc đã bị vô hiệu hóa".to_string(),
            ));
        }
        Ok(())
    }
}
