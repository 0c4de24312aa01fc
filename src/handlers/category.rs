use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, require_id, IdParam},
    models::CategoryStatus,
    response::ApiResponse,
    services::{
        action_log,
        category::{
            CategoryFilter, CategoryNode, CategoryService, CategoryUpdate, CategoryView,
            NewCategory,
        },
    },
    utils::{
        lenient::{opt_parse, opt_trimmed},
        strip_tags, validate_payload,
    },
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use utoipa::ToSchema;
use validator::Validate;

action_table!(pub enum CategoryAction in "categories" {
    List => "list" [Get],
    Get => "get" [Get],
    Tree => "tree" [Get],
    Create => "create" [Post],
    Update => "update" [Put, Post],
    Delete => "delete" [Delete],
});

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CategoryRequest {
    /// Required for update
    #[serde(default, alias = "category_id", deserialize_with = "opt_parse")]
    pub id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(max = 100, message = "Tên danh mục tối đa 100 ký tự"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub description: Option<String>,
    /// Root category id; `null`, `0` or `root` detaches
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<i32>)]
    pub parent_id: Option<Value>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub icon: Option<String>,
    /// active or inactive
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default, deserialize_with = "present")]
    parent_id: Option<Value>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

/// Keeps an explicit `null` distinct from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// `Ok(None)` means "no parent".
fn parent_ref(value: &Value) -> AppResult<Option<i32>> {
    let invalid = || AppError::Validation("Danh mục cha không hợp lệ".to_string());
    let text = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_ascii_lowercase(),
        _ => return Err(invalid()),
    };
    match text.as_str() {
        "" | "0" | "null" | "root" => Ok(None),
        other => other
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .map(Some)
            .ok_or_else(invalid),
    }
}

fn parse_status(raw: Option<&str>) -> AppResult<Option<CategoryStatus>> {
    raw.map(|s| {
        s.parse()
            .map_err(|_| AppError::Validation("Trạng thái danh mục không hợp lệ".to_string()))
    })
    .transpose()
}

fn category_id(id: Option<i32>) -> AppResult<i32> {
    require_id(id, "Thiếu ID danh mục")
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/categories",
    params(
        ("action" = String, Query, description = "list, get, tree, create, update, delete"),
        ("id" = Option<i32>, Query, description = "Category id for get, update and delete"),
        ("parent_id" = Option<String>, Query, description = "list: children of this id, or `root`"),
    ),
    request_body(content = CategoryRequest, description = "JSON or form"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<Vec<CategoryView>>),
        (status = 201, description = "Category created", body = ApiResponse<CategoryNode>),
        (status = 400, description = "Validation error or unknown action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not an admin", body = AppError),
        (status = 404, description = "Category not found", body = AppError),
        (status = 409, description = "Duplicate name under the same parent", body = AppError),
    ),
    tag = "categories"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let service = CategoryService::new(req.db.clone());

    match req.resolve::<CategoryAction>()? {
        CategoryAction::List => {
            let query: ListQuery = req.input()?;
            let status = if req.session.is_admin() {
                query.status.as_deref().and_then(|s| s.parse().ok())
            } else {
                None
            };
            let filter = CategoryFilter {
                parent_id: query.parent_id.as_ref().map(parent_ref).transpose()?,
                status,
            };
            let categories = service.list(filter).await?;
            ok(categories, "Lấy danh sách danh mục thành công")
        }
        CategoryAction::Get => {
            let IdParam { id } = req.input()?;
            let category = service.get(category_id(id)?).await?;
            ok(category, "Lấy danh mục thành công")
        }
        CategoryAction::Tree => {
            let tree = service.tree().await?;
            ok(tree, "Lấy cây danh mục thành công")
        }
        CategoryAction::Create => {
            req.session.require_admin()?;
            let input: CategoryRequest = req.input()?;
            let details = json!({ "name": input.name, "parent_id": input.parent_id });
            let result = async {
                validate_payload(&input)?;
                let name = strip_tags(input.name.as_deref().unwrap_or_default());
                if name.is_empty() {
                    return Err(AppError::Validation("Vui lòng nhập tên danh mục".to_string()));
                }
                let parent_id = match &input.parent_id {
                    Some(value) => parent_ref(value)?,
                    None => None,
                };
                service
                    .create(NewCategory {
                        name,
                        description: input.description.clone(),
                        parent_id,
                        image: input.image.clone(),
                        icon: input.icon.clone(),
                    })
                    .await
            }
            .await;
            let category = action_log::record(&req.session, "create_category", details, result)?;
            Ok(ApiResponse::ok(category, "Tạo danh mục thành công")
                .with_status(StatusCode::CREATED)
                .into_response())
        }
        CategoryAction::Update => {
            req.session.require_admin()?;
            let input: CategoryRequest = req.input()?;
            let details = json!({ "category_id": input.id, "name": input.name });
            let result = async {
                validate_payload(&input)?;
                let id = category_id(input.id)?;
                let update = CategoryUpdate {
                    name: input
                        .name
                        .as_deref()
                        .map(strip_tags)
                        .filter(|n| !n.is_empty()),
                    description: input.description.clone(),
                    parent_id: input.parent_id.as_ref().map(parent_ref).transpose()?,
                    image: input.image.clone(),
                    icon: input.icon.clone(),
                    status: parse_status(input.status.as_deref())?,
                };
                service.update(id, update).await
            }
            .await;
            let category = action_log::record(&req.session, "update_category", details, result)?;
            ok(category, "Cập nhật danh mục thành công")
        }
        CategoryAction::Delete => {
            req.session.require_admin()?;
            let IdParam { id } = req.input()?;
            let details = json!({ "category_id": id });
            let result = async { service.soft_delete(category_id(id)?).await }.await;
            action_log::record(&req.session, "delete_category", details, result)?;
            done("Đã vô hiệu hóa danh mục")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::validate_table;

    #[test]
    fn table_is_valid() {
        validate_table::<CategoryAction>().unwrap();
    }

    #[test]
    fn parent_references() {
        assert_eq!(parent_ref(&json!(null)).unwrap(), None);
        assert_eq!(parent_ref(&json!("root")).unwrap(), None);
        assert_eq!(parent_ref(&json!(0)).unwrap(), None);
        assert_eq!(parent_ref(&json!("7")).unwrap(), Some(7));
        assert_eq!(parent_ref(&json!(7)).unwrap(), Some(7));
        assert!(parent_ref(&json!("-2")).is_err());
        assert!(parent_ref(&json!([1])).is_err());
    }

    #[test]
    fn absent_and_null_parent_differ() {
        let absent: CategoryRequest = serde_json::from_value(json!({"name": "A"})).unwrap();
        assert!(absent.parent_id.is_none());

        let detached: CategoryRequest =
            serde_json::from_value(json!({"name": "A", "parent_id": null})).unwrap();
        assert_eq!(detached.parent_id, Some(Value::Null));
    }
}
