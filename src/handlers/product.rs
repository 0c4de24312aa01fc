use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::{done, ok, page, require_id, IdParam, PageParams},
    models::ProductStatus,
    response::{ApiResponse, PaginatedResponse},
    services::{
        action_log,
        product::{NewProduct, ProductFilter, ProductService, ProductUpdate, ProductView},
        upload::{UploadConfig, UploadService},
    },
    utils::{
        lenient::{opt_list, opt_object, opt_parse, opt_strict, opt_trimmed},
        strip_tags, validate_payload,
    },
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;
use validator::Validate;

action_table!(pub enum ProductAction in "products" {
    List => "list" [Get],
    Get => "get" [Get],
    ListByUser => "list_by_user" [Get],
    Create => "create" [Post],
    Update => "update" [Put, Post],
    Delete => "delete" [Delete],
});

action_table!(pub enum ProductAdminAction in "products_admin" {
    List => "list" [Get],
    UpdateStatus => "update_status" [Post, Put],
    Delete => "delete" [Delete, Post],
});

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ProductRequest {
    /// Required for update and delete
    #[serde(default, alias = "product_id", deserialize_with = "opt_parse")]
    pub id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    #[validate(length(max = 200, message = "Tên sản phẩm tối đa 200 ký tự"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub description: Option<String>,
    /// Decimal, never negative
    #[serde(default, deserialize_with = "opt_strict")]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_parse")]
    pub category_id: Option<i32>,
    #[serde(default, deserialize_with = "opt_list")]
    pub images: Option<Vec<String>>,
    /// Free-form specification object
    #[serde(default, deserialize_with = "opt_object")]
    #[schema(value_type = Option<Object>)]
    pub specs: Option<Map<String, Value>>,
    /// active, inactive or draft
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovedProduct {
    pub product_id: i32,
    pub removed_reviews: u64,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(flatten)]
    page: PageParams,
    #[serde(default, deserialize_with = "opt_parse")]
    category_id: Option<i32>,
    #[serde(default, alias = "creator_id", deserialize_with = "opt_parse")]
    user_id: Option<i32>,
    #[serde(default, alias = "q", deserialize_with = "opt_trimmed")]
    search: Option<String>,
    #[serde(default, deserialize_with = "opt_parse")]
    min_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_parse")]
    max_price: Option<Decimal>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

impl ListQuery {
    fn filter(self, status: Option<ProductStatus>) -> (ProductFilter, PageParams) {
        let filter = ProductFilter {
            category_id: self.category_id,
            creator_id: self.user_id,
            search: self.search,
            min_price: self.min_price,
            max_price: self.max_price,
            status,
        };
        (filter, self.page)
    }
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(default, alias = "product_id", deserialize_with = "opt_parse")]
    id: Option<i32>,
    #[serde(default, deserialize_with = "opt_trimmed")]
    status: Option<String>,
}

fn product_id(id: Option<i32>) -> AppResult<i32> {
    require_id(id, "Thiếu ID sản phẩm")
}

fn parse_status(raw: Option<&str>) -> AppResult<Option<ProductStatus>> {
    raw.map(|s| {
        s.parse()
            .map_err(|_| AppError::Validation("Trạng thái sản phẩm không hợp lệ".to_string()))
    })
    .transpose()
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/products",
    params(
        ("action" = String, Query, description = "list, get, list_by_user, create, update, delete"),
        ("id" = Option<i32>, Query, description = "Product id for get, update and delete"),
        PageParams,
    ),
    request_body(content = ProductRequest, description = "JSON, form or multipart with `images` files"),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<ProductView>>),
        (status = 201, description = "Product created", body = ApiResponse<ProductView>),
        (status = 400, description = "Validation error or unknown action", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not the creator", body = AppError),
        (status = 404, description = "Product not found", body = AppError),
    ),
    tag = "products"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let service = ProductService::new(req.db.clone());

    match req.resolve::<ProductAction>()? {
        ProductAction::List => {
            let (filter, params) = req.input::<ListQuery>()?.filter(None);
            let pagination = params.pagination();
            let result = service.list(filter, params.sort_key(), pagination).await?;
            page(result, pagination, "Lấy danh sách sản phẩm thành công")
        }
        ProductAction::Get => {
            let IdParam { id } = req.input()?;
            let product = service.get(product_id(id)?).await?;
            ok(product, "Lấy sản phẩm thành công")
        }
        ProductAction::ListByUser => {
            let query: ListQuery = req.input()?;
            let user_id = query
                .user_id
                .or(req.session.current_user_id())
                .ok_or_else(|| AppError::Validation("Thiếu ID người dùng".to_string()))?;
            let pagination = query.page.pagination();
            let result = service
                .list_by_user(user_id, query.page.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy sản phẩm của người dùng thành công")
        }
        ProductAction::Create => create(&req, &service).await,
        ProductAction::Update => {
            req.session.require_auth()?;
            let input: ProductRequest = req.input()?;
            validate_payload(&input)?;
            let existing = service.find(product_id(input.id)?).await?;
            req.session.require_owner_or_admin(existing.creator_id)?;

            let update = ProductUpdate {
                name: input.name.map(|n| strip_tags(&n)).filter(|n| !n.is_empty()),
                description: input.description,
                price: input.price,
                category_id: input.category_id,
                images: input.images,
                specs: input.specs,
                status: parse_status(input.status.as_deref())?,
            };
            let product = service.update(existing, update).await?;
            ok(product, "Cập nhật sản phẩm thành công")
        }
        ProductAction::Delete => {
            req.session.require_auth()?;
            let IdParam { id } = req.input()?;
            let existing = service.find(product_id(id)?).await?;
            req.session.require_owner_or_admin(existing.creator_id)?;
            service.soft_delete(existing.id).await?;
            done("Xóa sản phẩm thành công")
        }
    }
}

async fn create(req: &ActionRequest, service: &ProductService) -> AppResult<Response> {
    let creator_id = req.session.require_auth()?;
    let input: ProductRequest = req.input()?;
    validate_payload(&input)?;

    let name = strip_tags(input.name.as_deref().unwrap_or_default());
    if name.is_empty() {
        return Err(AppError::Validation("Vui lòng nhập tên sản phẩm".to_string()));
    }
    let description = input
        .description
        .ok_or_else(|| AppError::Validation("Vui lòng nhập mô tả sản phẩm".to_string()))?;
    let price = input
        .price
        .ok_or_else(|| AppError::Validation("Vui lòng nhập giá sản phẩm".to_string()))?;
    let category_id = require_id(input.category_id, "Vui lòng chọn danh mục")?;
    let status = parse_status(input.status.as_deref())?.unwrap_or(ProductStatus::Active);

    let files: Vec<_> = req.files("images").collect();
    let upload_config = req.extension::<UploadConfig>()?;
    let uploaded = UploadService::save_images(&upload_config, &files, "products").await?;
    let images = match input.images {
        Some(mut images) => {
            images.extend(uploaded.iter().cloned());
            Some(images)
        }
        None if uploaded.is_empty() => None,
        None => Some(uploaded.clone()),
    };

    let created = service
        .create(NewProduct {
            name,
            description,
            price,
            category_id,
            creator_id,
            images,
            specs: input.specs,
            status,
        })
        .await;

    let product = match created {
        Ok(product) => product,
        Err(e) => {
            UploadService::discard(&upload_config, &uploaded).await;
            return Err(e);
        }
    };

    tracing::info!(product_id = product.id, creator_id, "Product created");
    Ok(ApiResponse::ok(product, "Tạo sản phẩm thành công")
        .with_status(StatusCode::CREATED)
        .into_response())
}

#[utoipa::path(
    method(get, post, put, delete),
    path = "/api/products_admin",
    params(
        ("action" = String, Query, description = "list, update_status, delete"),
        PageParams,
    ),
    responses(
        (status = 200, description = "Action completed", body = ApiResponse<PaginatedResponse<ProductView>>),
        (status = 400, description = "Invalid status or id", body = AppError),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not an admin", body = AppError),
        (status = 404, description = "Product not found", body = AppError),
    ),
    tag = "admin"
)]
pub async fn handle_admin(req: ActionRequest) -> AppResult<Response> {
    let action = req.resolve::<ProductAdminAction>()?;
    req.session.require_admin()?;
    let service = ProductService::new(req.db.clone());

    match action {
        ProductAdminAction::List => {
            let query: ListQuery = req.input()?;
            let status = query.status.as_deref().and_then(|s| s.parse().ok());
            let (filter, params) = query.filter(status);
            let pagination = params.pagination();
            let result = service
                .admin_list(filter, params.sort_key(), pagination)
                .await?;
            page(result, pagination, "Lấy danh sách sản phẩm thành công")
        }
        ProductAdminAction::UpdateStatus => {
            let input: StatusRequest = req.input()?;
            let details = json!({ "product_id": input.id, "status": input.status });
            let result = async {
                let id = product_id(input.id)?;
                let status = parse_status(input.status.as_deref())?.ok_or_else(|| {
                    AppError::Validation("Trạng thái sản phẩm không hợp lệ".to_string())
                })?;
                service.update_status(id, status).await
            }
            .await;
            let product =
                action_log::record(&req.session, "update_product_status", details, result)?;
            ok(product, "Cập nhật trạng thái sản phẩm thành công")
        }
        ProductAdminAction::Delete => {
            let IdParam { id } = req.input()?;
            let details = json!({ "product_id": id });
            let result = async {
                let id = product_id(id)?;
                let removed_reviews = service.hard_delete(id).await?;
                Ok::<_, AppError>(RemovedProduct {
                    product_id: id,
                    removed_reviews,
                })
            }
            .await;
            let removed = action_log::record(&req.session, "delete_product", details, result)?;
            ok(removed, "Đã xóa vĩnh viễn sản phẩm")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::validate_table;
    use std::str::FromStr;

    #[test]
    fn tables_are_valid() {
        validate_table::<ProductAction>().unwrap();
        validate_table::<ProductAdminAction>().unwrap();
    }

    #[test]
    fn price_must_be_a_number() {
        let input: ProductRequest =
            serde_json::from_value(json!({"name": "Máy ảnh", "price": "1250.50"})).unwrap();
        assert_eq!(input.price, Some(Decimal::from_str("1250.50").unwrap()));

        let input: ProductRequest = serde_json::from_value(json!({"price": 99.9})).unwrap();
        assert_eq!(input.price, Some(Decimal::from_str("99.9").unwrap()));

        assert!(serde_json::from_value::<ProductRequest>(json!({"price": "rẻ"})).is_err());
    }

    #[test]
    fn specs_accept_object_or_encoded_object() {
        let input: ProductRequest =
            serde_json::from_value(json!({"specs": "{\"ram\":\"8GB\"}"})).unwrap();
        assert_eq!(input.specs.unwrap()["ram"], "8GB");
        assert!(serde_json::from_value::<ProductRequest>(json!({"specs": "[1]"})).is_err());
    }

    #[test]
    fn statuses() {
        assert_eq!(parse_status(Some("draft")).unwrap(), Some(ProductStatus::Draft));
        assert_eq!(parse_status(None).unwrap(), None);
        assert!(parse_status(Some("sold")).is_err());
    }
}
