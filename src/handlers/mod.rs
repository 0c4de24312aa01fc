//! One handler per resource group. Each resolves `?action=` against its
//! action table and hands typed input to the services.

pub mod auth;
pub mod category;
pub mod comment;
pub mod dashboard;
pub mod follow;
pub mod post;
pub mod product;
pub mod review;
pub mod user;

use crate::{
    error::{AppError, AppResult},
    response::{ApiResponse, PaginatedResponse, Pagination},
    utils::{
        lenient::{opt_parse, opt_trimmed},
        sort::SortKey,
    },
};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// `page`, `limit` and `sort`, accepted on every listing action.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageParams {
    #[serde(default, deserialize_with = "opt_parse")]
    pub page: Option<u64>,
    #[serde(default, deserialize_with = "opt_parse")]
    pub limit: Option<u64>,
    /// newest, oldest, views, comments or rating
    #[serde(default, deserialize_with = "opt_trimmed")]
    pub sort: Option<String>,
}

impl PageParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }

    /// Unknown keys become `None`, which every sort table maps to newest.
    pub fn sort_key(&self) -> Option<SortKey> {
        self.sort.as_deref().and_then(|s| s.parse().ok())
    }
}

/// The `id` parameter most single-row actions take.
#[derive(Debug, Default, Deserialize)]
pub struct IdParam {
    #[serde(default, deserialize_with = "opt_parse")]
    pub id: Option<i32>,
}

pub fn require_id(id: Option<i32>, message: &str) -> AppResult<i32> {
    id.filter(|&id| id > 0)
        .ok_or_else(|| AppError::Validation(message.to_string()))
}

pub fn ok<T: Serialize>(data: T, message: &str) -> AppResult<Response> {
    Ok(ApiResponse::ok(data, message).into_response())
}

pub fn done(message: &str) -> AppResult<Response> {
    Ok(ApiResponse::done(message).into_response())
}

pub fn page<T: Serialize>(
    (items, total): (Vec<T>, u64),
    pagination: Pagination,
    message: &str,
) -> AppResult<Response> {
    ok(PaginatedResponse::new(items, total, pagination), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_params_are_lenient() {
        let p: PageParams =
            serde_json::from_value(json!({"page": "2", "limit": 50, "sort": "bogus"})).unwrap();
        assert_eq!(p.pagination(), Pagination::new(Some(2), Some(50)));
        assert_eq!(p.sort_key(), None);

        let p: PageParams = serde_json::from_value(json!({"page": "x"})).unwrap();
        assert_eq!(p.pagination(), Pagination::default());
    }

    #[test]
    fn ids_must_be_positive() {
        assert_eq!(require_id(Some(3), "x").unwrap(), 3);
        assert!(require_id(Some(0), "x").is_err());
        assert!(require_id(None, "x").is_err());
    }
}
