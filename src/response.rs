use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

/// The `{success, message, data}` envelope every endpoint answers with.
///
/// The HTTP status travels next to the body: handlers may set it
/// explicitly, otherwise it is 200 for successes and 400 for failures.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Server-side error detail, only filled in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    status: Option<StatusCode>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
            status: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> StatusCode {
        match self.status {
            Some(status) => status,
            None if self.success => StatusCode::OK,
            None => StatusCode::BAD_REQUEST,
        }
    }
}

impl ApiResponse<()> {
    /// A success envelope without a data payload.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: None,
            status: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: pagination.total_pages(total),
        }
    }
}

/// 1-indexed page window. Limits are taken as given; only callers that
/// explicitly need a bounded window clamp them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

impl Pagination {
    pub const DEFAULT_PAGE: u64 = 1;
    pub const DEFAULT_LIMIT: u64 = 10;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(Self::DEFAULT_PAGE),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT),
        }
    }

    pub fn clamp_limit(self, min: u64, max: u64) -> Self {
        Self {
            limit: self.limit.clamp(min, max),
            ..self
        }
    }

    /// Saturates instead of overflowing on huge page or limit values.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        if self.limit == 0 {
            0
        } else {
            total.div_ceil(self.limit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(total: u64, limit: u64) -> u64 {
        PaginatedResponse::<String>::new(vec![], total, Pagination::new(Some(1), Some(limit)))
            .total_pages
    }

    #[test]
    fn total_pages_basic() {
        assert_eq!(pages(100, 20), 5);
    }

    #[test]
    fn total_pages_with_remainder() {
        assert_eq!(pages(101, 20), 6);
    }

    #[test]
    fn total_pages_zero_limit() {
        assert_eq!(pages(10, 0), 0);
    }

    #[test]
    fn total_pages_zero_total() {
        assert_eq!(pages(0, 20), 0);
    }

    #[test]
    fn offset_follows_page_math() {
        for page in 1..=7u64 {
            for limit in 1..=25u64 {
                let p = Pagination::new(Some(page), Some(limit));
                assert_eq!(p.offset(), (page - 1) * limit);
            }
        }
    }

    #[test]
    fn defaults_are_first_page_of_ten() {
        let p = Pagination::new(None, None);
        assert_eq!((p.page, p.limit), (1, 10));
    }

    #[test]
    fn huge_page_and_limit_saturate() {
        let p = Pagination::new(Some(10_000_000_000), Some(10_000_000_000));
        assert_eq!(p.offset(), u64::MAX);
        assert_eq!(p.total_pages(12), 1);
    }

    #[test]
    fn zero_page_is_safe() {
        assert_eq!(Pagination::new(Some(0), Some(20)).offset(), 0);
    }

    #[test]
    fn limits_are_not_clamped_unless_asked() {
        let p = Pagination::new(Some(1), Some(5000));
        assert_eq!(p.limit, 5000);
        assert_eq!(p.clamp_limit(1, 10).limit, 10);
        assert_eq!(Pagination::new(None, Some(0)).clamp_limit(1, 10).limit, 1);
    }

    #[test]
    fn default_status_follows_success_flag() {
        assert_eq!(ApiResponse::done("ok").status(), StatusCode::OK);
        assert_eq!(ApiResponse::<()>::error("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiResponse::ok(1, "created")
                .with_status(StatusCode::CREATED)
                .status(),
            StatusCode::CREATED
        );
    }

    #[test]
    fn envelope_omits_missing_data() {
        let json = serde_json::to_value(ApiResponse::<()>::error("x")).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("data").is_none());
        assert!(json.get("error").is_none());
    }
}
