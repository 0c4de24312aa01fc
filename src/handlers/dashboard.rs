use crate::{
    dispatch::{action_table, ActionRequest},
    error::{AppError, AppResult},
    handlers::ok,
    response::ApiResponse,
    services::dashboard::{
        clamp_days, DashboardService, DashboardStats, MAX_CHART_DAYS, MAX_GROWTH_DAYS,
    },
    utils::lenient::opt_parse,
};
use axum::response::Response;
use serde::Deserialize;

action_table!(pub enum DashboardAction in "dashboard" {
    Stats => "stats" [Get],
    RecentActivity => "recent_activity" [Get],
    SystemInfo => "system_info" [Get],
    Reports => "reports" [Get],
    ActivityChart => "activity_chart" [Get],
    TopCategories => "top_categories" [Get],
    UserGrowth => "user_growth" [Get],
});

const DEFAULT_ACTIVITY_LIMIT: u64 = 10;
const DEFAULT_TOP_CATEGORIES: u64 = 5;
const DEFAULT_CHART_DAYS: u64 = 7;
const DEFAULT_GROWTH_DAYS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    #[serde(default, deserialize_with = "opt_parse")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "opt_parse")]
    days: Option<u64>,
}

impl DashboardQuery {
    fn limit(&self, default: u64) -> u64 {
        self.limit.unwrap_or(default).max(1)
    }
}

#[utoipa::path(
    get,
    path = "/api/dashboard",
    params(
        ("action" = String, Query, description = "stats, recent_activity, system_info, reports, activity_chart, top_categories, user_growth"),
        ("limit" = Option<u64>, Query, description = "recent_activity and top_categories"),
        ("days" = Option<u64>, Query, description = "activity_chart (max 90) and user_growth (max 365)"),
    ),
    responses(
        (status = 200, description = "Stats, activity lists, system info, reports or chart series depending on action", body = ApiResponse<DashboardStats>),
        (status = 401, description = "Not logged in", body = AppError),
        (status = 403, description = "Not an admin", body = AppError),
        (status = 405, description = "Dashboard is read-only", body = AppError),
    ),
    tag = "admin"
)]
pub async fn handle(req: ActionRequest) -> AppResult<Response> {
    let action = req.resolve::<DashboardAction>()?;
    req.session.require_admin()?;
    let query: DashboardQuery = req.input()?;
    let service = DashboardService::new(req.db.clone());

    match action {
        DashboardAction::Stats => ok(service.stats().await?, "Lấy thống kê thành công"),
        DashboardAction::RecentActivity => {
            let items = service
                .recent_activity(query.limit(DEFAULT_ACTIVITY_LIMIT))
                .await?;
            ok(items, "Lấy hoạt động gần đây thành công")
        }
        DashboardAction::SystemInfo => {
            ok(service.system_info().await?, "Lấy thông tin hệ thống thành công")
        }
        DashboardAction::Reports => ok(service.reports().await?, "Lấy báo cáo thành công"),
        DashboardAction::ActivityChart => {
            let days = clamp_days(query.days, DEFAULT_CHART_DAYS, MAX_CHART_DAYS);
            ok(
                service.activity_chart(days).await?,
                "Lấy biểu đồ hoạt động thành công",
            )
        }
        DashboardAction::TopCategories => {
            let categories = service
                .top_categories(query.limit(DEFAULT_TOP_CATEGORIES))
                .await?;
            ok(categories, "Lấy danh mục nổi bật thành công")
        }
        DashboardAction::UserGrowth => {
            let days = clamp_days(query.days, DEFAULT_GROWTH_DAYS, MAX_GROWTH_DAYS);
            ok(
                service.user_growth(days).await?,
                "Lấy tăng trưởng người dùng thành công",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{resolve, validate_table, Action, Verb};
    use serde_json::json;

    #[test]
    fn table_is_get_only() {
        validate_table::<DashboardAction>().unwrap();
        for action in DashboardAction::ALL {
            assert_eq!(action.verbs(), &[Verb::Get]);
        }
        assert!(matches!(
            resolve::<DashboardAction>(Verb::Post, Some("stats")),
            Err(AppError::MethodNotAllowed)
        ));
    }

    #[test]
    fn limits_default_and_stay_positive() {
        let q: DashboardQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(q.limit(DEFAULT_ACTIVITY_LIMIT), 10);
        let q: DashboardQuery = serde_json::from_value(json!({"limit": "0"})).unwrap();
        assert_eq!(q.limit(DEFAULT_ACTIVITY_LIMIT), 1);
        let q: DashboardQuery = serde_json::from_value(json!({"limit": 250})).unwrap();
        assert_eq!(q.limit(DEFAULT_ACTIVITY_LIMIT), 250);
    }
}
