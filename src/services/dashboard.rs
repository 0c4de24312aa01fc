use crate::{
    error::{AppError, AppResult},
    services::sql,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Instant;
use utoipa::ToSchema;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Records process start for `system_info` uptime. Later calls are no-ops.
pub fn mark_started() {
    STARTED_AT.get_or_init(Instant::now);
}

const TODAY: &str = "date_trunc('day', NOW() AT TIME ZONE 'UTC')";

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users: i64,
    pub banned_users: i64,
    pub new_users_today: i64,
    pub total_posts: i64,
    pub active_posts: i64,
    pub new_posts_today: i64,
    pub total_comments: i64,
    pub total_products: i64,
    pub active_products: i64,
    pub total_reviews: i64,
    pub total_categories: i64,
}

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct ActivityItem {
    pub kind: String,
    pub id: i32,
    pub title: String,
    pub user_id: i32,
    pub username: String,
    pub created_at: chrono::NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemInfo {
    pub version: String,
    pub database_version: String,
    pub database_size_bytes: i64,
    pub server_time: chrono::NaiveDateTime,
    pub uptime_seconds: u64,
}

#[derive(Debug, FromQueryResult)]
struct DatabaseInfo {
    database_version: String,
    database_size_bytes: i64,
}

/// Row counts per status, keyed by table then status.
pub type StatusReport = BTreeMap<String, BTreeMap<String, i64>>;

#[derive(Debug, FromQueryResult)]
struct StatusCount {
    source: String,
    status: String,
    count: i64,
}

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct ActivityPoint {
    pub day: chrono::NaiveDate,
    pub posts: i64,
    pub comments: i64,
    pub reviews: i64,
    pub users: i64,
}

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct TopCategory {
    pub id: i32,
    pub name: String,
    pub post_count: i64,
    pub product_count: i64,
}

#[derive(Debug, Serialize, FromQueryResult, ToSchema)]
pub struct GrowthPoint {
    pub day: chrono::NaiveDate,
    pub new_users: i64,
    pub total_users: i64,
}

pub const MAX_CHART_DAYS: u64 = 90;
pub const MAX_GROWTH_DAYS: u64 = 365;

/// Day windows are clamped so a request cannot build an unbounded series.
pub fn clamp_days(days: Option<u64>, default: u64, max: u64) -> i64 {
    sql::to_i64(days.unwrap_or(default).clamp(1, max))
}

pub fn group_report(rows: Vec<(String, String, i64)>) -> StatusReport {
    let mut report = StatusReport::new();
    for (source, status, count) in rows {
        report.entry(source).or_default().insert(status, count);
    }
    report
}

pub struct DashboardService {
    db: DatabaseConnection,
}

impl DashboardService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn stats(&self) -> AppResult<DashboardStats> {
        let sql = format!(
            "SELECT \
                (SELECT COUNT(*) FROM users) AS total_users, \
                (SELECT COUNT(*) FROM users WHERE status = 'active') AS active_users, \
                (SELECT COUNT(*) FROM users WHERE status = 'banned') AS banned_users, \
                (SELECT COUNT(*) FROM users WHERE created_at >= {TODAY}) AS new_users_today, \
                (SELECT COUNT(*) FROM posts WHERE status <> 'deleted') AS total_posts, \
                (SELECT COUNT(*) FROM posts WHERE status = 'active') AS active_posts, \
                (SELECT COUNT(*) FROM posts WHERE created_at >= {TODAY}) AS new_posts_today, \
                (SELECT COUNT(*) FROM comments WHERE status <> 'deleted') AS total_comments, \
                (SELECT COUNT(*) FROM products) AS total_products, \
                (SELECT COUNT(*) FROM products WHERE status = 'active') AS active_products, \
                (SELECT COUNT(*) FROM reviews WHERE status <> 'deleted') AS total_reviews, \
                (SELECT COUNT(*) FROM categories WHERE status = 'active') AS total_categories"
        );
        sql::fetch_one(&self.db, &sql, vec![])
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Stats query returned no row")))
    }

    /// Newest posts, comments, reviews, products and sign-ups, merged.
    pub async fn recent_activity(&self, limit: u64) -> AppResult<Vec<ActivityItem>> {
        let sql = "SELECT * FROM ( \
                SELECT 'post' AS kind, p.id, p.title, p.user_id, u.username, p.created_at \
                    FROM posts p JOIN users u ON u.id = p.user_id \
                UNION ALL \
                SELECT 'comment', c.id, LEFT(c.content, 100), c.user_id, u.username, c.created_at \
                    FROM comments c JOIN users u ON u.id = c.user_id \
                UNION ALL \
                SELECT 'review', r.id, LEFT(r.comment, 100), r.user_id, u.username, r.created_at \
                    FROM reviews r JOIN users u ON u.id = r.user_id \
                UNION ALL \
                SELECT 'product', pr.id, pr.name, pr.creator_id, u.username, pr.created_at \
                    FROM products pr JOIN users u ON u.id = pr.creator_id \
                UNION ALL \
                SELECT 'user', u.id, u.username, u.id, u.username, u.created_at FROM users u \
            ) activity \
            ORDER BY created_at DESC, kind ASC, id DESC \
            LIMIT $1";
        sql::fetch_all(&self.db, sql, vec![sql::to_i64(limit).into()]).await
    }

    pub async fn system_info(&self) -> AppResult<SystemInfo> {
        let db: DatabaseInfo = sql::fetch_one(
            &self.db,
            "SELECT version() AS database_version, \
                pg_database_size(current_database()) AS database_size_bytes",
            vec![],
        )
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Version query returned no row")))?;

        Ok(SystemInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            database_version: db.database_version,
            database_size_bytes: db.database_size_bytes,
            server_time: chrono::Utc::now().naive_utc(),
            uptime_seconds: STARTED_AT.get().map_or(0, |t| t.elapsed().as_secs()),
        })
    }

    pub async fn reports(&self) -> AppResult<StatusReport> {
        let sql = "SELECT 'users' AS source, status, COUNT(*) AS count FROM users GROUP BY status \
            UNION ALL SELECT 'posts', status, COUNT(*) FROM posts GROUP BY status \
            UNION ALL SELECT 'comments', status, COUNT(*) FROM comments GROUP BY status \
            UNION ALL SELECT 'products', status, COUNT(*) FROM products GROUP BY status \
            UNION ALL SELECT 'reviews', status, COUNT(*) FROM reviews GROUP BY status \
            UNION ALL SELECT 'categories', status, COUNT(*) FROM categories GROUP BY status";
        let rows: Vec<StatusCount> = sql::fetch_all(&self.db, sql, vec![]).await?;
        Ok(group_report(
            rows.into_iter()
                .map(|r| (r.source, r.status, r.count))
                .collect(),
        ))
    }

    /// Daily creation counts for the last `days` days, today included.
    pub async fn activity_chart(&self, days: i64) -> AppResult<Vec<ActivityPoint>> {
        let sql = format!(
            "SELECT d.day::date AS day, \
                (SELECT COUNT(*) FROM posts WHERE created_at::date = d.day::date) AS posts, \
                (SELECT COUNT(*) FROM comments WHERE created_at::date = d.day::date) AS comments, \
                (SELECT COUNT(*) FROM reviews WHERE created_at::date = d.day::date) AS reviews, \
                (SELECT COUNT(*) FROM users WHERE created_at::date = d.day::date) AS users \
             FROM generate_series({TODAY} - make_interval(days => $1::int - 1), {TODAY}, INTERVAL '1 day') \
                AS d(day) \
             ORDER BY d.day"
        );
        sql::fetch_all(&self.db, &sql, vec![days.into()]).await
    }

    pub async fn top_categories(&self, limit: u64) -> AppResult<Vec<TopCategory>> {
        let sql = "SELECT c.id, c.name, \
                (SELECT COUNT(*) FROM posts p WHERE p.category_id = c.id AND p.status = 'active') \
                    AS post_count, \
                (SELECT COUNT(*) FROM products pr \
                    WHERE pr.category_id = c.id AND pr.status = 'active') AS product_count \
             FROM categories c \
             WHERE c.status = 'active' \
             ORDER BY post_count + product_count DESC, c.name ASC \
             LIMIT $1";
        sql::fetch_all(&self.db, sql, vec![sql::to_i64(limit).into()]).await
    }

    /// New sign-ups per day with the running user total.
    pub async fn user_growth(&self, days: i64) -> AppResult<Vec<GrowthPoint>> {
        let sql = format!(
            "SELECT d.day::date AS day, \
                (SELECT COUNT(*) FROM users WHERE created_at::date = d.day::date) AS new_users, \
                (SELECT COUNT(*) FROM users \
                    WHERE created_at < d.day + INTERVAL '1 day') AS total_users \
             FROM generate_series({TODAY} - make_interval(days => $1::int - 1), {TODAY}, INTERVAL '1 day') \
                AS d(day) \
             ORDER BY d.day"
        );
        sql::fetch_all(&self.db, &sql, vec![days.into()]).await
    }

    pub async fn ping(&self) -> bool {
        self.db
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| tracing::warn!("Database ping failed: {}", e))
            .is_ok()
    }
}
