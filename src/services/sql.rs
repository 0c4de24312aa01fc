//! Helpers for hand-written, parameterized Postgres queries.

use crate::error::{AppError, AppResult};
use crate::response::Pagination;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, FromQueryResult, Statement, Value,
};

/// Accumulates `WHERE` conditions. Each `?` in a pushed clause becomes the
/// next `$n` placeholder.
#[derive(Debug, Default, Clone)]
pub struct Filters {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self, clause: &str) -> Self {
        self.clauses.push(clause.to_string());
        self
    }

    pub fn bind(self, clause: &str, value: impl Into<Value>) -> Self {
        self.bind_all(clause, vec![value.into()])
    }

    pub fn bind_opt<V: Into<Value>>(self, clause: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.bind(clause, v),
            None => self,
        }
    }

    pub fn bind_all(mut self, clause: &str, values: Vec<Value>) -> Self {
        let mut sql = String::with_capacity(clause.len() + 4);
        let mut next = self.values.len();
        for ch in clause.chars() {
            if ch == '?' {
                next += 1;
                sql.push('$');
                sql.push_str(&next.to_string());
            } else {
                sql.push(ch);
            }
        }
        self.clauses.push(sql);
        self.values.extend(values);
        self
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> Vec<Value> {
        self.values.clone()
    }

    /// Index the next appended placeholder will take.
    pub fn next_placeholder(&self) -> usize {
        self.values.len() + 1
    }
}

pub fn statement(sql: &str, values: Vec<Value>) -> Statement {
    Statement::from_sql_and_values(DatabaseBackend::Postgres, sql, values)
}

pub async fn count<C: ConnectionTrait>(conn: &C, sql: &str, values: Vec<Value>) -> AppResult<u64> {
    let row = conn
        .query_one(statement(sql, values))
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Count query returned no row")))?;
    let total: i64 = row.try_get_by_index(0)?;
    Ok(total.max(0) as u64)
}

pub async fn fetch_all<M, C>(conn: &C, sql: &str, values: Vec<Value>) -> AppResult<Vec<M>>
where
    M: FromQueryResult,
    C: ConnectionTrait,
{
    Ok(M::find_by_statement(statement(sql, values)).all(conn).await?)
}

pub async fn fetch_one<M, C>(conn: &C, sql: &str, values: Vec<Value>) -> AppResult<Option<M>>
where
    M: FromQueryResult,
    C: ConnectionTrait,
{
    Ok(M::find_by_statement(statement(sql, values)).one(conn).await?)
}

/// Runs `SELECT COUNT(*) FROM {from} {where}` and the matching page query.
pub async fn fetch_page<M, C>(
    conn: &C,
    select: &str,
    from: &str,
    filters: &Filters,
    order_by: &str,
    pagination: Pagination,
) -> AppResult<(Vec<M>, u64)>
where
    M: FromQueryResult,
    C: ConnectionTrait,
{
    let where_sql = filters.where_sql();
    let total = count(
        conn,
        &format!("SELECT COUNT(*) FROM {from} {where_sql}"),
        filters.values(),
    )
    .await?;

    let limit_idx = filters.next_placeholder();
    let sql = format!(
        "SELECT {select} FROM {from} {where_sql} ORDER BY {order_by} LIMIT ${} OFFSET ${}",
        limit_idx,
        limit_idx + 1
    );
    let mut values = filters.values();
    values.push(to_i64(pagination.limit).into());
    values.push(to_i64(pagination.offset()).into());

    let items = fetch_all(conn, &sql, values).await?;
    Ok((items, total))
}

/// Commits on success. On failure the transaction is rolled back before
/// the original error is reported.
pub async fn finish<T>(txn: DatabaseTransaction, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = txn.rollback().await {
                tracing::error!("Rollback failed: {:?}", rollback);
            }
            Err(err)
        }
    }
}

/// `?, ?, ?` for an IN-list of `n` bound values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE` pattern.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_in_order() {
        let f = Filters::new()
            .raw("p.status = 'active'")
            .bind("p.user_id = ?", 7)
            .bind_opt::<i32>("p.category_id = ?", None)
            .bind_all("(p.title ILIKE ? OR p.content ILIKE ?)", vec!["%a%".into(), "%a%".into()]);
        assert_eq!(
            f.where_sql(),
            "WHERE p.status = 'active' AND p.user_id = $1 AND (p.title ILIKE $2 OR p.content ILIKE $3)"
        );
        assert_eq!(f.values().len(), 3);
        assert_eq!(f.next_placeholder(), 4);
    }

    #[test]
    fn bound_limits_clamp_to_bigint() {
        assert_eq!(to_i64(25), 25);
        assert_eq!(to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn empty_filters_have_no_where() {
        assert_eq!(Filters::new().where_sql(), "");
    }

    #[test]
    fn in_list_placeholders() {
        let ids = [3, 4, 5];
        let clause = format!("id IN ({})", placeholders(ids.len()));
        let f = Filters::new().bind_all(&clause, ids.iter().map(|&i| i.into()).collect());
        assert_eq!(f.where_sql(), "WHERE id IN ($1, $2, $3)");
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
