use crate::{
    config::session::{SessionBackend, SessionConfig},
    error::{AppError, AppResult},
    models::{session, Session, UserModel},
    utils::token::{generate_token, hash_token},
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};

/// What a logged-in request knows about its principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SessionData {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<&UserModel> for SessionData {
    fn from(user: &UserModel) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Clone)]
enum Backend {
    Database(DatabaseConnection),
    Redis(ConnectionManager),
}

/// Opaque-token session store. Only SHA-256 digests of tokens are kept.
#[derive(Clone)]
pub struct SessionStore {
    backend: Backend,
    ttl_seconds: u64,
}

fn redis_err(err: redis::RedisError) -> AppError {
    AppError::Internal(anyhow::anyhow!("Session store error: {err}"))
}

fn session_key(hash: &str) -> String {
    format!("session:{hash}")
}

fn user_index_key(user_id: i32) -> String {
    format!("session:user:{user_id}")
}

impl SessionStore {
    pub fn database(db: DatabaseConnection, ttl_seconds: u64) -> Self {
        Self {
            backend: Backend::Database(db),
            ttl_seconds,
        }
    }

    pub fn redis(conn: ConnectionManager, ttl_seconds: u64) -> Self {
        Self {
            backend: Backend::Redis(conn),
            ttl_seconds,
        }
    }

    /// Builds the configured backend, connecting to Redis when selected.
    pub async fn from_config(
        config: &SessionConfig,
        db: DatabaseConnection,
    ) -> anyhow::Result<Self> {
        match config.backend {
            SessionBackend::Database => Ok(Self::database(db, config.ttl_seconds)),
            SessionBackend::Redis => {
                let conn = crate::config::redis::get_redis().await?;
                Ok(Self::redis(conn, config.ttl_seconds))
            }
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Stores a new session and returns the raw token for the cookie.
    pub async fn create(&self, data: &SessionData) -> AppResult<String> {
        let token = generate_token()?;
        let hash = hash_token(&token);

        match &self.backend {
            Backend::Database(db) => {
                let now = chrono::Utc::now().naive_utc();
                let purged = Self::purge_expired(db, now).await?;
                if purged > 0 {
                    tracing::debug!(purged, "Removed expired sessions");
                }
                let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX / 1000);
                session::ActiveModel {
                    id: Set(hash),
                    user_id: Set(data.user_id),
                    username: Set(data.username.clone()),
                    email: Set(data.email.clone()),
                    role: Set(data.role.clone()),
                    expires_at: Set(now + chrono::Duration::seconds(ttl)),
                    created_at: Set(now),
                }
                .insert(db)
                .await?;
            }
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let payload = serde_json::to_string(data)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
                let index = user_index_key(data.user_id);
                let _: () = conn
                    .set_ex(session_key(&hash), payload, self.ttl_seconds)
                    .await
                    .map_err(redis_err)?;
                let _: () = conn.sadd(&index, &hash).await.map_err(redis_err)?;
                let _: () = conn
                    .expire(&index, self.ttl_seconds as i64)
                    .await
                    .map_err(redis_err)?;
            }
        }

        Ok(token)
    }

    /// Redis expires its keys itself; table rows need sweeping.
    async fn purge_expired(
        db: &DatabaseConnection,
        now: chrono::NaiveDateTime,
    ) -> AppResult<u64> {
        let result = Session::delete_many()
            .filter(session::Column::ExpiresAt.lte(now))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn load(&self, token: &str) -> AppResult<Option<SessionData>> {
        let hash = hash_token(token);

        match &self.backend {
            Backend::Database(db) => {
                let Some(row) = Session::find_by_id(hash.clone()).one(db).await? else {
                    return Ok(None);
                };
                if row.expires_at <= chrono::Utc::now().naive_utc() {
                    Session::delete_by_id(hash).exec(db).await?;
                    return Ok(None);
                }
                Ok(Some(SessionData {
                    user_id: row.user_id,
                    username: row.username,
                    email: row.email,
                    role: row.role,
                }))
            }
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let raw: Option<String> = conn.get(session_key(&hash)).await.map_err(redis_err)?;
                Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
            }
        }
    }

    pub async fn destroy(&self, token: &str) -> AppResult<()> {
        let hash = hash_token(token);

        match &self.backend {
            Backend::Database(db) => {
                Session::delete_by_id(hash).exec(db).await?;
            }
            Backend::Redis(conn) => {
                let data = self.load(token).await?;
                let mut conn = conn.clone();
                let _: () = conn.del(session_key(&hash)).await.map_err(redis_err)?;
                if let Some(data) = data {
                    let _: () = conn
                        .srem(user_index_key(data.user_id), &hash)
                        .await
                        .map_err(redis_err)?;
                }
            }
        }
        Ok(())
    }

    /// Drops every session of a user (ban, delete, password reset).
    pub async fn destroy_user(&self, user_id: i32) -> AppResult<()> {
        match &self.backend {
            Backend::Database(db) => {
                Session::delete_many()
                    .filter(session::Column::UserId.eq(user_id))
                    .exec(db)
                    .await?;
            }
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let index = user_index_key(user_id);
                let hashes: Vec<String> = conn.smembers(&index).await.map_err(redis_err)?;
                let mut keys: Vec<String> = hashes.iter().map(|h| session_key(h)).collect();
                keys.push(index);
                let _: () = conn.del(keys).await.map_err(redis_err)?;
            }
        }
        Ok(())
    }

    /// Rewrites the cached identity of a user's live sessions after a
    /// role or profile change.
    pub async fn refresh_user(&self, user: &UserModel) -> AppResult<()> {
        let data = SessionData::from(user);

        match &self.backend {
            Backend::Database(db) => {
                Session::update_many()
                    .col_expr(session::Column::Username, Expr::value(data.username.clone()))
                    .col_expr(session::Column::Email, Expr::value(data.email.clone()))
                    .col_expr(session::Column::Role, Expr::value(data.role.clone()))
                    .filter(session::Column::UserId.eq(user.id))
                    .exec(db)
                    .await?;
            }
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let payload = serde_json::to_string(&data)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
                let hashes: Vec<String> = conn
                    .smembers(user_index_key(user.id))
                    .await
                    .map_err(redis_err)?;
                for hash in hashes {
                    let _: Option<String> = redis::cmd("SET")
                        .arg(session_key(&hash))
                        .arg(&payload)
                        .arg("XX")
                        .arg("KEEPTTL")
                        .query_async(&mut conn)
                        .await
                        .map_err(redis_err)?;
                }
            }
        }
        Ok(())
    }
}
