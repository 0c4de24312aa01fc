use crate::{
    error::{AppError, AppResult},
    models::UserRole,
    services::session::{SessionData, SessionStore},
    utils::cookie::{extract_cookie, SESSION_COOKIE},
};
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Per-request view of the server-side session.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    token: Option<String>,
    data: Option<SessionData>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(token: String, data: SessionData) -> Self {
        Self {
            token: Some(token),
            data: Some(data),
        }
    }

    /// Resolves the `sid` cookie against the store. A missing, unknown or
    /// expired token yields an anonymous context.
    pub async fn load(store: &SessionStore, headers: &HeaderMap) -> AppResult<Self> {
        let Some(token) = extract_cookie(headers, SESSION_COOKIE) else {
            return Ok(Self::anonymous());
        };

        Ok(match store.load(&token).await? {
            Some(data) => Self::new(token, data),
            None => Self::anonymous(),
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn data(&self) -> Option<&SessionData> {
        self.data.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.data.is_some()
    }

    pub fn current_user_id(&self) -> Option<i32> {
        self.data.as_ref().map(|d| d.user_id)
    }

    pub fn is_admin(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|d| d.role == UserRole::Admin.as_str())
    }

    pub fn require_auth(&self) -> AppResult<i32> {
        self.current_user_id().ok_or(AppError::Unauthorized)
    }

    /// 401 when anonymous, 403 when logged in without the admin role.
    pub fn require_admin(&self) -> AppResult<i32> {
        let user_id = self.require_auth()?;
        if self.is_admin() {
            Ok(user_id)
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_owner_or_admin(&self, owner_id: i32) -> AppResult<i32> {
        let user_id = self.require_auth()?;
        if user_id == owner_id || self.is_admin() {
            Ok(user_id)
        } else {
            Err(AppError::Forbidden)
        }
    }

    /// Label used in the admin action log.
    pub fn actor(&self) -> String {
        match &self.data {
            Some(d) => format!("{}#{}", d.username, d.user_id),
            None => "anonymous".to_string(),
        }
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<SessionContext>() {
            return Ok(ctx.clone());
        }

        let store = parts
            .extensions
            .get::<SessionStore>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Session store not configured")))?;

        let ctx = Self::load(&store, &parts.headers).await?;
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}
