//! `?action=` dispatch: every resource group is one route whose action
//! enum maps names to allowed HTTP methods, plus the request extractor
//! that gathers session, query and body input for the handler.

use crate::{
    error::{AppError, AppResult},
    middleware::SessionContext,
    services::session::SessionStore,
};
use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request},
    http::{header, Extensions, Method, StatusCode, Uri},
    Form,
};
use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Verb::Get),
            Method::POST => Some(Verb::Post),
            Method::PUT => Some(Verb::Put),
            Method::DELETE => Some(Verb::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
        }
    }
}

/// One resource group's action vocabulary.
pub trait Action: Copy + Sized + 'static {
    const GROUP: &'static str;
    const ALL: &'static [Self];

    fn name(&self) -> &'static str;
    fn verbs(&self) -> &'static [Verb];
}

/// Declares an action enum and its `(name, methods)` table.
macro_rules! action_table {
    ($(#[$meta:meta])* $vis:vis enum $name:ident in $group:literal {
        $($variant:ident => $text:literal [$($verb:ident),+]),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::dispatch::Action for $name {
            const GROUP: &'static str = $group;
            const ALL: &'static [Self] = &[$($name::$variant),+];

            fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            fn verbs(&self) -> &'static [$crate::dispatch::Verb] {
                match self {
                    $($name::$variant => &[$($crate::dispatch::Verb::$verb),+]),+
                }
            }
        }
    };
}

pub(crate) use action_table;

/// Unknown or missing action → 400; known action, wrong method → 405.
pub fn resolve<A: Action>(verb: Verb, action: Option<&str>) -> AppResult<A> {
    let name = action
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("Thiếu tham số action".to_string()))?;

    let action = A::ALL
        .iter()
        .copied()
        .find(|a| a.name() == name)
        .ok_or_else(|| AppError::Validation(format!("Hành động không hợp lệ: {}", name)))?;

    if action.verbs().contains(&verb) {
        Ok(action)
    } else {
        Err(AppError::MethodNotAllowed)
    }
}

/// Router-construction check: names are unique and every action accepts
/// at least one method.
pub fn validate_table<A: Action>() -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for action in A::ALL {
        if !seen.insert(action.name()) {
            anyhow::bail!("duplicate action '{}' in group '{}'", action.name(), A::GROUP);
        }
        if action.verbs().is_empty() {
            anyhow::bail!("action '{}' in group '{}' has no methods", action.name(), A::GROUP);
        }
    }
    if seen.is_empty() {
        anyhow::bail!("group '{}' has no actions", A::GROUP);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Everything a group handler needs from the request.
pub struct ActionRequest {
    pub verb: Verb,
    pub session: SessionContext,
    pub db: DatabaseConnection,
    pub store: SessionStore,
    pub files: Vec<UploadedFile>,
    query: Map<String, Value>,
    body: Map<String, Value>,
    extensions: Extensions,
}

impl ActionRequest {
    pub fn action(&self) -> Option<&str> {
        self.query.get("action").and_then(Value::as_str)
    }

    pub fn resolve<A: Action>(&self) -> AppResult<A> {
        resolve(self.verb, self.action())
    }

    /// Typed input from body fields, falling back to query parameters.
    pub fn input<T: DeserializeOwned>(&self) -> AppResult<T> {
        let mut merged = self.query.clone();
        for (key, value) in &self.body {
            merged.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(merged))
            .map_err(|e| AppError::Validation(format!("Dữ liệu không hợp lệ: {}", e)))
    }

    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> AppResult<T> {
        self.extensions.get::<T>().cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!(
                "missing request extension {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn files<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }
}

impl<S> FromRequest<S> for ActionRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let verb = Verb::from_method(req.method()).ok_or(AppError::MethodNotAllowed)?;
        let query = parse_query(req.uri());
        let extensions = req.extensions().clone();

        let db = extensions
            .get::<DatabaseConnection>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Database not configured")))?;
        let store = extensions
            .get::<SessionStore>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Session store not configured")))?;
        let session = SessionContext::load(&store, req.headers()).await?;

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();

        let (body, files) = if content_type.starts_with("multipart/form-data") {
            read_multipart(req, state).await?
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| body_error(e.status(), &e.body_text()))?;
            (pairs_to_map(pairs), Vec::new())
        } else {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| body_error(e.status(), &e.body_text()))?;
            (parse_body(&content_type, &bytes)?, Vec::new())
        };

        Ok(Self {
            verb,
            session,
            db,
            store,
            files,
            query,
            body,
            extensions,
        })
    }
}

fn body_error(status: StatusCode, detail: &str) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        tracing::debug!("Rejected request body: {}", detail);
        AppError::Validation("Không đọc được dữ liệu gửi lên".to_string())
    }
}

fn parse_query(uri: &Uri) -> Map<String, Value> {
    let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    pairs_to_map(pairs)
}

fn pairs_to_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        insert_field(&mut map, &key, Value::String(value));
    }
    map
}

/// `key[]=a&key[]=b` collects into an array; a repeated plain key keeps
/// its last value.
fn insert_field(map: &mut Map<String, Value>, key: &str, value: Value) {
    if let Some(base) = key.strip_suffix("[]") {
        match map.get_mut(base) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                map.insert(base.to_string(), Value::Array(vec![value]));
            }
        }
    } else {
        map.insert(key.to_string(), value);
    }
}

fn parse_body(content_type: &str, bytes: &Bytes) -> AppResult<Map<String, Value>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    if content_type.starts_with("application/json") {
        return match serde_json::from_slice::<Value>(bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(AppError::Validation(
                "Dữ liệu JSON phải là một đối tượng".to_string(),
            )),
            Err(_) => Err(AppError::Validation("Dữ liệu JSON không hợp lệ".to_string())),
        };
    }

    // Clients that omit the content type usually still send JSON.
    if content_type.is_empty() {
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(bytes) {
            return Ok(map);
        }
    }

    Ok(Map::new())
}

async fn read_multipart<S: Send + Sync>(
    req: Request,
    state: &S,
) -> AppResult<(Map<String, Value>, Vec<UploadedFile>)> {
    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| body_error(e.status(), &e.body_text()))?;

    let mut fields = Map::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| body_error(e.status(), &e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name.is_empty() {
            continue;
        }

        if field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| body_error(e.status(), &e.body_text()))?;
            if data.is_empty() {
                continue;
            }
            files.push(UploadedFile {
                field: name.trim_end_matches("[]").to_string(),
                file_name,
                content_type,
                data,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| body_error(e.status(), &e.body_text()))?;
            insert_field(&mut fields, &name, Value::String(text));
        }
    }

    Ok((fields, files))
}
