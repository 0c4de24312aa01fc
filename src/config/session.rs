use super::parse_env;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    Database,
    Redis,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub ttl_seconds: u64,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let backend = match env::var("SESSION_STORE")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "redis" => SessionBackend::Redis,
            _ => SessionBackend::Database,
        };

        Self {
            backend,
            ttl_seconds: parse_env("SESSION_TTL_SECONDS", 86_400), // 1 day
        }
    }
}
