use super::{parse_bool_env, parse_env};
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Echo server-side error detail in 5xx envelopes.
    pub debug: bool,
    pub request_timeout: Duration,
    pub upload_dir: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            debug: parse_bool_env("APP_DEBUG", false),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 30)),
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
        }
    }
}

pub fn app_config() -> &'static AppConfig {
    static CONFIG: OnceLock<AppConfig> = OnceLock::new();
    CONFIG.get_or_init(AppConfig::from_env)
}
