use crate::config::parse_bool_env;
use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::{env, sync::OnceLock};

const API_CSP: &str =
    "default-src 'none'; frame-ancestors 'none'; img-src 'self' data:; base-uri 'none'";
const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

#[derive(Debug, Clone)]
struct HeaderPolicy {
    csp: HeaderValue,
    hsts: bool,
}

impl HeaderPolicy {
    fn from_env() -> Self {
        let csp = match env::var("CSP_POLICY") {
            Ok(raw) => HeaderValue::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!("Ignoring invalid CSP_POLICY ({}), using the API default", err);
                HeaderValue::from_static(API_CSP)
            }),
            Err(_) => HeaderValue::from_static(API_CSP),
        };
        Self {
            csp,
            hsts: parse_bool_env("ENABLE_HSTS", false),
        }
    }

    /// Handlers that set their own cache policy keep it.
    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(header::CONTENT_SECURITY_POLICY, self.csp.clone());
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
        headers
            .entry(header::CACHE_CONTROL)
            .or_insert(HeaderValue::from_static("no-store"));
        if self.hsts {
            headers.insert(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static(HSTS_VALUE),
            );
        }
    }
}

fn policy() -> &'static HeaderPolicy {
    static POLICY: OnceLock<HeaderPolicy> = OnceLock::new();
    POLICY.get_or_init(HeaderPolicy::from_env)
}

/// Wraps the JSON API only; Swagger UI needs scripts and styles.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    policy().apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(hsts: bool) -> HeaderPolicy {
        HeaderPolicy {
            csp: HeaderValue::from_static(API_CSP),
            hsts,
        }
    }

    #[test]
    fn api_responses_are_not_cached() {
        let mut headers = HeaderMap::new();
        policy(false).apply(&mut headers);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
        assert!(headers.get(header::STRICT_TRANSPORT_SECURITY).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        policy(true).apply(&mut headers);
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], HSTS_VALUE);
    }
}
