use std::sync::Arc;

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
};
use axum::http::{HeaderMap, HeaderValue, Method};

pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "https://localhost:3000"];

const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, X-Session-ID";
const MAX_AGE_SECS: &str = "86400";

/// Reads `CORS_ORIGINS` (comma-separated), falling back to the localhost pair.
pub fn cors_origins_from_env() -> Vec<String> {
    std::env::var("CORS_ORIGINS")
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
        .unwrap_or_else(default_origins)
}

pub fn default_origins() -> Vec<String> {
    DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct CorsHeaders {
    origins: Arc<[String]>,
    allow_methods: HeaderValue,
}

impl CorsHeaders {
    pub fn new(origins: Arc<[String]>, methods: &[Method]) -> Self {
        let joined = methods.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        let allow_methods = HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static("*"));
        Self { origins, allow_methods }
    }

    /// Allow-listed origins are echoed with credentials; anything else gets `*`.
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        let matched = origin.filter(|o| {
            o.to_str()
                .map(|o| self.origins.iter().any(|allowed| allowed == o))
                .unwrap_or(false)
        });

        match matched {
            Some(origin) => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
                headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            }
            None => {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
                headers.remove(ACCESS_CONTROL_ALLOW_CREDENTIALS);
            }
        }
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cors() -> CorsHeaders {
        CorsHeaders::new(default_origins().into(), &[Method::GET, Method::POST])
    }

    #[test]
    fn allow_listed_origin_is_echoed() {
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("http://localhost:3000");
        cors().apply(Some(&origin), &mut headers);

        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST");
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "86400");
    }

    #[test]
    fn unknown_origin_gets_wildcard() {
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("https://evil.example");
        cors().apply(Some(&origin), &mut headers);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());

        let mut headers = HeaderMap::new();
        cors().apply(None, &mut headers);
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization, X-Requested-With, X-Session-ID"
        );
    }
}
