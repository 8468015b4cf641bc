use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use uuid::Uuid;

use crate::authz::{Principal, Role};
use crate::errors::AppError;
use crate::events::{cookie, RequestContext};

pub const AUTH_COOKIE: &str = "auth-token";
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_PARAM_TERMS: [&str; 6] = ["password", "token", "secret", "key", "auth", "session"];
const LOGGED_TOKEN_PREFIX: usize = 20;

/// Per-request security state, attached to request extensions on pass.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub principal: Option<Principal>,
    pub request: RequestContext,
}

impl SecurityContext {
    pub fn authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.principal.as_ref().map(|p| p.user_id)
    }

    pub fn role(&self) -> Option<Role> {
        self.principal.as_ref().map(|p| p.role)
    }

    /// User id, else client IP, else `anonymous`.
    pub fn rate_limit_key(&self) -> String {
        match (self.user_id(), self.request.ip.as_deref()) {
            (Some(id), _) => id.to_string(),
            (None, Some(ip)) => ip.to_string(),
            (None, None) => "anonymous".to_string(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SecurityContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SecurityContext>()
            .cloned()
            .ok_or_else(|| AppError::internal("route is not behind the security gate"))
    }
}

/// Raw session token: `Authorization` header (optional `Bearer ` prefix) or
/// the `auth-token` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| cookie(headers, AUTH_COOKIE))
}

/// First 20 characters followed by `...`; the only form in which tokens are logged.
pub fn token_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(LOGGED_TOKEN_PREFIX).collect();
    format!("{prefix}...")
}

/// Matches on the form-decoded, lowercased name so `pass%77ord` is caught too.
pub fn is_sensitive_param(key: &str) -> bool {
    let key = form_urlencoded::parse(key.as_bytes())
        .next()
        .map(|(name, _)| name.to_lowercase())
        .unwrap_or_default();
    SENSITIVE_PARAM_TERMS.iter().any(|term| key.contains(term))
}

/// Query string with the value of every sensitive parameter replaced by
/// `[REDACTED]`. Other pairs are kept as sent.
pub fn sanitize_query(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive_param(key) => format!("{key}={REDACTED}"),
            None if is_sensitive_param(pair) => format!("{pair}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
