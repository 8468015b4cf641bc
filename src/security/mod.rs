//! Request security gate
//!
//! Per-route-group middleware evaluating, in order: method allow-list, CORS
//! preflight, rate limit, authentication, role requirement, request logging.
//! The first stage that produces a response wins; CORS headers are added to
//! every response either way.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde_json::json;

use crate::authz::{Principal, Role};
use crate::db::UserStore;
use crate::errors::{AppError, AppResult};
use crate::events::{error_chain, AuditStore, EventCategory, RequestContext, SecurityEvent, Severity};
use crate::jwt::JwtConfig;

mod context;
mod cors;
mod rate_limit;

pub use context::{is_sensitive_param, sanitize_query, session_token, token_prefix, SecurityContext, AUTH_COOKIE, REDACTED};
pub use cors::{cors_origins_from_env, default_origins, CorsHeaders, DEFAULT_CORS_ORIGINS};
pub use rate_limit::{FixedWindowLimiter, RateDecision, RateLimit};

pub const DEFAULT_METHODS: [Method; 5] = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH];

/// Options for one protected route group.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    /// Namespace for rate-limit counters; groups with different limits must differ.
    pub scope: &'static str,
    pub require_auth: bool,
    pub required_role: Option<Role>,
    pub rate_limit: Option<RateLimit>,
    pub log_request: bool,
    pub allowed_methods: Vec<Method>,
    pub cors_origins: Arc<[String]>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            scope: "default",
            require_auth: false,
            required_role: None,
            rate_limit: None,
            log_request: true,
            allowed_methods: DEFAULT_METHODS.to_vec(),
            cors_origins: default_origins().into(),
        }
    }
}

impl SecurityPolicy {
    pub fn public() -> Self {
        Self {
            scope: "public",
            rate_limit: Some(RateLimit::per_minute(100)),
            ..Self::default()
        }
    }

    pub fn authenticated() -> Self {
        Self {
            scope: "authenticated",
            require_auth: true,
            rate_limit: Some(RateLimit::per_minute(200)),
            ..Self::default()
        }
    }

    pub fn admin() -> Self {
        Self {
            scope: "admin",
            require_auth: true,
            required_role: Some(Role::Admin),
            rate_limit: Some(RateLimit::per_minute(500)),
            ..Self::default()
        }
    }

    pub fn sensitive() -> Self {
        Self {
            scope: "sensitive",
            require_auth: true,
            rate_limit: Some(RateLimit::per_minute(50)),
            allowed_methods: vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE],
            ..Self::default()
        }
    }

    /// Brute-force protection for credential submission.
    pub fn login() -> Self {
        Self {
            scope: "login",
            rate_limit: Some(RateLimit::new(5, Duration::from_secs(15 * 60))),
            allowed_methods: vec![Method::POST],
            ..Self::default()
        }
    }

    pub fn with_cors_origins(mut self, origins: Arc<[String]>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn with_rate_limit(mut self, limit: Option<RateLimit>) -> Self {
        self.rate_limit = limit;
        self
    }

    /// OPTIONS is always admitted so preflight works for every policy.
    pub fn allows(&self, method: &Method) -> bool {
        *method == Method::OPTIONS || self.allowed_methods.contains(method)
    }

    fn method_names(&self) -> Vec<String> {
        self.allowed_methods.iter().map(|m| m.as_str().to_string()).collect()
    }
}

/// Outcome of evaluating a request against a policy.
pub enum Verdict {
    /// Short-circuit with this response; the handler does not run.
    Respond(Response),
    Pass(SecurityContext),
}

#[derive(Clone)]
pub struct SecurityGate {
    policy: Arc<SecurityPolicy>,
    cors: CorsHeaders,
    jwt: Arc<JwtConfig>,
    users: Arc<dyn UserStore>,
    audit: Arc<AuditStore>,
    limiter: Arc<FixedWindowLimiter>,
}

impl SecurityGate {
    pub fn new(
        policy: SecurityPolicy,
        jwt: Arc<JwtConfig>,
        users: Arc<dyn UserStore>,
        audit: Arc<AuditStore>,
        limiter: Arc<FixedWindowLimiter>,
    ) -> Self {
        let cors = CorsHeaders::new(Arc::clone(&policy.cors_origins), &policy.allowed_methods);
        Self {
            policy: Arc::new(policy),
            cors,
            jwt,
            users,
            audit,
            limiter,
        }
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    pub async fn evaluate(&self, parts: &Parts) -> AppResult<Verdict> {
        let policy = &*self.policy;

        if !policy.allows(&parts.method) {
            let err = AppError::method_not_allowed(policy.method_names());
            return Ok(Verdict::Respond(err.into_response()));
        }

        if parts.method == Method::OPTIONS {
            return Ok(Verdict::Respond(StatusCode::OK.into_response()));
        }

        let request = RequestContext::from_parts(parts);
        let principal = self.resolve_principal(&parts.headers, &request).await?;
        let ctx = SecurityContext { principal, request };

        if let Some(limit) = &policy.rate_limit {
            let key = ctx.rate_limit_key();
            let scoped = format!("{}:{}", policy.scope, key);
            if let RateDecision::Limited { count, retry_after } = self.limiter.check(&scoped, limit) {
                self.audit.log_security_event(
                    SecurityEvent::new("rate_limit_exceeded", Severity::Medium)
                        .category(EventCategory::Access)
                        .user(ctx.user_id())
                        .context(&ctx.request)
                        .data(json!({
                            "key": key,
                            "scope": policy.scope,
                            "count": count,
                            "maxRequests": limit.max_requests,
                            "ip": ctx.request.ip,
                            "userId": ctx.user_id(),
                        })),
                );
                return Ok(Verdict::Respond(AppError::too_many_requests(retry_after).into_response()));
            }
        }

        if policy.require_auth && !ctx.authenticated() {
            return Ok(Verdict::Respond(AppError::unauthorized("Authentication required").into_response()));
        }

        if let Some(required) = policy.required_role {
            if ctx.role() != Some(required) {
                tracing::debug!(required = %required, user_id = ?ctx.user_id(), "role requirement not met");
                return Ok(Verdict::Respond(AppError::forbidden("Insufficient permissions").into_response()));
            }
        }

        if policy.log_request {
            self.log_request(parts, &ctx);
        }

        Ok(Verdict::Pass(ctx))
    }

    /// Verified token plus a still-active user record, or `None`.
    ///
    /// Token failures are logged and treated as unauthenticated; only a store
    /// failure is an error.
    async fn resolve_principal(&self, headers: &HeaderMap, request: &RequestContext) -> AppResult<Option<Principal>> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };

        let claims = match self.jwt.verify(&token) {
            Ok(claims) => claims,
            Err(err) => {
                self.audit.log_security_event(
                    SecurityEvent::new("jwt_validation_failed", Severity::Medium)
                        .category(EventCategory::Auth)
                        .context(request)
                        .data(json!({
                            "error": err.to_string(),
                            "token": token_prefix(&token),
                        })),
                );
                return Ok(None);
            }
        };

        match self.users.find_by_id(claims.sub).await? {
            Some(user) if user.is_active() => Ok(Some(Principal::from_user(&user.user))),
            Some(_) => {
                tracing::debug!(user_id = %claims.sub, "token for deactivated user");
                Ok(None)
            }
            None => {
                tracing::debug!(user_id = %claims.sub, "token for unknown user");
                Ok(None)
            }
        }
    }

    fn log_request(&self, parts: &Parts, ctx: &SecurityContext) {
        let query = parts.uri.query().map(sanitize_query).unwrap_or_default();
        self.audit.log_security_event(
            SecurityEvent::new("api_request", Severity::Low)
                .category(EventCategory::Access)
                .user(ctx.user_id())
                .context(&ctx.request)
                .data(json!({
                    "method": parts.method.as_str(),
                    "path": parts.uri.path(),
                    "query": query,
                    "ip": ctx.request.ip,
                    "userAgent": ctx.request.user_agent,
                    "userId": ctx.user_id(),
                    "sessionId": ctx.request.session_id,
                    "authenticated": ctx.authenticated(),
                    "timestamp": chrono::Utc::now(),
                })),
        );
    }

    /// High-severity `middleware_error` event and a generic 500.
    fn internal_failure(&self, parts: &Parts, failure: Failure) -> Response {
        let query = parts.uri.query().map(sanitize_query);
        let mut data = json!({
            "path": parts.uri.path(),
            "query": query,
            "method": parts.method.as_str(),
        });
        let message = match failure {
            Failure::Error(err) => {
                data["causes"] = json!(error_chain(&err));
                err.to_string()
            }
            Failure::Panic(message) => {
                // Captured after unwinding: this is the catch site, not the panic site.
                data["stack"] = json!(Backtrace::force_capture().to_string());
                data["stackSite"] = json!("catch");
                message
            }
        };
        data["error"] = json!(message);

        self.audit.log_security_event(
            SecurityEvent::new("middleware_error", Severity::High)
                .category(EventCategory::Error)
                .data(data),
        );
        AppError::internal(message).into_response()
    }
}

/// Why evaluation produced no verdict.
enum Failure {
    Error(AppError),
    Panic(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Middleware entry point: `middleware::from_fn_with_state(gate, enforce)`.
pub async fn enforce(State(gate): State<SecurityGate>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let origin = parts.headers.get(header::ORIGIN).cloned();

    let outcome = AssertUnwindSafe(gate.evaluate(&parts)).catch_unwind().await;

    let mut response = match outcome {
        Ok(Ok(Verdict::Respond(response))) => response,
        Ok(Ok(Verdict::Pass(ctx))) => {
            if let Some(principal) = ctx.principal.clone() {
                parts.extensions.insert(principal);
            }
            parts.extensions.insert(ctx);
            next.run(Request::from_parts(parts, body)).await
        }
        Ok(Err(err)) => gate.internal_failure(&parts, Failure::Error(err)),
        Err(payload) => gate.internal_failure(&parts, Failure::Panic(panic_message(payload.as_ref()))),
    };

    gate.cors.apply(origin.as_ref(), response.headers_mut());
    response
}
