use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::authz::cloud::grant_for;
use crate::authz::{list_modules, profile, Feature};
use crate::credentials::CredentialError;
use crate::errors::{AppError, AppResult, ErrorResponse};
use crate::events::{EventCategory, SecurityEvent, Severity};
use crate::jwt::{AuthUser, SessionClaims};
use crate::models::user::{AuthResponse, LoginRequest, PermissionSummary, User};
use crate::security::SecurityContext;
use crate::utils::utc_now;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// Loose shape check: one `@`, non-empty local part, dotted domain, no whitespace.
fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing or malformed email/password", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    security(())
)]
pub async fn login(
    State(state): State<AppState>,
    ctx: SecurityContext,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }
    if !looks_like_email(&payload.email) {
        return Err(AppError::bad_request("Invalid email format"));
    }

    let before = match state.credentials.validate(&payload.email, &payload.password).await {
        Ok(user) => user,
        Err(CredentialError::InvalidCredentials) => {
            state.audit.log_security_event(
                SecurityEvent::new("login_failed", Severity::Medium)
                    .category(EventCategory::Auth)
                    .source("auth.login")
                    .context(&ctx.request)
                    .data(json!({ "email": payload.email, "ip": ctx.request.ip })),
            );
            return Err(AppError::unauthorized("Invalid email or password"));
        }
        Err(err) => return Err(err.into()),
    };

    let token = state.jwt.issue(&SessionClaims {
        user_id: before.id,
        email: before.email.clone(),
        role: before.role,
        name: before.name.clone(),
        cloud_access: Some(grant_for(before.role)),
    })?;

    let now = utc_now();
    state.users.record_login(before.id, now).await?;

    let user = User {
        last_login: Some(now),
        ..before.clone()
    };
    state.audit.log_change("login", Some(user.id), &user, Some(&before), Some(&ctx.request));
    tracing::info!(user_id = %user.id, role = %user.role, "login succeeded");

    Ok(Json(AuthResponse {
        success: true,
        token,
        user,
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn me(State(state): State<AppState>, AuthUser(principal): AuthUser) -> AppResult<Json<User>> {
    let db_user = state
        .users
        .find_by_id(principal.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    Ok(Json(db_user.into_public()))
}

/// Tokens are stateless; the client discards its copy.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse))
)]
pub async fn logout(AuthUser(principal): AuthUser) -> AppResult<Json<MessageResponse>> {
    tracing::debug!(user_id = %principal.user_id, "logout");
    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/auth/permissions",
    tag = "Auth",
    responses((status = 200, description = "Modules and feature flags for the caller's role", body = PermissionSummary))
)]
pub async fn permissions(AuthUser(principal): AuthUser) -> AppResult<Json<PermissionSummary>> {
    Ok(Json(PermissionSummary {
        role: principal.role,
        modules: list_modules(principal.role).iter().map(|m| m.to_string()).collect(),
        features: profile(principal.role).features,
    }))
}

#[utoipa::path(
    get,
    path = "/auth/team",
    tag = "Auth",
    responses(
        (status = 200, description = "The calling manager's direct reports", body = [User]),
        (status = 403, description = "Role cannot view team activity", body = ErrorResponse)
    )
)]
pub async fn team(State(state): State<AppState>, AuthUser(principal): AuthUser) -> AppResult<Json<Vec<User>>> {
    principal.require_feature(Feature::TeamActivityView)?;
    let team = state.users.find_team(principal.user_id).await?;
    Ok(Json(team))
}

#[cfg(test)]
mod tests {
    use super::looks_like_email;

    #[test]
    fn email_shape() {
        assert!(looks_like_email("admin@phtrading.com"));
        assert!(!looks_like_email("admin"));
        assert!(!looks_like_email("admin@localhost"));
        assert!(!looks_like_email("@phtrading.com"));
        assert!(!looks_like_email("a b@phtrading.com"));
        assert!(!looks_like_email("a@b@phtrading.com"));
    }
}
