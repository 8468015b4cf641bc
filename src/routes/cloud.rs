use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::authz::cloud::{graph_scopes, onedrive_profile, validate_operation, CloudOperation, CloudPermission};
use crate::errors::{AppResult, ErrorResponse};
use crate::jwt::AuthUser;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudValidateRequest {
    pub operation: CloudOperation,
    pub path: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudValidateResponse {
    pub allowed: bool,
    /// Denial reason, absent when allowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub permission: CloudPermission,
    pub quota_gb: u32,
    pub graph_scopes: Vec<String>,
}

/// Dry-run a OneDrive operation against the caller's cloud profile.
#[utoipa::path(
    post,
    path = "/cloud/validate",
    tag = "Cloud",
    request_body = CloudValidateRequest,
    responses(
        (status = 200, description = "Decision for the requested operation", body = CloudValidateResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn validate(
    AuthUser(principal): AuthUser,
    Json(payload): Json<CloudValidateRequest>,
) -> AppResult<Json<CloudValidateResponse>> {
    let role = principal.role;
    let decision = validate_operation(role, payload.operation, &payload.path, payload.file_name.as_deref());
    if let Err(denied) = &decision {
        tracing::debug!(user_id = %principal.user_id, %role, path = %payload.path, reason = %denied, "cloud operation denied");
    }

    let profile = onedrive_profile(role);
    Ok(Json(CloudValidateResponse {
        allowed: decision.is_ok(),
        reason: decision.err().map(|denied| denied.to_string()),
        permission: profile.permissions,
        quota_gb: profile.quota_gb,
        graph_scopes: graph_scopes(role).into_iter().map(str::to_string).collect(),
    }))
}
