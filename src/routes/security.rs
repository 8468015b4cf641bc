//! Admin views over the in-memory security log. Every route here sits behind
//! the admin gate.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::app::AppState;
use crate::authz::Feature;
use crate::errors::{AppError, AppResult, ErrorResponse};
use crate::events::{AuditRecord, Dashboard, Entry, EventFilter, PatternAnalytics, SecurityEvent};
use crate::jwt::AuthUser;

#[derive(Debug, Serialize, ToSchema)]
pub struct EventList {
    pub total: usize,
    #[schema(value_type = Vec<SecurityEvent>)]
    pub events: Vec<Entry<SecurityEvent>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditRange {
    /// Inclusive lower bound; unbounded when absent
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound; defaults to now
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditExport {
    pub exported_at: DateTime<Utc>,
    pub total: usize,
    #[schema(value_type = Vec<AuditRecord>)]
    pub records: Vec<Entry<AuditRecord>>,
}

#[utoipa::path(
    get,
    path = "/security/dashboard",
    tag = "Security",
    responses(
        (status = 200, description = "Security overview", body = Dashboard),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin only", body = ErrorResponse)
    )
)]
pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<Dashboard>> {
    Ok(Json(state.audit.dashboard()))
}

#[utoipa::path(
    get,
    path = "/security/events",
    tag = "Security",
    params(EventFilter),
    responses(
        (status = 200, description = "Matching events, newest first", body = EventList),
        (status = 403, description = "Admin only", body = ErrorResponse)
    )
)]
pub async fn events(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> AppResult<Json<EventList>> {
    let events = state.audit.query_events(&filter);
    Ok(Json(EventList {
        total: events.len(),
        events,
    }))
}

#[utoipa::path(
    get,
    path = "/security/audit",
    tag = "Security",
    params(AuditRange),
    responses(
        (status = 200, description = "Audit records in range", body = AuditExport),
        (status = 400, description = "start is after end", body = ErrorResponse),
        (status = 403, description = "Admin with export permission only", body = ErrorResponse)
    )
)]
pub async fn audit_export(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(range): Query<AuditRange>,
) -> AppResult<Json<AuditExport>> {
    principal.require_feature(Feature::ExportData)?;

    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(AppError::bad_request("start must not be after end"));
        }
    }

    let records = state.audit.export_audit(range.start, range.end);
    tracing::info!(user_id = %principal.user_id, count = records.len(), "audit log exported");

    Ok(Json(AuditExport {
        exported_at: Utc::now(),
        total: records.len(),
        records,
    }))
}

#[utoipa::path(
    get,
    path = "/security/patterns",
    tag = "Security",
    responses(
        (status = 200, description = "Aggregated anonymous usage patterns", body = PatternAnalytics),
        (status = 403, description = "Admin only", body = ErrorResponse)
    )
)]
pub async fn pattern_analytics(State(state): State<AppState>) -> AppResult<Json<PatternAnalytics>> {
    Ok(Json(state.audit.pattern_analytics()))
}
