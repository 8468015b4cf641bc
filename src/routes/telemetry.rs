//! Client telemetry intake: performance samples, anonymised usage patterns and
//! attributed user actions.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult, ErrorResponse};
use crate::events::{AnonymousId, PatternType, PerformanceMetric, UserPattern};
use crate::jwt::AuthUser;

pub const ANONYMOUS_ID_HEADER: &str = "x-anonymous-id";

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordedResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecorded {
    pub id: Uuid,
    /// Echoed back so the client can persist a freshly generated id
    pub anonymous_id: AnonymousId,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatternRequest {
    pub pattern_type: PatternType,
    /// Ignored when the `X-Anonymous-ID` header carries a valid id
    #[serde(default)]
    pub anonymous_id: Option<String>,
    #[serde(default)]
    pub session_duration: Option<u64>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserActionRequest {
    #[schema(example = "export_pdf")]
    pub action: String,
    #[schema(example = "quotations")]
    pub resource: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: Value,
}

fn anonymous_id(headers: &HeaderMap, body: Option<&str>) -> AnonymousId {
    let header = headers.get(ANONYMOUS_ID_HEADER).and_then(|v| v.to_str().ok());
    match header.and_then(AnonymousId::parse) {
        Some(id) => id,
        None => AnonymousId::from_client_or_generate(body),
    }
}

#[utoipa::path(
    post,
    path = "/telemetry/metrics",
    tag = "Telemetry",
    request_body = PerformanceMetric,
    responses(
        (status = 200, description = "Sample recorded", body = RecordedResponse),
        (status = 400, description = "Invalid sample", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn record_metric(
    State(state): State<AppState>,
    Json(metric): Json<PerformanceMetric>,
) -> AppResult<Json<RecordedResponse>> {
    if metric.metric.trim().is_empty() || !metric.value.is_finite() {
        return Err(AppError::bad_request("Metric name and a finite value are required"));
    }
    let id = state.audit.log_performance(metric);
    Ok(Json(RecordedResponse { id }))
}

/// Anonymous usage pattern. Never attributed to a user, even when the caller
/// is signed in.
#[utoipa::path(
    post,
    path = "/telemetry/patterns",
    tag = "Telemetry",
    request_body = PatternRequest,
    params(("X-Anonymous-ID" = Option<String>, Header, description = "Client-persisted anonymous id")),
    responses((status = 200, description = "Pattern recorded", body = PatternRecorded)),
    security(())
)]
pub async fn record_pattern(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PatternRequest>,
) -> AppResult<Json<PatternRecorded>> {
    let anonymous_id = anonymous_id(&headers, payload.anonymous_id.as_deref());

    let id = match (payload.pattern_type, payload.data.get("query").and_then(Value::as_str)) {
        (PatternType::Search, Some(query)) => {
            let results = payload
                .data
                .get("resultCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            state.audit.log_search(anonymous_id.clone(), query, results as usize)
        }
        (pattern_type, _) => state.audit.log_pattern(UserPattern {
            pattern_type,
            anonymous_id: anonymous_id.clone(),
            session_duration: payload.session_duration,
            data: match payload.data {
                Value::Null => Value::Object(Map::new()),
                data => data,
            },
        }),
    };

    Ok(Json(PatternRecorded { id, anonymous_id }))
}

/// Attributed audit record of a user action, mirrored as an anonymised
/// feature-usage pattern.
#[utoipa::path(
    post,
    path = "/telemetry/actions",
    tag = "Telemetry",
    request_body = UserActionRequest,
    params(("X-Anonymous-ID" = Option<String>, Header, description = "Client-persisted anonymous id")),
    responses(
        (status = 200, description = "Action recorded", body = RecordedResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    )
)]
pub async fn record_action(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    headers: HeaderMap,
    Json(payload): Json<UserActionRequest>,
) -> AppResult<Json<RecordedResponse>> {
    if payload.action.trim().is_empty() || payload.resource.trim().is_empty() {
        return Err(AppError::bad_request("Action and resource are required"));
    }
    let id = state.audit.log_user_action(
        Some(principal.user_id),
        anonymous_id(&headers, None),
        &payload.action,
        &payload.resource,
        payload.data,
    );
    Ok(Json(RecordedResponse { id }))
}
