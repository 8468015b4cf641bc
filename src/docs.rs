use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{authz, errors, events, models, routes};

#[derive(OpenApi)]
#[openapi(
	info(title = "erp-gate", description = "Role-based access control and request security for the trading ERP"),
	paths(
		routes::health::health,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::auth::permissions,
		routes::auth::team,
		routes::cloud::validate,
		routes::telemetry::record_metric,
		routes::telemetry::record_pattern,
		routes::telemetry::record_action,
		routes::security::dashboard,
		routes::security::events,
		routes::security::audit_export,
		routes::security::pattern_analytics
	),
	components(
		schemas(
			errors::ErrorResponse,
			authz::Role,
			authz::Feature,
			authz::FeatureFlags,
			authz::cloud::CloudPermission,
			authz::cloud::CloudOperation,
			authz::cloud::OneDriveProfile,
			authz::cloud::CloudAccessGrant,
			models::user::User,
			models::user::LoginRequest,
			models::user::AuthResponse,
			models::user::PermissionSummary,
			events::Severity,
			events::EventCategory,
			events::SecurityEvent,
			events::AuditRecord,
			events::PerformanceMetric,
			events::PatternType,
			events::AnonymousId,
			events::Dashboard,
			events::SystemHealth,
			events::PatternAnalytics,
			routes::health::HealthResponse,
			routes::auth::MessageResponse,
			routes::cloud::CloudValidateRequest,
			routes::cloud::CloudValidateResponse,
			routes::telemetry::RecordedResponse,
			routes::telemetry::PatternRecorded,
			routes::telemetry::PatternRequest,
			routes::telemetry::UserActionRequest,
			routes::security::EventList,
			routes::security::AuditExport
		)
	),
	tags(
		(name = "Health", description = "Liveness and database probe"),
		(name = "Auth", description = "Login and session introspection"),
		(name = "Cloud", description = "OneDrive access profiles"),
		(name = "Telemetry", description = "Performance samples and usage patterns"),
		(name = "Security", description = "Admin security dashboard and audit export")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	ensure_security_components(&mut doc)?;
	ensure_global_security(&mut doc)?;
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn root_object(doc: &mut Value) -> anyhow::Result<&mut Map<String, Value>> {
	doc.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))
}

fn ensure_security_components(doc: &mut Value) -> anyhow::Result<()> {
	let components = root_object(doc)?
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));

	let schemes = components
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("components must be an object"))?
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));

	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"bearerAuth".to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT",
				"description": "Session token from /auth/login; the auth-token cookie is accepted too"
			}),
		);
	}
	Ok(())
}

fn ensure_global_security(doc: &mut Value) -> anyhow::Result<()> {
	root_object(doc)?
		.entry("security")
		.or_insert_with(|| json!([{ "bearerAuth": [] }]));
	Ok(())
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}
