use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::credentials::CredentialValidator;
use crate::db::{SqliteUserStore, UserStore};
use crate::errors::{AppError, AppResult};
use crate::events::AuditStore;
use crate::jwt::JwtConfig;
use crate::routes::{auth, cloud, health, security, telemetry};
use crate::security::{cors_origins_from_env, default_origins, enforce, FixedWindowLimiter, SecurityGate, SecurityPolicy};
use crate::utils::HashCost;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub users: Arc<dyn UserStore>,
    pub credentials: CredentialValidator,
    pub audit: Arc<AuditStore>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub hash_cost: HashCost,
    pub cors_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> AppResult<Self> {
        Self::with_options(pool, jwt, HashCost::default(), default_origins())
    }

    /// Reads `JWT_SECRET`, the argon2 cost variables and `CORS_ORIGINS`.
    pub fn from_env(pool: SqlitePool) -> AppResult<Self> {
        let jwt = JwtConfig::from_env()?;
        Self::with_options(pool, jwt, HashCost::from_env()?, cors_origins_from_env())
    }

    pub fn with_options(pool: SqlitePool, jwt: JwtConfig, hash_cost: HashCost, cors_origins: Vec<String>) -> AppResult<Self> {
        let users: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool.clone()));
        let credentials = CredentialValidator::new(Arc::clone(&users), &hash_cost)?;

        Ok(Self {
            pool,
            jwt: Arc::new(jwt),
            users,
            credentials,
            audit: Arc::new(AuditStore::new()),
            limiter: Arc::new(FixedWindowLimiter::new()),
            hash_cost,
            cors_origins: cors_origins.into(),
        })
    }

    /// Gate for one route group, sharing this state's limiter and audit log.
    pub fn gate(&self, policy: SecurityPolicy) -> SecurityGate {
        SecurityGate::new(
            policy.with_cors_origins(Arc::clone(&self.cors_origins)),
            Arc::clone(&self.jwt),
            Arc::clone(&self.users),
            Arc::clone(&self.audit),
            Arc::clone(&self.limiter),
        )
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let state = AppState::from_env(pool)?;
    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    // `layer` rather than `route_layer` so unmatched methods and preflight
    // requests reach the gate too.
    let public_routes = Router::new()
        .route("/api/health", get(health::health))
        .route("/telemetry/patterns", post(telemetry::record_pattern))
        .layer(from_fn_with_state(state.gate(SecurityPolicy::public()), enforce));

    let login_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .layer(from_fn_with_state(state.gate(SecurityPolicy::login()), enforce));

    let account_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/permissions", get(auth::permissions))
        .route("/auth/team", get(auth::team))
        .route("/cloud/validate", post(cloud::validate))
        .route("/telemetry/metrics", post(telemetry::record_metric))
        .route("/telemetry/actions", post(telemetry::record_action))
        .layer(from_fn_with_state(state.gate(SecurityPolicy::authenticated()), enforce));

    let admin_routes = Router::new()
        .route("/security/dashboard", get(security::dashboard))
        .route("/security/events", get(security::events))
        .route("/security/audit", get(security::audit_export))
        .route("/security/patterns", get(security::pattern_analytics))
        .layer(from_fn_with_state(state.gate(SecurityPolicy::admin()), enforce));

    Router::new()
        .merge(public_routes)
        .merge(login_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
