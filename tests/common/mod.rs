#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use axum::body::{self, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use erp_gate::authz::Role;
use erp_gate::db::{SqliteUserStore, UserStore, MIGRATOR};
use erp_gate::jwt::JwtConfig;
use erp_gate::models::user::{NewUser, User};
use erp_gate::security::default_origins;
use erp_gate::utils::HashCost;
use erp_gate::{build_router, AppState};

pub const CHEAP: HashCost = HashCost { memory_kib: 1024, iterations: 1, parallelism: 1 };
pub const PASSWORD: &str = "Sup3rSecret!";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub pool: SqlitePool,
    logins: AtomicU32,
    _dir: TempDir,
}

pub async fn test_pool() -> Result<(SqlitePool, TempDir)> {
    let dir = tempfile::tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;
    MIGRATOR.run(&pool).await?;
    Ok((pool, dir))
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let (pool, dir) = test_pool().await?;
        let state = AppState::with_options(pool.clone(), JwtConfig::new("test-secret")?, CHEAP, default_origins())?;
        Ok(Self {
            app: build_router(state.clone()),
            state,
            pool,
            logins: AtomicU32::new(0),
            _dir: dir,
        })
    }

    pub async fn user(&self, email: &str, role: Role) -> Result<User> {
        let store = SqliteUserStore::new(self.pool.clone());
        Ok(store
            .create(
                NewUser {
                    email: email.to_string(),
                    name: format!("{role} user"),
                    password: PASSWORD.to_string(),
                    role,
                    department: None,
                    assigned_work: Vec::new(),
                    team_members: Vec::new(),
                },
                &CHEAP,
            )
            .await?)
    }

    pub async fn send(&self, req: Request<Body>) -> Result<Response> {
        Ok(self.app.clone().oneshot(req).await?)
    }

    /// POST /auth/login from a fixed client address.
    pub async fn login_from(&self, ip: &str, email: &str, password: &str) -> Result<Response> {
        let req = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(json!({ "email": email, "password": password }).to_string()))?;
        self.send(req).await
    }

    /// POST /auth/login over a direct connection from `peer`, no forwarding headers.
    pub async fn login_via_peer(&self, peer: SocketAddr, email: &str, password: &str) -> Result<Response> {
        let mut req = Request::builder()
            .method("POST")
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": email, "password": password }).to_string()))?;
        req.extensions_mut().insert(ConnectInfo(peer));
        self.send(req).await
    }

    /// Logs in from a fresh address and returns the session token.
    pub async fn token(&self, email: &str) -> Result<String> {
        let n = self.logins.fetch_add(1, Ordering::Relaxed);
        let resp = self.login_from(&format!("10.0.{}.{}", n / 250, n % 250 + 1), email, PASSWORD).await?;
        assert_eq!(resp.status(), StatusCode::OK, "login for {email} failed");
        let v = body_json(resp).await?;
        Ok(v["token"].as_str().unwrap_or_default().to_string())
    }

    pub async fn get_with(&self, uri: &str, token: &str) -> Result<Response> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        self.send(req).await
    }
}

pub async fn body_json(resp: Response) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
