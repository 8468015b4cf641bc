//! In-memory security event and audit log
//!
//! Four independent capped collections (security events, audit records,
//! performance samples, anonymised usage patterns). State lives for the
//! process lifetime only.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod loggable;
mod records;
mod store;

pub use loggable::{Loggable, Severity};
pub use records::{
    AnonymousId, AuditRecord, Entry, EventCategory, PatternType, PerformanceMetric, SecurityEvent,
    UserPattern,
};
pub use store::{error_chain, AuditStore, CappedLog, Dashboard, EventFilter, PatternAnalytics, SystemHealth, LOG_CAPACITY};

pub const SESSION_COOKIE: &str = "session-id";
pub const SESSION_HEADER: &str = "x-session-id";

/// Where a request came from, as recorded in events and audit records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Correlation id only; carries no authentication meaning.
    pub session_id: String,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self {
            ip: client_ip(headers),
            user_agent,
            session_id: session_id(headers),
        }
    }

    /// Like [`from_headers`](Self::from_headers), falling back to the TCP peer
    /// when no forwarding header names the client.
    pub fn from_parts(parts: &Parts) -> Self {
        let mut ctx = Self::from_headers(&parts.headers);
        if ctx.ip.is_none() {
            ctx.ip = peer_ip(parts);
        }
        ctx
    }
}

/// Socket peer address, present when served with `into_make_service_with_connect_info`.
pub fn peer_ip(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// First non-empty of `X-Forwarded-For` (first hop), `X-Real-IP`, `CF-Connecting-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    header_str("x-forwarded-for")
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| header_str("x-real-ip"))
        .or_else(|| header_str("cf-connecting-ip"))
        .map(String::from)
}

/// `session-id` cookie, else `X-Session-ID`, else a fresh `temp_<uuid>`.
pub fn session_id(headers: &HeaderMap) -> String {
    cookie(headers, SESSION_COOKIE)
        .or_else(|| {
            headers
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| format!("temp_{}", Uuid::new_v4()))
}

/// Value of the named cookie across all `Cookie` headers.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
