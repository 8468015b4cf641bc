use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{RequestContext, Severity};

/// A stored record: generated id and server timestamp around the payload.
#[derive(Debug, Clone, Serialize)]
pub struct Entry<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Auth,
    Access,
    Error,
    Performance,
    Security,
    UserAction,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SecurityEvent {
    /// Event name, e.g. `api_request`, `rate_limit_exceeded`
    #[serde(rename = "type")]
    pub kind: String,
    pub category: EventCategory,
    pub severity: Severity,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[schema(value_type = Object)]
    pub data: Value,
    pub resolved: bool,
}

impl SecurityEvent {
    pub fn new(kind: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: kind.into(),
            category: EventCategory::Security,
            severity,
            source: "security_gate".to_string(),
            user_id: None,
            session_id: None,
            ip: None,
            user_agent: None,
            data: Value::Object(Map::new()),
            resolved: false,
        }
    }

    pub fn category(mut self, category: EventCategory) -> Self {
        self.category = category;
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn context(mut self, ctx: &RequestContext) -> Self {
        self.ip = ctx.ip.clone();
        self.user_agent = ctx.user_agent.clone();
        self.session_id = Some(ctx.session_id.clone());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditRecord {
    pub action: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub before_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub after_state: Option<Value>,
    #[schema(value_type = Object)]
    pub metadata: Value,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            user_id: None,
            session_id: None,
            before_state: None,
            after_state: None,
            metadata: Value::Object(Map::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PerformanceMetric {
    #[schema(example = "page_load_time")]
    pub metric: String,
    pub value: f64,
    #[serde(default = "default_unit")]
    #[schema(example = "ms")]
    pub unit: String,
    #[serde(default = "empty_object")]
    #[schema(value_type = Object)]
    pub context: Value,
}

fn default_unit() -> String {
    "ms".to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Navigation,
    Search,
    Workflow,
    FeatureUsage,
}

/// Stable pseudonymous identifier for usage patterns.
///
/// Either a client-persisted `anon_…` token or a freshly generated one. Cannot
/// be built from a user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "anon_1718000000000_k3j9x2m1q")]
pub struct AnonymousId(String);

const ANON_PREFIX: &str = "anon_";
const ANON_MAX_LEN: usize = 64;

impl AnonymousId {
    pub fn generate() -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{ANON_PREFIX}{}_{}", Utc::now().timestamp_millis(), &suffix[..9]))
    }

    /// Accepts a client-supplied id if it has the expected shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.starts_with(ANON_PREFIX)
            && raw.len() > ANON_PREFIX.len()
            && raw.len() <= ANON_MAX_LEN
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| Self(raw.to_string()))
    }

    /// Client id if valid, otherwise a new one.
    pub fn from_client_or_generate(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnonymousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AnonymousId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid anonymous id: {value}"))
    }
}

impl From<AnonymousId> for String {
    fn from(value: AnonymousId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserPattern {
    pub pattern_type: PatternType,
    pub anonymous_id: AnonymousId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<u64>,
    #[schema(value_type = Object)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_ids_are_validated() {
        let generated = AnonymousId::generate();
        assert!(generated.as_str().starts_with("anon_"));
        assert_eq!(AnonymousId::parse(generated.as_str()), Some(generated));

        assert!(AnonymousId::parse("anon_1718000000000_k3j9x2m1q").is_some());
        assert!(AnonymousId::parse("anon_").is_none());
        assert!(AnonymousId::parse("3f0c8d52-8b5e-4a59-9f3e-5f1c1a2b3c4d").is_none());
        assert!(AnonymousId::parse("anon_<script>").is_none());
    }

    #[test]
    fn invalid_client_id_is_replaced() {
        let id = AnonymousId::from_client_or_generate(Some("user-42"));
        assert_ne!(id.as_str(), "user-42");
        assert!(id.as_str().starts_with("anon_"));
    }

    #[test]
    fn entries_flatten_their_record() {
        let entry = Entry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            record: SecurityEvent::new("api_request", Severity::Low),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "api_request");
        assert_eq!(json["severity"], "low");
        assert!(json.get("id").is_some());
    }
}
