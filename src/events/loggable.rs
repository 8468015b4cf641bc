use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Severity of a logged occurrence. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine request traffic
    Low,
    /// Rejected tokens, rate limiting, failed logins
    Medium,
    /// Application errors and internal gate failures
    High,
    /// Escalated; also produces an audit record
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

/// Trait for entities whose changes are recorded in the audit log.
/// Implement this on a model to use `AuditStore::log_change`.
pub trait Loggable: Serialize + Send + Sync {
    /// The entity type name (e.g. "user"), used as the action prefix: "user.login"
    fn entity_type() -> &'static str;

    /// The subject ID (usually the entity's primary key)
    fn subject_id(&self) -> Uuid;

    /// Severity of a change; destructive actions rank higher.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "deactivated" => Severity::High,
            "created" | "updated" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}
