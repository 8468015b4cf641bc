use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::records::{
    AnonymousId, AuditRecord, Entry, EventCategory, PatternType, PerformanceMetric, SecurityEvent,
    UserPattern,
};
use super::{Loggable, RequestContext, Severity};

/// Records kept per collection before the oldest are dropped.
pub const LOG_CAPACITY: usize = 10_000;

const DASHBOARD_RECENT_EVENTS: usize = 10;
const DASHBOARD_RECENT_METRICS: usize = 5;
/// More high-severity events than this turns health from `attention` to `warning`.
const HIGH_SEVERITY_WARNING_THRESHOLD: usize = 5;
const SEARCH_QUERY_MAX_CHARS: usize = 50;

/// Append-only sequence holding at most `cap` entries; oldest evicted first.
pub struct CappedLog<T> {
    cap: usize,
    entries: Mutex<VecDeque<Entry<T>>>,
}

impl<T: Clone> CappedLog<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
        }
    }

    // A panic while holding the lock cannot leave the deque half-written.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, record: T) -> Uuid {
        let id = Uuid::new_v4();
        let mut entries = self.lock();
        entries.push_back(Entry {
            id,
            timestamp: Utc::now(),
            record,
        });
        while entries.len() > self.cap {
            entries.pop_front();
        }
        id
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Matching entries, newest first.
    pub fn newest_first<F>(&self, limit: Option<usize>, mut keep: F) -> Vec<Entry<T>>
    where
        F: FnMut(&Entry<T>) -> bool,
    {
        let entries = self.lock();
        entries
            .iter()
            .rev()
            .filter(|e| keep(*e))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&VecDeque<Entry<T>>) -> R) -> R {
        f(&self.lock())
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventFilter {
    /// Event name, e.g. `rate_limit_exceeded`
    pub kind: Option<String>,
    #[param(value_type = Option<String>, example = "high")]
    pub severity: Option<Severity>,
    pub user_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    fn matches(&self, entry: &Entry<SecurityEvent>) -> bool {
        let event = &entry.record;
        self.kind.as_deref().map_or(true, |k| event.kind == k)
            && self.severity.map_or(true, |s| event.severity == s)
            && self.user_id.map_or(true, |u| event.user_id == Some(u))
            && self.since.map_or(true, |t| entry.timestamp >= t)
            && self.until.map_or(true, |t| entry.timestamp <= t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Good,
    Attention,
    Warning,
    Critical,
}

impl SystemHealth {
    pub fn classify(critical: usize, high: usize) -> Self {
        if critical > 0 {
            SystemHealth::Critical
        } else if high > HIGH_SEVERITY_WARNING_THRESHOLD {
            SystemHealth::Warning
        } else if high > 0 {
            SystemHealth::Attention
        } else {
            SystemHealth::Good
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Dashboard {
    #[schema(value_type = Vec<SecurityEvent>)]
    pub recent_events: Vec<Entry<SecurityEvent>>,
    pub events_by_type: BTreeMap<String, usize>,
    pub events_by_severity: BTreeMap<String, usize>,
    #[schema(value_type = Vec<PerformanceMetric>)]
    pub performance_metrics: Vec<Entry<PerformanceMetric>>,
    pub system_health: SystemHealth,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct PatternAnalytics {
    pub navigation_patterns: BTreeMap<String, usize>,
    pub search_patterns: BTreeMap<String, usize>,
    pub feature_usage: BTreeMap<String, usize>,
    pub session_durations: Vec<u64>,
}

/// Process-wide in-memory security and audit log.
pub struct AuditStore {
    events: CappedLog<SecurityEvent>,
    audit: CappedLog<AuditRecord>,
    metrics: CappedLog<PerformanceMetric>,
    patterns: CappedLog<UserPattern>,
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditStore {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            events: CappedLog::new(cap),
            audit: CappedLog::new(cap),
            metrics: CappedLog::new(cap),
            patterns: CappedLog::new(cap),
        }
    }

    pub fn log_security_event(&self, event: SecurityEvent) -> Uuid {
        trace_event(&event);

        let escalate = (event.severity == Severity::Critical).then(|| {
            json!({
                "eventType": event.kind,
                "category": event.category,
                "severity": event.severity,
                "source": event.source,
            })
        });

        let id = self.events.push(event);

        if let Some(mut metadata) = escalate {
            metadata["eventId"] = json!(id);
            let mut record = AuditRecord::new("critical_security_event_triggered", "security_system");
            record.metadata = metadata;
            self.log_audit(record);
        }

        id
    }

    pub fn log_audit(&self, record: AuditRecord) -> Uuid {
        tracing::info!(
            action = %record.action,
            resource = %record.resource,
            user_id = ?record.user_id,
            "audit record"
        );
        self.audit.push(record)
    }

    pub fn log_performance(&self, metric: PerformanceMetric) -> Uuid {
        tracing::debug!(metric = %metric.metric, value = metric.value, unit = %metric.unit, "performance sample");
        self.metrics.push(metric)
    }

    pub fn log_pattern(&self, pattern: UserPattern) -> Uuid {
        tracing::debug!(pattern_type = ?pattern.pattern_type, "usage pattern");
        self.patterns.push(pattern)
    }

    /// Search pattern with the query cut to 50 characters.
    pub fn log_search(&self, anonymous_id: AnonymousId, query: &str, results: usize) -> Uuid {
        let query: String = query.chars().take(SEARCH_QUERY_MAX_CHARS).collect();
        self.log_pattern(UserPattern {
            pattern_type: PatternType::Search,
            anonymous_id,
            session_duration: None,
            data: json!({ "query": query, "resultCount": results }),
        })
    }

    /// Audit record of a user action plus an anonymised feature-usage pattern.
    pub fn log_user_action(
        &self,
        user_id: Option<Uuid>,
        anonymous_id: AnonymousId,
        action: &str,
        resource: &str,
        data: Value,
    ) -> Uuid {
        let mut record = AuditRecord::new(action, resource);
        record.user_id = user_id;
        record.after_state = Some(data.clone());
        record.metadata = json!({ "timestamp": Utc::now() });
        let id = self.log_audit(record);

        let mut pattern_data = json!({ "feature": action, "resource": resource });
        merge_object(&mut pattern_data, data);
        self.log_pattern(UserPattern {
            pattern_type: PatternType::FeatureUsage,
            anonymous_id,
            session_duration: None,
            data: pattern_data,
        });

        id
    }

    /// High-severity application error event, with the error's source chain.
    pub fn log_error(&self, err: &(dyn std::error::Error + 'static), context: Value) -> Uuid {
        let mut data = json!({ "message": err.to_string(), "causes": error_chain(err) });
        merge_object(&mut data, context);

        self.log_security_event(
            SecurityEvent::new("application_error", Severity::High)
                .category(EventCategory::Error)
                .source("application")
                .data(data),
        )
    }

    /// Audit record of a change to a domain entity, e.g. `user.login`.
    pub fn log_change<T: Loggable>(
        &self,
        action: &str,
        actor_id: Option<Uuid>,
        entity: &T,
        old_entity: Option<&T>,
        context: Option<&RequestContext>,
    ) -> Uuid {
        let snapshot = |e: &T| serde_json::to_value(e).unwrap_or(Value::Null);

        let mut record = AuditRecord::new(
            format!("{}.{}", T::entity_type(), action),
            format!("{}:{}", T::entity_type(), entity.subject_id()),
        );
        record.user_id = actor_id;
        record.session_id = context.map(|c| c.session_id.clone());
        record.before_state = old_entity.map(snapshot);
        record.after_state = Some(snapshot(entity));
        record.metadata = json!({
            "severity": entity.severity_for_action(action),
            "ip": context.and_then(|c| c.ip.clone()),
            "userAgent": context.and_then(|c| c.user_agent.clone()),
        });

        self.log_audit(record)
    }

    pub fn query_events(&self, filter: &EventFilter) -> Vec<Entry<SecurityEvent>> {
        self.events.newest_first(filter.limit, |e| filter.matches(e))
    }

    /// Audit records in `[start, end]`; `end` defaults to now.
    pub fn export_audit(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Vec<Entry<AuditRecord>> {
        let end = end.unwrap_or_else(Utc::now);
        self.audit.newest_first(None, |e| {
            start.map_or(true, |s| e.timestamp >= s) && e.timestamp <= end
        })
    }

    pub fn dashboard(&self) -> Dashboard {
        let (events_by_type, events_by_severity) = self.events.with_entries(|entries| {
            let mut by_type = BTreeMap::new();
            let mut by_severity = BTreeMap::new();
            for entry in entries {
                *by_type.entry(entry.record.kind.clone()).or_insert(0) += 1;
                *by_severity.entry(entry.record.severity.as_str().to_string()).or_insert(0) += 1;
            }
            (by_type, by_severity)
        });

        let count = |s: Severity| events_by_severity.get(s.as_str()).copied().unwrap_or(0);
        let system_health = SystemHealth::classify(count(Severity::Critical), count(Severity::High));

        Dashboard {
            recent_events: self.events.newest_first(Some(DASHBOARD_RECENT_EVENTS), |_| true),
            events_by_type,
            events_by_severity,
            performance_metrics: self.metrics.newest_first(Some(DASHBOARD_RECENT_METRICS), |_| true),
            system_health,
        }
    }

    pub fn pattern_analytics(&self) -> PatternAnalytics {
        self.patterns.with_entries(|entries| {
            let mut analytics = PatternAnalytics::default();
            for entry in entries {
                let pattern = &entry.record;
                let bucket = match pattern.pattern_type {
                    PatternType::Navigation => Some((&mut analytics.navigation_patterns, "action")),
                    PatternType::Search => Some((&mut analytics.search_patterns, "query")),
                    PatternType::FeatureUsage => Some((&mut analytics.feature_usage, "feature")),
                    PatternType::Workflow => None,
                };
                if let Some((counts, field)) = bucket {
                    let key = pattern.data.get(field).and_then(Value::as_str).unwrap_or("unknown");
                    *counts.entry(key.to_string()).or_insert(0) += 1;
                }
                if let Some(duration) = pattern.session_duration.filter(|d| *d > 0) {
                    analytics.session_durations.push(duration);
                }
            }
            analytics
        })
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn audit_count(&self) -> usize {
        self.audit.len()
    }
}

fn merge_object(target: &mut Value, extra: Value) {
    match (target.as_object_mut(), extra) {
        (Some(target), Value::Object(extra)) => target.extend(extra),
        (_, Value::Null) => {}
        (Some(target), other) => {
            target.insert("context".to_string(), other);
        }
        (None, _) => {}
    }
}

fn trace_event(event: &SecurityEvent) {
    let kind = event.kind.as_str();
    let source = event.source.as_str();
    match event.severity {
        Severity::Low => tracing::debug!(kind, source, user_id = ?event.user_id, "security event"),
        Severity::Medium => tracing::info!(kind, source, user_id = ?event.user_id, data = %event.data, "security event"),
        Severity::High => tracing::warn!(kind, source, user_id = ?event.user_id, data = %event.data, "security event"),
        Severity::Critical => tracing::error!(kind, source, user_id = ?event.user_id, data = %event.data, "critical security event"),
    }
}

/// Messages of `err`'s `source()` chain, outermost first, excluding `err` itself.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    chain
}
