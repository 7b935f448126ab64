// Audit log entity
// Append-only record of a state-changing action

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ATTENDANCE_UPDATE: &str = "ATTENDANCE_UPDATE";
pub const STATUS_PRESENT: &str = "present";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub actor_id: Option<String>,
    pub actor_role: String,
    pub action: String,
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub correction_reason: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// A correction that manually sets `present` from any other value.
    pub fn is_present_change(&self) -> bool {
        self.new_status.as_deref() == Some(STATUS_PRESENT)
            && self.old_status.as_deref() != Some(STATUS_PRESENT)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditIngestEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub actor_role: Option<String>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub old_status: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
    #[serde(default)]
    pub correction_reason: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AuditIngestEntry {
    /// Resolves the typed columns once, at the write boundary. Explicit
    /// fields win over `meta`; within `meta` the camelCase key wins over
    /// the snake_case one written by older clients.
    pub fn into_entry(self, fallback_id: String, received_at: DateTime<Utc>) -> AuditLogEntry {
        let student_id = non_empty(self.student_id)
            .or_else(|| meta_text(&self.meta, &["studentId", "student_id"]));
        let course_id = non_empty(self.course_id)
            .or_else(|| meta_text(&self.meta, &["courseId", "course_id"]));
        let old_status = non_empty(self.old_status)
            .or_else(|| meta_text(&self.meta, &["oldStatus", "old_status"]));
        let new_status = non_empty(self.new_status)
            .or_else(|| meta_text(&self.meta, &["newStatus", "new_status"]));
        let correction_reason = non_empty(self.correction_reason)
            .or_else(|| meta_text(&self.meta, &["correctionReason", "correction_reason"]));

        AuditLogEntry {
            id: non_empty(self.id).unwrap_or(fallback_id),
            actor_id: non_empty(self.actor_id),
            actor_role: self.actor_role.unwrap_or_default().trim().to_string(),
            action: self.action.trim().to_uppercase(),
            student_id,
            course_id,
            old_status: old_status.map(|value| value.to_lowercase()),
            new_status: new_status.map(|value| value.to_lowercase()),
            correction_reason,
            meta: self.meta,
            created_at: self.created_at.unwrap_or(received_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditIngestEnvelope {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub entries: Vec<AuditIngestEntry>,
}

/// Raw-log drill-down query; field names mirror `RecommendedFilters`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub course_id: Option<String>,
    pub student_id: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLogFilter {
    pub course_id: Option<String>,
    pub student_id: Option<String>,
    pub action: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl AuditLogFilter {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(course_id) = &self.course_id {
            if entry.course_id.as_ref() != Some(course_id) {
                return false;
            }
        }
        if let Some(student_id) = &self.student_id {
            if entry.student_id.as_ref() != Some(student_id) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.created_at < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.created_at > end {
                return false;
            }
        }
        true
    }
}

/// Grouping request against the audit store. Every rule is expressed as one
/// of these; the store groups matching entries by (student, course).
#[derive(Debug, Clone, PartialEq)]
pub struct PairAggregation {
    pub action: String,
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub present_changes_only: bool,
    pub course_id: Option<String>,
    pub min_count: u64,
    pub limit: usize,
}

impl PairAggregation {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if entry.action != self.action || entry.created_at < self.since {
            return false;
        }
        if let Some(until) = self.until {
            if entry.created_at > until {
                return false;
            }
        }
        if self.present_changes_only && !entry.is_present_change() {
            return false;
        }
        if let Some(course_id) = &self.course_id {
            if entry.course_id.as_ref() != Some(course_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairGroup {
    pub student_id: String,
    pub course_id: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn meta_text(meta: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match meta.get(*key)? {
        Value::String(text) => non_empty(Some(text.clone())),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}
