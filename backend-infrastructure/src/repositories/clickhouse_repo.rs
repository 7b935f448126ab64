use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::warn;

use backend_domain::{
    AuditLogEntry,
    AuditLogFilter,
    AuditLogRepository,
    CalendarRepository,
    CourseSummary,
    DirectoryRepository,
    ExamEvent,
    PairAggregation,
    PairGroup,
    UserSummary,
    EXAM_EVENT_TYPE,
    STATUS_PRESENT,
};

use crate::utils::{offset_to_utc, utc_to_offset};

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct AuditLogRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    created_at: OffsetDateTime,
    id: String,
    actor_id: String,
    actor_role: String,
    action: String,
    student_id: String,
    course_id: String,
    old_status: String,
    new_status: String,
    correction_reason: String,
    meta_json: String,
}

impl From<&AuditLogEntry> for AuditLogRow {
    fn from(entry: &AuditLogEntry) -> Self {
        Self {
            created_at: utc_to_offset(entry.created_at),
            id: entry.id.clone(),
            actor_id: entry.actor_id.clone().unwrap_or_default(),
            actor_role: entry.actor_role.clone(),
            action: entry.action.clone(),
            student_id: entry.student_id.clone().unwrap_or_default(),
            course_id: entry.course_id.clone().unwrap_or_default(),
            old_status: entry.old_status.clone().unwrap_or_default(),
            new_status: entry.new_status.clone().unwrap_or_default(),
            correction_reason: entry.correction_reason.clone().unwrap_or_default(),
            meta_json: Value::Object(entry.meta.clone()).to_string(),
        }
    }
}

impl AuditLogRow {
    fn into_entry(self) -> AuditLogEntry {
        let meta = match serde_json::from_str::<Value>(&self.meta_json) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(err) => {
                warn!("audit log {} has unreadable meta_json: {}", self.id, err);
                Map::new()
            }
        };
        AuditLogEntry {
            id: self.id,
            actor_id: empty_to_none(self.actor_id),
            actor_role: self.actor_role,
            action: self.action,
            student_id: empty_to_none(self.student_id),
            course_id: empty_to_none(self.course_id),
            old_status: empty_to_none(self.old_status),
            new_status: empty_to_none(self.new_status),
            correction_reason: empty_to_none(self.correction_reason),
            meta,
            created_at: offset_to_utc(self.created_at),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Row)]
struct PairGroupRow {
    student_id: String,
    course_id: String,
    cnt: u64,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    first_seen: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    last_seen: OffsetDateTime,
}

#[derive(Debug, Clone, Deserialize, Row)]
struct ExamEventRow {
    #[serde(with = "clickhouse::serde::time::datetime64::millis")]
    start_date: OffsetDateTime,
    event_type: String,
    course_id: Option<String>,
    title: String,
}

#[derive(Debug, Clone, Deserialize, Row)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    student_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Row)]
struct CourseRow {
    id: String,
    name: String,
    code: String,
}

#[derive(Clone)]
pub struct ClickhouseRepo {
    client: Client,
    database: String,
}

impl ClickhouseRepo {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }
}

#[async_trait]
impl AuditLogRepository for ClickhouseRepo {
    async fn ensure_schema(&self) -> Result<()> {
        let create_db = format!("CREATE DATABASE IF NOT EXISTS {}", self.database);
        self.client.query(&create_db).execute().await?;

        let create_audit_logs = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    created_at DateTime64(3),
    id String,
    actor_id String,
    actor_role String,
    action LowCardinality(String),
    student_id String,
    course_id String,
    old_status LowCardinality(String),
    new_status LowCardinality(String),
    correction_reason String,
    meta_json String
) ENGINE = MergeTree
PARTITION BY toYYYYMM(created_at)
ORDER BY (action, course_id, student_id, created_at)
"#;
        self.client.query(create_audit_logs).execute().await?;

        let create_calendar = r#"
CREATE TABLE IF NOT EXISTS calendar_events (
    start_date DateTime64(3),
    event_type LowCardinality(String),
    course_id Nullable(String),
    title String
) ENGINE = MergeTree
ORDER BY (event_type, start_date)
"#;
        self.client.query(create_calendar).execute().await?;

        let create_users = r#"
CREATE TABLE IF NOT EXISTS users (
    id String,
    name String,
    email String,
    role LowCardinality(String),
    student_id Nullable(String)
) ENGINE = ReplacingMergeTree
ORDER BY id
"#;
        self.client.query(create_users).execute().await?;

        let create_courses = r#"
CREATE TABLE IF NOT EXISTS courses (
    id String,
    name String,
    code String
) ENGINE = ReplacingMergeTree
ORDER BY id
"#;
        self.client.query(create_courses).execute().await?;
        Ok(())
    }

    async fn insert_entries(&self, entries: &[AuditLogEntry]) -> Result<()> {
        let mut insert = self.client.insert("audit_logs")?;
        for entry in entries {
            insert.write(&AuditLogRow::from(entry)).await?;
        }
        insert.end().await?;
        Ok(())
    }

    async fn fetch_entries(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>> {
        let mut sql = String::from(
            "SELECT ?fields FROM audit_logs WHERE 1 = 1",
        );
        if filter.course_id.is_some() {
            sql.push_str(" AND course_id = ?");
        }
        if filter.student_id.is_some() {
            sql.push_str(" AND student_id = ?");
        }
        if filter.action.is_some() {
            sql.push_str(" AND action = ?");
        }
        if filter.start.is_some() {
            sql.push_str(" AND created_at >= fromUnixTimestamp64Milli(?)");
        }
        if filter.end.is_some() {
            sql.push_str(" AND created_at <= fromUnixTimestamp64Milli(?)");
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");

        let mut query = self.client.query(&sql);
        if let Some(course_id) = &filter.course_id {
            query = query.bind(course_id.as_str());
        }
        if let Some(student_id) = &filter.student_id {
            query = query.bind(student_id.as_str());
        }
        if let Some(action) = &filter.action {
            query = query.bind(action.as_str());
        }
        if let Some(start) = filter.start {
            query = query.bind(start.timestamp_millis());
        }
        if let Some(end) = filter.end {
            query = query.bind(end.timestamp_millis());
        }
        let rows = query
            .bind(filter.limit as u64)
            .fetch_all::<AuditLogRow>()
            .await?;
        Ok(rows.into_iter().map(AuditLogRow::into_entry).collect())
    }

    async fn aggregate_pairs(&self, request: &PairAggregation) -> Result<Vec<PairGroup>> {
        let mut sql = String::from(
            "SELECT student_id, course_id, count() AS cnt, \
             min(created_at) AS first_seen, max(created_at) AS last_seen \
             FROM audit_logs \
             WHERE action = ? AND created_at >= fromUnixTimestamp64Milli(?)",
        );
        if request.until.is_some() {
            sql.push_str(" AND created_at <= fromUnixTimestamp64Milli(?)");
        }
        if request.present_changes_only {
            sql.push_str(" AND new_status = ? AND old_status != ?");
        }
        if request.course_id.is_some() {
            sql.push_str(" AND course_id = ?");
        }
        sql.push_str(
            " AND student_id != '' AND course_id != '' \
             GROUP BY student_id, course_id \
             HAVING cnt >= ? \
             ORDER BY cnt DESC, last_seen DESC, student_id, course_id \
             LIMIT ?",
        );

        let mut query = self
            .client
            .query(&sql)
            .bind(request.action.as_str())
            .bind(request.since.timestamp_millis());
        if let Some(until) = request.until {
            query = query.bind(until.timestamp_millis());
        }
        if request.present_changes_only {
            query = query.bind(STATUS_PRESENT).bind(STATUS_PRESENT);
        }
        if let Some(course_id) = &request.course_id {
            query = query.bind(course_id.as_str());
        }
        let rows = query
            .bind(request.min_count)
            .bind(request.limit as u64)
            .fetch_all::<PairGroupRow>()
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PairGroup {
                student_id: row.student_id,
                course_id: row.course_id,
                count: row.cnt,
                first_seen: offset_to_utc(row.first_seen),
                last_seen: offset_to_utc(row.last_seen),
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let _: u8 = self.client.query("SELECT toUInt8(1)").fetch_one().await?;
        Ok(())
    }
}

#[async_trait]
impl CalendarRepository for ClickhouseRepo {
    async fn fetch_exam_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExamEvent>> {
        let rows = self
            .client
            .query(
                "SELECT ?fields FROM calendar_events \
                 WHERE event_type = ? AND course_id IS NOT NULL AND course_id != '' \
                 AND start_date >= fromUnixTimestamp64Milli(?) \
                 AND start_date <= fromUnixTimestamp64Milli(?) \
                 ORDER BY start_date",
            )
            .bind(EXAM_EVENT_TYPE)
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all::<ExamEventRow>()
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ExamEvent {
                event_type: row.event_type,
                course_id: row.course_id,
                start_date: offset_to_utc(row.start_date),
                title: row.title,
            })
            .collect())
    }
}

#[async_trait]
impl DirectoryRepository for ClickhouseRepo {
    async fn fetch_users(&self, ids: &[String]) -> Result<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query("SELECT ?fields FROM users FINAL WHERE has(?, id)")
            .bind(ids)
            .fetch_all::<UserRow>()
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| UserSummary {
                id: row.id,
                name: row.name,
                email: row.email,
                role: row.role,
                student_id: row.student_id,
            })
            .collect())
    }

    async fn fetch_courses(&self, ids: &[String]) -> Result<Vec<CourseSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query("SELECT ?fields FROM courses FINAL WHERE has(?, id)")
            .bind(ids)
            .fetch_all::<CourseRow>()
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| CourseSummary {
                id: row.id,
                name: row.name,
                code: row.code,
            })
            .collect())
    }
}

fn empty_to_none(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
