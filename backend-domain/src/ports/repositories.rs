use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    AuditLogEntry,
    AuditLogFilter,
    CourseSummary,
    ExamEvent,
    PairAggregation,
    PairGroup,
    UserSummary,
};

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn ensure_schema(&self) -> anyhow::Result<()>;
    async fn insert_entries(&self, entries: &[AuditLogEntry]) -> anyhow::Result<()>;
    async fn fetch_entries(&self, filter: &AuditLogFilter) -> anyhow::Result<Vec<AuditLogEntry>>;
    /// Groups matching entries by (student, course), keeps groups with at
    /// least `min_count` entries, orders by count desc then last seen desc
    /// and returns at most `limit` rows.
    async fn aggregate_pairs(&self, query: &PairAggregation) -> anyhow::Result<Vec<PairGroup>>;
    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Exam events with a course reference starting within `[from, to]`,
    /// ordered by start date.
    async fn fetch_exam_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ExamEvent>>;
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn fetch_users(&self, ids: &[String]) -> anyhow::Result<Vec<UserSummary>>;
    async fn fetch_courses(&self, ids: &[String]) -> anyhow::Result<Vec<CourseSummary>>;
}
