use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use backend_domain::{
    aggregate_pairs,
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
};

use super::seed_file::SeedData;

/// Process-local store implementing every port. Backs `storage = "memory"`
/// for local development and the application tests.
#[derive(Default)]
pub struct MemoryRepo {
    entries: RwLock<Vec<AuditLogEntry>>,
    exam_events: RwLock<Vec<ExamEvent>>,
    users: RwLock<Vec<UserSummary>>,
    courses: RwLock<Vec<CourseSummary>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        Self {
            entries: RwLock::new(seed.audit_entries),
            exam_events: RwLock::new(seed.exam_events),
            users: RwLock::new(seed.users),
            courses: RwLock::new(seed.courses),
        }
    }

    pub async fn add_exam_events(&self, events: Vec<ExamEvent>) {
        self.exam_events.write().await.extend(events);
    }

    pub async fn add_users(&self, users: Vec<UserSummary>) {
        self.users.write().await.extend(users);
    }

    pub async fn add_courses(&self, courses: Vec<CourseSummary>) {
        self.courses.write().await.extend(courses);
    }
}

#[async_trait]
impl AuditLogRepository for MemoryRepo {
    async fn ensure_schema(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn insert_entries(&self, entries: &[AuditLogEntry]) -> anyhow::Result<()> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(())
    }

    async fn fetch_entries(&self, filter: &AuditLogFilter) -> anyhow::Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        let mut matched: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(filter.limit);
        Ok(matched)
    }

    async fn aggregate_pairs(&self, query: &PairAggregation) -> anyhow::Result<Vec<PairGroup>> {
        let entries = self.entries.read().await;
        Ok(aggregate_pairs(entries.iter(), query))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl CalendarRepository for MemoryRepo {
    async fn fetch_exam_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<ExamEvent>> {
        let events = self.exam_events.read().await;
        let mut matched: Vec<ExamEvent> = events
            .iter()
            .filter(|event| {
                event.event_type == EXAM_EVENT_TYPE
                    && event.course_id.as_deref().is_some_and(|id| !id.is_empty())
                    && event.start_date >= from
                    && event.start_date <= to
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        Ok(matched)
    }
}

#[async_trait]
impl DirectoryRepository for MemoryRepo {
    async fn fetch_users(&self, ids: &[String]) -> anyhow::Result<Vec<UserSummary>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|user| ids.contains(&user.id))
            .cloned()
            .collect())
    }

    async fn fetch_courses(&self, ids: &[String]) -> anyhow::Result<Vec<CourseSummary>> {
        let courses = self.courses.read().await;
        Ok(courses
            .iter()
            .filter(|course| ids.contains(&course.id))
            .cloned()
            .collect())
    }
}
