use std::sync::Arc;

use backend_domain::ports::{AuditLogRepository, CalendarRepository, DirectoryRepository};
use backend_domain::RuntimeConfig;

use crate::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: RuntimeConfig,
    pub audit_repo: Arc<dyn AuditLogRepository>,
    pub calendar_repo: Arc<dyn CalendarRepository>,
    pub directory_repo: Arc<dyn DirectoryRepository>,
    pub metrics: Arc<Metrics>,
}
