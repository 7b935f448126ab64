use chrono::Utc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{AppError, AppState};
use backend_domain::{AuditIngestEntry, AuditLogEntry};

/// Normalizes entries at the write boundary and appends them to the audit
/// store. Returns the number of stored entries.
pub async fn ingest_audit_entries(
    state: &AppState,
    entries: Vec<AuditIngestEntry>,
) -> Result<usize, AppError> {
    let received_at = Utc::now();
    let entries: Vec<AuditLogEntry> = entries
        .into_iter()
        .map(|entry| entry.into_entry(Uuid::new_v4().to_string(), received_at))
        .collect();

    let unattributed = entries
        .iter()
        .filter(|entry| entry.student_id.is_none() || entry.course_id.is_none())
        .count();
    if unattributed > 0 {
        debug!("{} audit entries carry no student/course pair", unattributed);
    }

    if let Err(err) = state.audit_repo.insert_entries(&entries).await {
        state.metrics.record_ingest_error();
        error!("failed to insert audit entries: {:#}", err);
        return Err(AppError::Internal(err.context("failed to store audit entries")));
    }

    state.metrics.record_ingest_entries(entries.len());
    Ok(entries.len())
}
