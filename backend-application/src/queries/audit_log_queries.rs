use chrono::{DateTime, Duration, Utc};
use tracing::error;

use crate::{AppError, AppState};
use backend_domain::{parse_timestamp, AuditLogEntry, AuditLogFilter, AuditLogQuery};

/// Raw-log drill-down, typically fed with a flag's `recommendedFilters`.
pub async fn list_audit_logs(
    state: &AppState,
    query: AuditLogQuery,
) -> Result<Vec<AuditLogEntry>, AppError> {
    let filter = build_filter(query)?;
    let rows = state
        .audit_repo
        .fetch_entries(&filter)
        .await
        .map_err(|err| {
            error!("failed to fetch audit logs: {:#}", err);
            AppError::Internal(err.context("failed to fetch audit logs"))
        })?;
    Ok(rows)
}

fn build_filter(query: AuditLogQuery) -> Result<AuditLogFilter, AppError> {
    let start = match non_blank(query.start_date) {
        Some(value) => Some(
            parse_timestamp(&value)
                .map_err(|err| AppError::BadRequest(format!("invalid startDate: {}", err)))?,
        ),
        None => None,
    };
    let end = match non_blank(query.end_date) {
        Some(value) => Some(
            parse_end(&value)
                .map_err(|err| AppError::BadRequest(format!("invalid endDate: {}", err)))?,
        ),
        None => None,
    };
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(AppError::BadRequest("startDate is after endDate".to_string()));
        }
    }

    Ok(AuditLogFilter {
        course_id: non_blank(query.course_id),
        student_id: non_blank(query.student_id),
        action: non_blank(query.action).map(|action| action.to_uppercase()),
        start,
        end,
        limit: query.limit.unwrap_or(200).clamp(1, 2000),
    })
}

/// A bare date as the upper bound covers the whole day.
fn parse_end(value: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = parse_timestamp(value)?;
    if DateTime::parse_from_rfc3339(value.trim()).is_ok() {
        return Ok(parsed);
    }
    Ok(parsed + Duration::days(1) - Duration::milliseconds(1))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
