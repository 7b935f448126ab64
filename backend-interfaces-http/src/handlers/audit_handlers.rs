use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::{error, warn};

use backend_application::commands::audit_ingest_commands;
use backend_application::queries::{audit_log_queries, flag_queries};
use backend_application::AppState;
use backend_domain::{AuditLogEntry, AuditLogQuery, Flag, FlagQuery};

use crate::error::HttpError;
use crate::middleware::{authorize, parse_audit_entries};

pub async fn list_flags(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Flag>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let flags = flag_queries::list_flags(&state, FlagQuery::from_pairs(pairs)).await?;
    Ok(Json(flags))
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, HttpError> {
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }
    let rows = audit_log_queries::list_audit_logs(&state, query).await?;
    Ok(Json(rows))
}

pub async fn ingest_audit_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<StatusCode, HttpError> {
    state.metrics.record_ingest_request();
    if !authorize(&state.config, &headers) {
        return Err(HttpError::Unauthorized);
    }

    let entries = parse_audit_entries(&headers, &body).map_err(|err| {
        error!("failed to parse audit ingest body: {}", err);
        HttpError::BadRequest(err.to_string())
    })?;
    let original_len = entries.len();
    let entries = entries
        .into_iter()
        .filter(|entry| !entry.action.trim().is_empty())
        .collect::<Vec<_>>();
    if entries.len() != original_len {
        warn!(
            "dropped {} audit entries without an action",
            original_len - entries.len()
        );
    }
    if entries.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }

    audit_ingest_commands::ingest_audit_entries(&state, entries).await?;
    Ok(StatusCode::OK)
}
