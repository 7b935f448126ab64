use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::fs;
use tracing::info;

use backend_domain::{AuditIngestEntry, AuditLogEntry, CourseSummary, ExamEvent, UserSummary};

/// Contents of a development seed file for the in-memory store.
#[derive(Debug, Default)]
pub struct SeedData {
    pub users: Vec<UserSummary>,
    pub courses: Vec<CourseSummary>,
    pub exam_events: Vec<ExamEvent>,
    pub audit_entries: Vec<AuditLogEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SeedFile {
    users: Vec<UserSummary>,
    courses: Vec<CourseSummary>,
    exam_events: Vec<ExamEvent>,
    audit_entries: Vec<AuditIngestEntry>,
}

/// Reads `.json` with serde_json and anything else as YAML. Audit entries go
/// through the same normalization as the ingest endpoint.
pub async fn load_seed(path: &str) -> Result<SeedData> {
    if !Path::new(path).exists() {
        return Err(anyhow!("seed file '{}' not found", path));
    }
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file '{}'", path))?;
    let is_json = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let file: SeedFile = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    let loaded_at = Utc::now();
    let audit_entries: Vec<AuditLogEntry> = file
        .audit_entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_entry(format!("seed-{}", index + 1), loaded_at))
        .collect();
    info!(
        "loaded seed {}: {} users, {} courses, {} exams, {} audit entries",
        path,
        file.users.len(),
        file.courses.len(),
        file.exam_events.len(),
        audit_entries.len()
    );
    Ok(SeedData {
        users: file.users,
        courses: file.courses,
        exam_events: file.exam_events,
        audit_entries,
    })
}
