use anyhow::{anyhow, Result};

use backend_domain::StorageBackend;

pub fn validate_storage(value: &str) -> Result<StorageBackend> {
    StorageBackend::parse(value)
        .ok_or_else(|| anyhow!("storage must be 'clickhouse' or 'memory', got '{}'", value))
}

/// The database name is interpolated into DDL, so it must be a plain identifier.
pub fn validate_database_name(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("clickhouse_database is empty"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!("clickhouse_database contains invalid characters"));
    }
    Ok(())
}
