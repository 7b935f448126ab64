use std::env;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use backend_domain::{DbConfig, RuntimeConfig, StorageBackend};

use super::validation::{validate_database_name, validate_storage};

pub const CONFIG_ENV: &str = "ROLLCALL_CONFIG";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub api_token: Option<String>,
    pub storage: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub seed_path: Option<String>,
    pub max_body_bytes: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4180".to_string(),
            api_token: None,
            storage: "clickhouse".to_string(),
            clickhouse_url: "http://127.0.0.1:8123".to_string(),
            clickhouse_database: "rollcall".to_string(),
            clickhouse_user: None,
            clickhouse_password: None,
            seed_path: None,
            max_body_bytes: 4 * 1024 * 1024,
            request_timeout_seconds: 15,
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| "./config.toml".to_string());
        let file_path = Path::new(&path);
        let base_dir = file_path.parent();
        let mut config: AppConfig = if file_path.exists() {
            let content = fs::read_to_string(file_path).await?;
            toml::from_str(&content)?
        } else {
            warn!("{} not found, using defaults", path);
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.resolve_paths(base_dir);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn normalize(&mut self) {
        self.api_token = blank_to_none(self.api_token.take());
        self.clickhouse_user = blank_to_none(self.clickhouse_user.take());
        self.clickhouse_password = blank_to_none(self.clickhouse_password.take());
        self.seed_path = blank_to_none(self.seed_path.take());
        self.storage = self.storage.trim().to_lowercase();
    }

    fn resolve_paths(&mut self, base_dir: Option<&Path>) {
        let Some(base) = base_dir else {
            return;
        };
        if let Some(seed_path) = &self.seed_path {
            self.seed_path = Some(resolve_path(base, seed_path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|err| anyhow!("invalid bind_addr: {}", err))?;
        let storage = validate_storage(&self.storage)?;
        if storage == StorageBackend::Clickhouse {
            validate_database_name(&self.clickhouse_database)?;
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than 0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow!("request_timeout_seconds must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            api_token: self.api_token.clone(),
            max_body_bytes: self.max_body_bytes,
            request_timeout_seconds: self.request_timeout_seconds,
        }
    }

    pub fn to_db_config(&self) -> Result<DbConfig> {
        Ok(DbConfig {
            storage: validate_storage(&self.storage)?,
            clickhouse_url: self.clickhouse_url.clone(),
            clickhouse_database: self.clickhouse_database.clone(),
            clickhouse_user: self.clickhouse_user.clone(),
            clickhouse_password: self.clickhouse_password.clone(),
            seed_path: self.seed_path.clone(),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("ROLLCALL_BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Ok(value) = env::var("ROLLCALL_API_TOKEN") {
            self.api_token = Some(value);
        }
        if let Ok(value) = env::var("ROLLCALL_STORAGE") {
            self.storage = value;
        }
        if let Ok(value) = env::var("ROLLCALL_CLICKHOUSE_URL") {
            self.clickhouse_url = value;
        }
        if let Ok(value) = env::var("ROLLCALL_CLICKHOUSE_DATABASE") {
            self.clickhouse_database = value;
        }
        if let Ok(value) = env::var("ROLLCALL_CLICKHOUSE_USER") {
            self.clickhouse_user = Some(value);
        }
        if let Ok(value) = env::var("ROLLCALL_CLICKHOUSE_PASSWORD") {
            self.clickhouse_password = Some(value);
        }
        if let Ok(value) = env::var("ROLLCALL_SEED_PATH") {
            self.seed_path = Some(value);
        }
        if let Ok(value) = env::var("ROLLCALL_MAX_BODY_BYTES") {
            self.max_body_bytes = value.parse().unwrap_or(self.max_body_bytes);
        }
        if let Ok(value) = env::var("ROLLCALL_REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = value.parse().unwrap_or(self.request_timeout_seconds);
        }
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_path(base: &Path, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        trimmed.to_string()
    } else {
        base.join(path).to_string_lossy().to_string()
    }
}
