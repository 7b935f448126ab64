use std::sync::Arc;

use anyhow::Result;
use clickhouse::Client;
use tracing::info;

use backend_application::{AppState, Metrics};
use backend_domain::{AuditLogRepository, DbConfig, RuntimeConfig, StorageBackend};
use backend_infrastructure::{load_seed, AppConfig, ClickhouseRepo, MemoryRepo};

pub struct AppContext {
    pub state: AppState,
}

impl AppContext {
    pub async fn new() -> Result<Self> {
        let config = AppConfig::load().await?;
        let runtime_config = config.to_runtime_config();
        let db_config = config.to_db_config()?;

        let state = match db_config.storage {
            StorageBackend::Clickhouse => clickhouse_state(runtime_config, &db_config).await?,
            StorageBackend::Memory => memory_state(runtime_config, &db_config).await?,
        };
        Ok(Self { state })
    }
}

async fn clickhouse_state(config: RuntimeConfig, db_config: &DbConfig) -> Result<AppState> {
    let mut clickhouse = Client::default()
        .with_url(&db_config.clickhouse_url)
        .with_database(&db_config.clickhouse_database);
    if let Some(user) = &db_config.clickhouse_user {
        clickhouse = clickhouse.with_user(user);
    }
    if let Some(password) = &db_config.clickhouse_password {
        clickhouse = clickhouse.with_password(password);
    }

    let repo = Arc::new(ClickhouseRepo::new(
        clickhouse,
        db_config.clickhouse_database.clone(),
    ));
    repo.ensure_schema().await?;
    info!(
        "using clickhouse storage at {} ({})",
        db_config.clickhouse_url, db_config.clickhouse_database
    );

    Ok(AppState {
        config,
        audit_repo: repo.clone(),
        calendar_repo: repo.clone(),
        directory_repo: repo,
        metrics: Arc::new(Metrics::default()),
    })
}

async fn memory_state(config: RuntimeConfig, db_config: &DbConfig) -> Result<AppState> {
    let repo = match &db_config.seed_path {
        Some(path) => MemoryRepo::from_seed(load_seed(path).await?),
        None => MemoryRepo::new(),
    };
    let repo = Arc::new(repo);
    info!("using in-memory storage; data is lost on shutdown");

    Ok(AppState {
        config,
        audit_repo: repo.clone(),
        calendar_repo: repo.clone(),
        directory_repo: repo,
        metrics: Arc::new(Metrics::default()),
    })
}
