use std::sync::Arc;

use backend_domain::RuntimeConfig;
use backend_infrastructure::MemoryRepo;

use crate::{AppState, Metrics};

pub fn memory_state(repo: Arc<MemoryRepo>) -> AppState {
    AppState {
        config: RuntimeConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            api_token: None,
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 5,
        },
        audit_repo: repo.clone(),
        calendar_repo: repo.clone(),
        directory_repo: repo,
        metrics: Arc::new(Metrics::default()),
    }
}
