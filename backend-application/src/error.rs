use thiserror::Error;

/// `Internal` keeps the whole cause chain for logging; its `Display` shows
/// only the outermost context, which is what callers get to see.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}
