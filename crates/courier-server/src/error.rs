use crate::config::ConfigError;
use courier_jobs::JobError;
use courier_notify::NotifyError;
use thiserror::Error;

/// Error type for the application layer
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] JobError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
