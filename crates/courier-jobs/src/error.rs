use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Worker error: {0}")]
    WorkerError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// The handler refused the payload; another attempt would be refused too.
    #[error("Job rejected: {0}")]
    Rejected(String),

    #[error("Job timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl JobError {
    /// Whether a failed attempt with this error may be retried.
    ///
    /// Unknown job types, unimplemented ones and rejected payloads fail the
    /// same way on every attempt, so they go straight to the failed set.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            JobError::UnknownJobType(_) | JobError::NotImplemented(_) | JobError::Rejected(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retried() {
        assert!(JobError::WorkerError("timeout".into()).is_retryable());
        assert!(JobError::BackendError("down".into()).is_retryable());
        assert!(!JobError::Rejected("bad phone".into()).is_retryable());
        assert!(!JobError::UnknownJobType("x".into()).is_retryable());
        assert!(!JobError::NotImplemented("x".into()).is_retryable());
    }
}
