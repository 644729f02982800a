use crate::error::Result;
use crate::job::JobRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

/// Backend storage for a single named queue
///
/// A job lives in exactly one of the backend's sets at a time: pending
/// (waiting or delayed, depending on `run_at`), active, completed or failed.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Push a new job (or a job scheduled for a later attempt) to the queue
    async fn push(&self, job: JobRecord) -> Result<()>;

    /// Pop the oldest job whose `run_at` has passed and mark it active.
    /// Should return None if the queue is paused or no job is ready.
    async fn pop(&self) -> Result<Option<JobRecord>>;

    /// Move an active job to the completed set, keeping at most `keep` entries
    async fn complete(&self, job: JobRecord, keep: usize) -> Result<()>;

    /// Move an active job to the failed set, keeping at most `keep` entries
    async fn fail(&self, job: JobRecord, keep: usize) -> Result<()>;

    /// Move an active job back to pending for another attempt
    async fn retry(&self, job: JobRecord) -> Result<()>;

    async fn waiting_count(&self) -> Result<u64>;

    async fn active_count(&self) -> Result<u64>;

    async fn completed_count(&self) -> Result<u64>;

    async fn failed_count(&self) -> Result<u64>;

    async fn delayed_count(&self) -> Result<u64>;

    async fn is_paused(&self) -> Result<bool>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Drop every waiting and delayed job. Active and finished jobs are kept.
    async fn empty(&self) -> Result<()>;

    /// Retained completed jobs, most recent first
    async fn completed_jobs(&self) -> Result<Vec<JobRecord>>;

    /// Retained failed jobs, most recent first
    async fn failed_jobs(&self) -> Result<Vec<JobRecord>>;

    /// Return active jobs that started before `cutoff` to the pending set
    async fn recover_stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobRecord>>;
}

/// Which store backs the named queues.
///
/// Selection is always explicit; nothing falls back to memory on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// Process-local storage, lost on restart and not shared between processes
    #[default]
    InMemory,
    /// Redis storage (requires the `redis` feature)
    Redis { url: String, prefix: String },
}

impl BackendConfig {
    pub fn redis(url: impl Into<String>) -> Self {
        Self::Redis {
            url: url.into(),
            prefix: "courier".to_string(),
        }
    }

    /// Build the backend for the queue called `queue`
    pub fn open(&self, queue: &str) -> Result<Arc<dyn JobBackend>> {
        match self {
            BackendConfig::InMemory => Ok(Arc::new(memory::InMemoryBackend::new())),
            #[cfg(feature = "redis")]
            BackendConfig::Redis { url, prefix } => Ok(Arc::new(redis::RedisBackend::new(
                url,
                &format!("{}:{}", prefix, queue),
            )?)),
            #[cfg(not(feature = "redis"))]
            BackendConfig::Redis { .. } => Err(crate::error::JobError::ConfigError(format!(
                "queue '{}' needs the redis backend, but this build lacks the `redis` feature",
                queue
            ))),
        }
    }
}
