//! Named background job queues
//!
//! Each queue has one handler, a retry policy (attempts plus backoff), a
//! bounded history of finished jobs and a pluggable storage backend. Jobs are
//! delivered at least once: a handler error schedules another attempt until
//! the queue's attempt budget is spent, after which the job is kept in the
//! failed set for inspection.

pub mod backend;
pub mod error;
pub mod job;
pub mod queue;

pub use backend::memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use backend::redis::RedisBackend;
pub use backend::{BackendConfig, JobBackend};
pub use error::{JobError, Result};
pub use job::{Backoff, JobContext, JobHandler, JobRecord, Processor, Retention};
pub use queue::{EnqueueOptions, JobCounts, JobQueue, QueueEvent, QueueSpec, WorkerHandle};
