use crate::backend::JobBackend;
use crate::error::{JobError, Result};
use crate::job::{Backoff, JobContext, JobHandler, JobRecord, Retention};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Static policy of a named queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSpec {
    pub name: String,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retention: Retention,
    pub timeout: Option<Duration>,
}

impl QueueSpec {
    /// A queue that tries every job once and keeps the default retention
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_attempts: 1,
            backoff: Backoff::None,
            retention: Retention::default(),
            timeout: None,
        }
    }

    pub fn attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn retention(mut self, completed: usize, failed: usize) -> Self {
        self.retention = Retention::new(completed, failed);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Point-in-time job counts of one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

/// Lifecycle notifications emitted by a queue
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Completed {
        queue: String,
        job_id: String,
        job_type: String,
        duration: Duration,
    },
    Retrying {
        queue: String,
        job_id: String,
        job_type: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Failed {
        queue: String,
        job_id: String,
        job_type: String,
        attempts: u32,
        error: String,
    },
    Stalled {
        queue: String,
        job_id: String,
        job_type: String,
    },
}

/// A named job queue
///
/// Cloning is cheap; every clone shares the backend, handler and event channel.
#[derive(Clone)]
pub struct JobQueue {
    spec: Arc<QueueSpec>,
    backend: Arc<dyn JobBackend>,
    handler: Arc<RwLock<Option<Arc<dyn JobHandler>>>>,
    events: broadcast::Sender<QueueEvent>,
}

impl JobQueue {
    /// Create a new job queue with a backend
    pub fn new<B: JobBackend + 'static>(spec: QueueSpec, backend: B) -> Self {
        Self::with_backend(spec, Arc::new(backend))
    }

    /// Create a new job queue over an already shared backend
    pub fn with_backend(spec: QueueSpec, backend: Arc<dyn JobBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            spec: Arc::new(spec),
            backend,
            handler: Arc::new(RwLock::new(None)),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &QueueSpec {
        &self.spec
    }

    /// Register the handler invoked for every job on this queue.
    ///
    /// Replaces a previously registered handler.
    pub async fn process<H: JobHandler + 'static>(&self, handler: H) {
        let mut slot = self.handler.write().await;
        if slot.is_some() {
            tracing::warn!(queue = %self.spec.name, "Replacing queue handler");
        }
        *slot = Some(Arc::new(handler));
    }

    /// Enqueue a job with the queue's default options
    pub async fn add<T: Serialize>(&self, job_type: &str, payload: T) -> Result<String> {
        self.add_with(job_type, payload, EnqueueOptions::default())
            .await
    }

    /// Enqueue a job with options
    ///
    /// Every call creates a new job; identical payloads are not deduplicated.
    pub async fn add_with<T: Serialize>(
        &self,
        job_type: &str,
        payload: T,
        opts: EnqueueOptions,
    ) -> Result<String> {
        let payload = serde_json::to_value(payload)?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let run_at = match opts.delay {
            Some(delay) => Some(
                now + chrono::Duration::from_std(delay)
                    .map_err(|e| JobError::ConfigError(e.to_string()))?,
            ),
            None => None,
        };

        let record = JobRecord {
            id: id.clone(),
            queue: self.spec.name.clone(),
            name: job_type.to_string(),
            payload,
            attempts: 0,
            max_attempts: opts.max_attempts.unwrap_or(self.spec.max_attempts).max(1),
            backoff: opts.backoff.unwrap_or(self.spec.backoff),
            timeout_ms: self.spec.timeout.map(|t| t.as_millis() as u64),
            created_at: now,
            processed_at: None,
            finished_at: None,
            run_at,
            last_error: None,
            return_value: None,
        };

        self.backend.push(record).await?;
        tracing::debug!(queue = %self.spec.name, job_id = %id, job_type, "Job enqueued");
        Ok(id)
    }

    /// Process a single ready job, if there is one and a handler is registered.
    ///
    /// Returns `true` when a job was taken off the queue, whatever its outcome.
    pub async fn process_one(&self) -> Result<bool> {
        let Some(handler) = self.handler.read().await.clone() else {
            return Ok(false);
        };
        let Some(job) = self.backend.pop().await? else {
            return Ok(false);
        };

        let ctx = JobContext {
            job_id: job.id.clone(),
            job_type: job.name.clone(),
            queue: job.queue.clone(),
            attempt: job.attempts + 1,
            created_at: job.created_at,
        };

        let started = Instant::now();
        let outcome = match job.timeout() {
            Some(limit) => {
                match tokio::time::timeout(limit, handler.handle(ctx, job.payload.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(JobError::Timeout(limit)),
                }
            }
            None => handler.handle(ctx, job.payload.clone()).await,
        };
        let elapsed = started.elapsed();

        match outcome {
            Ok(value) => self.on_success(job, value, elapsed).await?,
            Err(err) => self.on_failure(job, err).await?,
        }
        Ok(true)
    }

    async fn on_success(
        &self,
        mut job: JobRecord,
        value: serde_json::Value,
        elapsed: Duration,
    ) -> Result<()> {
        job.attempts += 1;
        job.finished_at = Some(Utc::now());
        job.return_value = Some(value);

        let event = QueueEvent::Completed {
            queue: job.queue.clone(),
            job_id: job.id.clone(),
            job_type: job.name.clone(),
            duration: elapsed,
        };
        self.backend
            .complete(job, self.spec.retention.completed)
            .await?;
        self.emit(event);
        Ok(())
    }

    async fn on_failure(&self, mut job: JobRecord, err: JobError) -> Result<()> {
        job.attempts += 1;
        job.last_error = Some(err.to_string());

        if err.is_retryable() && job.attempts < job.max_attempts {
            let delay = job.backoff.delay_for(job.attempts);
            job.run_at = Some(
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
            );
            job.processed_at = None;

            let event = QueueEvent::Retrying {
                queue: job.queue.clone(),
                job_id: job.id.clone(),
                job_type: job.name.clone(),
                attempt: job.attempts,
                delay,
                error: err.to_string(),
            };
            self.backend.retry(job).await?;
            self.emit(event);
        } else {
            job.finished_at = Some(Utc::now());

            let event = QueueEvent::Failed {
                queue: job.queue.clone(),
                job_id: job.id.clone(),
                job_type: job.name.clone(),
                attempts: job.attempts,
                error: err.to_string(),
            };
            self.backend.fail(job, self.spec.retention.failed).await?;
            self.emit(event);
        }
        Ok(())
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Subscribe to completion, retry, failure and stall events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Fetch the five job counters concurrently
    pub async fn counts(&self) -> Result<JobCounts> {
        let (waiting, active, completed, failed, delayed) = tokio::try_join!(
            self.backend.waiting_count(),
            self.backend.active_count(),
            self.backend.completed_count(),
            self.backend.failed_count(),
            self.backend.delayed_count(),
        )?;
        Ok(JobCounts {
            waiting,
            active,
            completed,
            failed,
            delayed,
        })
    }

    pub async fn is_paused(&self) -> Result<bool> {
        self.backend.is_paused().await
    }

    /// Stop handing out jobs. Jobs already running are left to finish.
    pub async fn pause(&self) -> Result<()> {
        self.backend.pause().await
    }

    pub async fn resume(&self) -> Result<()> {
        self.backend.resume().await
    }

    /// Drop all waiting and delayed jobs
    pub async fn empty(&self) -> Result<()> {
        self.backend.empty().await
    }

    pub async fn completed_jobs(&self) -> Result<Vec<JobRecord>> {
        self.backend.completed_jobs().await
    }

    pub async fn failed_jobs(&self) -> Result<Vec<JobRecord>> {
        self.backend.failed_jobs().await
    }

    /// Requeue jobs that have been active for longer than `max_age`.
    ///
    /// Meant for startup, to pick up jobs orphaned by a process that died
    /// mid-job. Returns the number of requeued jobs.
    pub async fn recover_stalled(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age)
                .map_err(|e| JobError::ConfigError(e.to_string()))?;
        let recovered = self.backend.recover_stalled(cutoff).await?;
        for job in &recovered {
            self.emit(QueueEvent::Stalled {
                queue: job.queue.clone(),
                job_id: job.id.clone(),
                job_type: job.name.clone(),
            });
        }
        Ok(recovered.len())
    }

    /// Start a worker loop on the current runtime
    ///
    /// The worker processes one job at a time and sleeps for `poll_interval`
    /// whenever the queue has nothing ready. Dropping the handle stops the
    /// worker after its current job.
    pub fn spawn_worker(&self, poll_interval: Duration) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let queue = self.clone();

        let join = tokio::spawn(async move {
            tracing::debug!(queue = %queue.name(), "Worker started");
            loop {
                // Err once the handle is dropped
                if *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err() {
                    break;
                }

                let idle = match queue.process_one().await {
                    Ok(true) => continue,
                    Ok(false) => poll_interval,
                    Err(e) => {
                        tracing::error!(queue = %queue.name(), error = %e, "Worker error");
                        Duration::from_secs(1)
                    }
                };

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(idle) => {}
                }
            }
            tracing::debug!(queue = %queue.name(), "Worker stopped");
        });

        WorkerHandle { shutdown_tx, join }
    }
}

/// Handle for a running queue worker
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to stop and wait for its current job to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}

/// Per-job overrides of the queue's defaults
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub max_attempts: Option<u32>,
    pub backoff: Option<Backoff>,
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.delay = Some(duration);
        self
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails(Arc<AtomicU32>);

    #[async_trait]
    impl JobHandler for AlwaysFails {
        async fn handle(
            &self,
            _ctx: JobContext,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(JobError::WorkerError("boom".to_string()))
        }
    }

    struct NotBuilt;

    #[async_trait]
    impl JobHandler for NotBuilt {
        async fn handle(
            &self,
            ctx: JobContext,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value> {
            Err(JobError::NotImplemented(ctx.job_type))
        }
    }

    struct Sleeper;

    #[async_trait]
    impl JobHandler for Sleeper {
        async fn handle(
            &self,
            _ctx: JobContext,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(serde_json::Value::Null)
        }
    }

    #[tokio::test]
    async fn jobs_wait_until_a_handler_is_registered() {
        let queue = JobQueue::new(QueueSpec::new("idle"), InMemoryBackend::new());
        queue.add("anything", serde_json::json!({})).await.unwrap();

        assert!(!queue.process_one().await.unwrap());
        assert_eq!(queue.counts().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn failed_attempt_is_scheduled_with_backoff() {
        let spec = QueueSpec::new("backoff")
            .attempts(3)
            .backoff(Backoff::exponential(Duration::from_secs(2)));
        let queue = JobQueue::new(spec, InMemoryBackend::new());
        let calls = Arc::new(AtomicU32::new(0));
        queue.process(AlwaysFails(calls.clone())).await;
        let mut events = queue.subscribe();

        queue.add("flaky", serde_json::json!({"n": 1})).await.unwrap();
        assert!(queue.process_one().await.unwrap());

        // Retry sits in the delayed set until its backoff expires
        assert!(!queue.process_one().await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counts = queue.counts().await.unwrap();
        assert_eq!(counts.delayed, 1);
        assert_eq!(counts.failed, 0);

        match events.recv().await.unwrap() {
            QueueEvent::Retrying { attempt, delay, .. } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn not_implemented_fails_without_retry() {
        let spec = QueueSpec::new("stubs").attempts(5);
        let queue = JobQueue::new(spec, InMemoryBackend::new());
        queue.process(NotBuilt).await;
        let mut events = queue.subscribe();

        queue.add("generate-pdf", serde_json::json!({})).await.unwrap();
        assert!(queue.process_one().await.unwrap());

        let failed = queue.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 1);
        assert_eq!(
            failed[0].last_error.as_deref(),
            Some("Not implemented: generate-pdf")
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            QueueEvent::Failed { attempts: 1, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn handler_exceeding_timeout_counts_as_failure() {
        let spec = QueueSpec::new("slow").timeout(Duration::from_secs(300));
        let queue = JobQueue::new(spec, InMemoryBackend::new());
        queue.process(Sleeper).await;

        queue.add("translate", serde_json::json!({})).await.unwrap();
        assert!(queue.process_one().await.unwrap());

        let failed = queue.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("Job timed out"));
    }

    #[tokio::test]
    async fn paused_queue_keeps_jobs_waiting() {
        let queue = JobQueue::new(QueueSpec::new("paused"), InMemoryBackend::new());
        queue.process(NotBuilt).await;
        queue.add("x", serde_json::json!({})).await.unwrap();

        queue.pause().await.unwrap();
        assert!(queue.is_paused().await.unwrap());
        assert!(!queue.process_one().await.unwrap());

        queue.resume().await.unwrap();
        assert!(queue.process_one().await.unwrap());
    }

    #[tokio::test]
    async fn worker_drains_queue_and_shuts_down() {
        let queue = JobQueue::new(QueueSpec::new("worker"), InMemoryBackend::new());
        let calls = Arc::new(AtomicU32::new(0));
        queue.process(AlwaysFails(calls.clone())).await;
        let mut events = queue.subscribe();

        for _ in 0..3 {
            queue.add("job", serde_json::json!({})).await.unwrap();
        }
        let worker = queue.spawn_worker(Duration::from_millis(10));

        for _ in 0..3 {
            assert!(matches!(
                events.recv().await.unwrap(),
                QueueEvent::Failed { .. }
            ));
        }
        worker.shutdown().await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.counts().await.unwrap().failed, 3);
    }
}
