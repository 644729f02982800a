use async_trait::async_trait;
use courier_jobs::{
    BackendConfig, Backoff, InMemoryBackend, JobBackend, JobContext, JobError, JobQueue,
    Processor, QueueEvent, QueueSpec, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmailJobData {
    to: String,
    subject: String,
}

#[derive(Clone, Default)]
struct EmailProcessor {
    processed: Arc<Mutex<Vec<EmailJobData>>>,
}

#[async_trait]
impl Processor for EmailProcessor {
    type Data = EmailJobData;
    type Output = serde_json::Value;

    async fn execute(&self, _ctx: JobContext, data: Self::Data) -> Result<Self::Output> {
        self.processed.lock().unwrap().push(data);
        Ok(serde_json::json!({ "success": true }))
    }
}

#[derive(Clone, Default)]
struct FailingProcessor {
    attempts: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl Processor for FailingProcessor {
    type Data = ();
    type Output = ();

    async fn execute(&self, ctx: JobContext, _data: Self::Data) -> Result<()> {
        self.attempts.lock().unwrap().push(ctx.attempt);
        Err(JobError::WorkerError("Always fails".to_string()))
    }
}

#[tokio::test]
async fn test_job_round_trip_in_memory() {
    let queue = JobQueue::new(QueueSpec::new("email"), InMemoryBackend::new());
    let processor = EmailProcessor::default();
    queue.process(processor.clone()).await;

    let job_id = queue
        .add(
            "send-email",
            EmailJobData {
                to: "client@example.com".to_string(),
                subject: "Welcome".to_string(),
            },
        )
        .await
        .expect("Enqueue failed");
    assert!(!job_id.is_empty());

    assert!(queue.process_one().await.expect("Process failed"));

    let handled = processor.processed.lock().unwrap().clone();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].to, "client@example.com");

    let counts = queue.counts().await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.waiting, 0);
    assert_eq!(counts.active, 0);
}

#[tokio::test]
async fn test_three_attempts_then_failed() {
    let spec = QueueSpec::new("call-analysis").attempts(3);
    let queue = JobQueue::new(spec, InMemoryBackend::new());
    let processor = FailingProcessor::default();
    queue.process(processor.clone()).await;

    queue.add("analyze-call", ()).await.unwrap();
    while queue.process_one().await.unwrap() {}

    assert_eq!(*processor.attempts.lock().unwrap(), vec![1, 2, 3]);

    let failed = queue.failed_jobs().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].queue, "call-analysis");
    assert_eq!(failed[0].last_error.as_deref(), Some("Worker error: Always fails"));
    assert!(failed[0].finished_at.is_some());
}

#[tokio::test]
async fn test_retry_waits_for_backoff() {
    let spec = QueueSpec::new("notifications")
        .attempts(5)
        .backoff(Backoff::exponential(Duration::from_millis(20)));
    let queue = JobQueue::new(spec, InMemoryBackend::new());
    let processor = FailingProcessor::default();
    queue.process(processor.clone()).await;

    queue.add("urgent-notification", ()).await.unwrap();
    assert!(queue.process_one().await.unwrap());

    // Second attempt is not ready yet
    assert!(!queue.process_one().await.unwrap());
    assert_eq!(queue.counts().await.unwrap().delayed, 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(queue.process_one().await.unwrap());
    assert_eq!(*processor.attempts.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_empty_drops_pending_jobs() {
    let queue = JobQueue::new(QueueSpec::new("seo-tasks"), InMemoryBackend::new());
    for _ in 0..4 {
        queue.add("generate-sitemap", ()).await.unwrap();
    }
    assert_eq!(queue.counts().await.unwrap().waiting, 4);

    queue.empty().await.unwrap();
    assert_eq!(queue.counts().await.unwrap().waiting, 0);
}

#[tokio::test]
async fn test_backend_config_opens_isolated_memory_queues() {
    let config = BackendConfig::InMemory;
    let first = JobQueue::with_backend(QueueSpec::new("a"), config.open("a").unwrap());
    let second = JobQueue::with_backend(QueueSpec::new("b"), config.open("b").unwrap());

    first.add("x", ()).await.unwrap();

    assert_eq!(first.counts().await.unwrap().waiting, 1);
    assert_eq!(second.counts().await.unwrap().waiting, 0);
}

#[derive(Clone, Default)]
struct SlowProcessor {
    finished: Arc<Mutex<u32>>,
}

#[async_trait]
impl Processor for SlowProcessor {
    type Data = ();
    type Output = ();

    async fn execute(&self, _ctx: JobContext, _data: Self::Data) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        *self.finished.lock().unwrap() += 1;
        Ok(())
    }
}

#[tokio::test]
async fn test_recover_stalled_emits_event_per_job() {
    let backend = InMemoryBackend::new();
    let queue = JobQueue::new(QueueSpec::new("transcription"), backend.clone());
    let job_id = queue.add("transcribe-recording", ()).await.unwrap();

    // Left active by a worker that went away
    backend.pop().await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut events = queue.subscribe();
    assert_eq!(queue.recover_stalled(Duration::ZERO).await.unwrap(), 1);

    match events.try_recv().unwrap() {
        QueueEvent::Stalled {
            queue: name,
            job_id: stalled,
            job_type,
        } => {
            assert_eq!(name, "transcription");
            assert_eq!(stalled, job_id);
            assert_eq!(job_type, "transcribe-recording");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(queue.counts().await.unwrap().waiting, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_worker_handle_stops_after_current_job() {
    let queue = JobQueue::new(QueueSpec::new("document-processing"), InMemoryBackend::new());
    let processor = SlowProcessor::default();
    queue.process(processor.clone()).await;
    for _ in 0..5 {
        queue.add("generate-pdf", ()).await.unwrap();
    }

    let handle = queue.spawn_worker(Duration::from_millis(10));
    // First job is now mid-flight
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(handle);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*processor.finished.lock().unwrap(), 1);
    assert_eq!(queue.counts().await.unwrap().waiting, 4);
}
