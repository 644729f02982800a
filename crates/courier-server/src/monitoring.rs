//! Queue event logging and point-in-time health snapshots

use crate::queues::{QueueName, Queues};
use courier_jobs::{JobCounts, JobQueue, QueueEvent, Result};
use futures_util::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// A queue with this many running jobs is reported as not ready.
pub const MAX_ACTIVE_JOBS: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueHealth {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: bool,
    pub is_ready: bool,
}

impl QueueHealth {
    pub fn new(counts: JobCounts, paused: bool) -> Self {
        Self {
            waiting: counts.waiting,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
            delayed: counts.delayed,
            paused,
            is_ready: !paused && counts.active < MAX_ACTIVE_JOBS,
        }
    }

    /// Read the counters and pause flag of one queue concurrently
    pub async fn read(queue: &JobQueue) -> Result<Self> {
        let (counts, paused) = tokio::try_join!(queue.counts(), queue.is_paused())?;
        Ok(Self::new(counts, paused))
    }
}

/// Health of every queue keyed by queue name. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthSnapshot(BTreeMap<String, QueueHealth>);

impl HealthSnapshot {
    pub fn get(&self, queue: QueueName) -> Option<&QueueHealth> {
        self.0.get(queue.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueueHealth)> {
        self.0.iter().map(|(name, health)| (name.as_str(), health))
    }

    pub fn all_ready(&self) -> bool {
        self.0.values().all(|h| h.is_ready)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Polls queue state and, when built by [`setup_queue_monitoring`], logs queue events.
pub struct QueueMonitor {
    queues: Queues,
    listeners: Vec<JoinHandle<()>>,
    tally: Arc<EventTally>,
}

/// Events logged by a monitor since it was set up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObservedEvents {
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub stalled: u64,
}

#[derive(Debug, Default)]
struct EventTally {
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    stalled: AtomicU64,
}

impl EventTally {
    fn record(&self, event: &QueueEvent) {
        let counter = match event {
            QueueEvent::Completed { .. } => &self.completed,
            QueueEvent::Retrying { .. } => &self.retried,
            QueueEvent::Failed { .. } => &self.failed,
            QueueEvent::Stalled { .. } => &self.stalled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(&self) -> ObservedEvents {
        ObservedEvents {
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
        }
    }
}

impl QueueMonitor {
    /// A monitor that only takes snapshots
    pub fn new(queues: Queues) -> Self {
        Self {
            queues,
            listeners: Vec::new(),
            tally: Arc::default(),
        }
    }

    /// Read all six queues concurrently
    pub async fn snapshot(&self) -> Result<HealthSnapshot> {
        let reads = self.queues.iter().map(|(name, queue)| async move {
            QueueHealth::read(queue)
                .await
                .map(|health| (name.as_str().to_string(), health))
        });
        let entries = try_join_all(reads).await?;
        Ok(HealthSnapshot(entries.into_iter().collect()))
    }

    /// Always zero for a monitor built with [`QueueMonitor::new`]
    pub fn observed(&self) -> ObservedEvents {
        self.tally.read()
    }
}

impl Drop for QueueMonitor {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

/// Log completion, retry, failure and stall events of every queue.
///
/// Returns the monitor used for health snapshots; dropping it stops the logging.
/// Events emitted before this call are not seen, so set it up before
/// recovering stalled jobs or starting workers.
pub fn setup_queue_monitoring(queues: &Queues) -> QueueMonitor {
    let tally = Arc::new(EventTally::default());
    let listeners = queues
        .iter()
        .map(|(name, queue)| {
            let mut events = queue.subscribe();
            let tally = tally.clone();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            tally.record(&event);
                            log_event(&event);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(queue = %name, skipped, "Queue event log lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        })
        .collect();

    QueueMonitor {
        queues: queues.clone(),
        listeners,
        tally,
    }
}

fn log_event(event: &QueueEvent) {
    match event {
        QueueEvent::Completed {
            queue,
            job_id,
            job_type,
            duration,
        } => tracing::info!(
            %queue,
            %job_id,
            %job_type,
            duration_ms = duration.as_millis() as u64,
            "queue-job-completed"
        ),
        QueueEvent::Retrying {
            queue,
            job_id,
            job_type,
            attempt,
            delay,
            error,
        } => tracing::warn!(
            %queue,
            %job_id,
            %job_type,
            attempt,
            delay_ms = delay.as_millis() as u64,
            %error,
            "Job {} in queue {} will be retried",
            job_id,
            queue
        ),
        QueueEvent::Failed {
            queue,
            job_id,
            job_type,
            attempts,
            error,
        } => tracing::error!(
            %queue,
            %job_id,
            %job_type,
            attempts,
            %error,
            "Job {} in queue {} failed",
            job_id,
            queue
        ),
        QueueEvent::Stalled {
            queue,
            job_id,
            job_type,
        } => tracing::warn!(
            %queue,
            %job_id,
            %job_type,
            "Job {} in queue {} stalled",
            job_id,
            queue
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_unpaused_and_below_threshold() {
        let idle = QueueHealth::new(JobCounts::default(), false);
        assert!(idle.is_ready);

        let paused = QueueHealth::new(JobCounts::default(), true);
        assert!(!paused.is_ready);

        let busy = QueueHealth::new(
            JobCounts {
                active: MAX_ACTIVE_JOBS,
                ..Default::default()
            },
            false,
        );
        assert!(!busy.is_ready);

        let almost = QueueHealth::new(
            JobCounts {
                active: MAX_ACTIVE_JOBS - 1,
                ..Default::default()
            },
            false,
        );
        assert!(almost.is_ready);
    }

    #[test]
    fn health_serializes_camel_case() {
        let value = serde_json::to_value(QueueHealth::new(JobCounts::default(), false)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "waiting": 0, "active": 0, "completed": 0, "failed": 0,
                "delayed": 0, "paused": false, "isReady": true
            })
        );
    }
}
