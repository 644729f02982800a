//! The six named queues and their retry policies

use courier_jobs::{BackendConfig, Backoff, InMemoryBackend, JobQueue, QueueSpec, Result};
use futures_util::future::try_join_all;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    CallAnalysis,
    Transcription,
    Notifications,
    Email,
    SeoTasks,
    DocumentProcessing,
}

impl QueueName {
    pub const ALL: [QueueName; 6] = [
        QueueName::CallAnalysis,
        QueueName::Transcription,
        QueueName::Notifications,
        QueueName::Email,
        QueueName::SeoTasks,
        QueueName::DocumentProcessing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::CallAnalysis => "call-analysis",
            QueueName::Transcription => "transcription",
            QueueName::Notifications => "notifications",
            QueueName::Email => "email",
            QueueName::SeoTasks => "seo-tasks",
            QueueName::DocumentProcessing => "document-processing",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.as_str() == name)
    }

    /// Attempts, backoff, retention and timeout of this queue
    pub fn spec(&self) -> QueueSpec {
        let spec = QueueSpec::new(self.as_str());
        match self {
            QueueName::CallAnalysis => spec
                .attempts(3)
                .backoff(Backoff::exponential(Duration::from_secs(2)))
                .retention(100, 50),
            QueueName::Transcription => spec
                .attempts(3)
                .backoff(Backoff::exponential(Duration::from_secs(3)))
                .retention(50, 25),
            QueueName::Notifications => spec
                .attempts(5)
                .backoff(Backoff::exponential(Duration::from_secs(1)))
                .retention(200, 100),
            QueueName::Email => spec
                .attempts(3)
                .backoff(Backoff::exponential(Duration::from_secs(5)))
                .retention(100, 50),
            QueueName::SeoTasks => spec.attempts(2).retention(50, 25),
            QueueName::DocumentProcessing => spec
                .attempts(3)
                .retention(50, 25)
                .timeout(Duration::from_secs(5 * 60)),
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All named queues, built over one backend selection
#[derive(Clone)]
pub struct Queues {
    call_analysis: JobQueue,
    transcription: JobQueue,
    notifications: JobQueue,
    email: JobQueue,
    seo: JobQueue,
    documents: JobQueue,
}

impl Queues {
    fn build<F>(mut make: F) -> Result<Self>
    where
        F: FnMut(QueueName) -> Result<JobQueue>,
    {
        Ok(Self {
            call_analysis: make(QueueName::CallAnalysis)?,
            transcription: make(QueueName::Transcription)?,
            notifications: make(QueueName::Notifications)?,
            email: make(QueueName::Email)?,
            seo: make(QueueName::SeoTasks)?,
            documents: make(QueueName::DocumentProcessing)?,
        })
    }

    pub fn open(backend: &BackendConfig) -> Result<Self> {
        Self::build(|name| {
            let store = backend.open(name.as_str())?;
            Ok(JobQueue::with_backend(name.spec(), store))
        })
    }

    /// Process-local queues, mostly for tests and single-process development
    pub fn in_memory() -> Self {
        Self {
            call_analysis: Self::memory_queue(QueueName::CallAnalysis),
            transcription: Self::memory_queue(QueueName::Transcription),
            notifications: Self::memory_queue(QueueName::Notifications),
            email: Self::memory_queue(QueueName::Email),
            seo: Self::memory_queue(QueueName::SeoTasks),
            documents: Self::memory_queue(QueueName::DocumentProcessing),
        }
    }

    fn memory_queue(name: QueueName) -> JobQueue {
        JobQueue::new(name.spec(), InMemoryBackend::new())
    }

    pub fn get(&self, name: QueueName) -> &JobQueue {
        match name {
            QueueName::CallAnalysis => &self.call_analysis,
            QueueName::Transcription => &self.transcription,
            QueueName::Notifications => &self.notifications,
            QueueName::Email => &self.email,
            QueueName::SeoTasks => &self.seo,
            QueueName::DocumentProcessing => &self.documents,
        }
    }

    pub fn call_analysis(&self) -> &JobQueue {
        self.get(QueueName::CallAnalysis)
    }

    pub fn transcription(&self) -> &JobQueue {
        self.get(QueueName::Transcription)
    }

    pub fn notifications(&self) -> &JobQueue {
        self.get(QueueName::Notifications)
    }

    pub fn email(&self) -> &JobQueue {
        self.get(QueueName::Email)
    }

    pub fn seo(&self) -> &JobQueue {
        self.get(QueueName::SeoTasks)
    }

    pub fn documents(&self) -> &JobQueue {
        self.get(QueueName::DocumentProcessing)
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueueName, &JobQueue)> + '_ {
        QueueName::ALL.into_iter().map(move |name| (name, self.get(name)))
    }

    pub async fn pause_all(&self) -> Result<()> {
        try_join_all(self.iter().map(|(_, q)| q.pause())).await?;
        tracing::info!("All queues paused");
        Ok(())
    }

    pub async fn resume_all(&self) -> Result<()> {
        try_join_all(self.iter().map(|(_, q)| q.resume())).await?;
        tracing::info!("All queues resumed");
        Ok(())
    }

    /// Drop waiting and delayed jobs on every queue
    pub async fn clear_all(&self) -> Result<()> {
        try_join_all(self.iter().map(|(_, q)| q.empty())).await?;
        tracing::info!("All queues cleared");
        Ok(())
    }

    /// Requeue jobs left active by a previous process. Returns the total requeued.
    pub async fn recover_stalled(&self, max_age: Duration) -> Result<usize> {
        let counts =
            try_join_all(self.iter().map(|(_, q)| q.recover_stalled(max_age))).await?;
        Ok(counts.into_iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_round_trip() {
        for name in QueueName::ALL {
            assert_eq!(QueueName::parse(name.as_str()), Some(name));
        }
        assert_eq!(QueueName::parse("nope"), None);
    }

    #[test]
    fn policies() {
        let calls = QueueName::CallAnalysis.spec();
        assert_eq!(calls.max_attempts, 3);
        assert_eq!(calls.backoff, Backoff::exponential(Duration::from_secs(2)));
        assert_eq!(
            (calls.retention.completed, calls.retention.failed),
            (100, 50)
        );

        let notifications = QueueName::Notifications.spec();
        assert_eq!(notifications.max_attempts, 5);
        assert_eq!(
            (notifications.retention.completed, notifications.retention.failed),
            (200, 100)
        );

        let seo = QueueName::SeoTasks.spec();
        assert_eq!(seo.max_attempts, 2);
        assert_eq!(seo.backoff, Backoff::None);
        assert!(seo.timeout.is_none());

        let docs = QueueName::DocumentProcessing.spec();
        assert_eq!(docs.timeout, Some(Duration::from_secs(300)));
        assert_eq!(docs.backoff, Backoff::None);
    }

    #[tokio::test]
    async fn pause_resume_and_clear_apply_to_every_queue() {
        let queues = Queues::in_memory();
        for (_, queue) in queues.iter() {
            queue.add("noop", json!({})).await.unwrap();
        }

        queues.pause_all().await.unwrap();
        for (_, queue) in queues.iter() {
            assert!(queue.is_paused().await.unwrap());
        }

        queues.resume_all().await.unwrap();
        queues.clear_all().await.unwrap();
        for (name, queue) in queues.iter() {
            assert!(!queue.is_paused().await.unwrap(), "{} still paused", name);
            assert_eq!(queue.counts().await.unwrap().waiting, 0);
        }
    }

    #[tokio::test]
    async fn open_with_memory_backend_isolates_queues() {
        let queues = Queues::open(&BackendConfig::InMemory).unwrap();
        queues.email().add("send", json!({})).await.unwrap();
        assert_eq!(queues.email().counts().await.unwrap().waiting, 1);
        assert_eq!(queues.seo().counts().await.unwrap().waiting, 0);
        assert_eq!(queues.iter().count(), 6);
    }
}
