use super::JobBackend;
use crate::error::{JobError, Result};
use crate::job::JobRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<JobRecord>,
    active: HashMap<String, JobRecord>,
    // Most recent first
    completed: VecDeque<JobRecord>,
    failed: VecDeque<JobRecord>,
    paused: bool,
}

/// In-memory job backend (not persistent, for testing/dev)
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| JobError::BackendError("Lock poisoned".to_string()))
    }
}

fn retain_front(list: &mut VecDeque<JobRecord>, job: JobRecord, keep: usize) {
    list.push_front(job);
    list.truncate(keep);
}

#[async_trait]
impl JobBackend for InMemoryBackend {
    async fn push(&self, job: JobRecord) -> Result<()> {
        self.lock()?.pending.push_back(job);
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobRecord>> {
        let mut state = self.lock()?;
        if state.paused {
            return Ok(None);
        }

        // FIFO among ready jobs; delayed jobs further ahead are skipped
        let now = Utc::now();
        let Some(idx) = state.pending.iter().position(|job| job.is_ready(now)) else {
            return Ok(None);
        };

        let Some(mut job) = state.pending.remove(idx) else {
            return Ok(None);
        };
        job.processed_at = Some(now);
        state.active.insert(job.id.clone(), job.clone());
        Ok(Some(job))
    }

    async fn complete(&self, job: JobRecord, keep: usize) -> Result<()> {
        let mut state = self.lock()?;
        state.active.remove(&job.id);
        retain_front(&mut state.completed, job, keep);
        Ok(())
    }

    async fn fail(&self, job: JobRecord, keep: usize) -> Result<()> {
        let mut state = self.lock()?;
        state.active.remove(&job.id);
        retain_front(&mut state.failed, job, keep);
        Ok(())
    }

    async fn retry(&self, job: JobRecord) -> Result<()> {
        let mut state = self.lock()?;
        state.active.remove(&job.id);
        state.pending.push_back(job);
        Ok(())
    }

    async fn waiting_count(&self) -> Result<u64> {
        let now = Utc::now();
        let state = self.lock()?;
        Ok(state.pending.iter().filter(|job| job.is_ready(now)).count() as u64)
    }

    async fn active_count(&self) -> Result<u64> {
        Ok(self.lock()?.active.len() as u64)
    }

    async fn completed_count(&self) -> Result<u64> {
        Ok(self.lock()?.completed.len() as u64)
    }

    async fn failed_count(&self) -> Result<u64> {
        Ok(self.lock()?.failed.len() as u64)
    }

    async fn delayed_count(&self) -> Result<u64> {
        let now = Utc::now();
        let state = self.lock()?;
        Ok(state.pending.iter().filter(|job| !job.is_ready(now)).count() as u64)
    }

    async fn is_paused(&self) -> Result<bool> {
        Ok(self.lock()?.paused)
    }

    async fn pause(&self) -> Result<()> {
        self.lock()?.paused = true;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.lock()?.paused = false;
        Ok(())
    }

    async fn empty(&self) -> Result<()> {
        self.lock()?.pending.clear();
        Ok(())
    }

    async fn completed_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self.lock()?.completed.iter().cloned().collect())
    }

    async fn failed_jobs(&self) -> Result<Vec<JobRecord>> {
        Ok(self.lock()?.failed.iter().cloned().collect())
    }

    async fn recover_stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        let mut state = self.lock()?;
        let stalled_ids: Vec<String> = state
            .active
            .values()
            .filter(|job| job.processed_at.map_or(true, |at| at < cutoff))
            .map(|job| job.id.clone())
            .collect();

        let mut recovered = Vec::with_capacity(stalled_ids.len());
        for id in stalled_ids {
            if let Some(mut job) = state.active.remove(&id) {
                job.processed_at = None;
                state.pending.push_back(job.clone());
                recovered.push(job);
            }
        }
        Ok(recovered)
    }
}
