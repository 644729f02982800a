use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// Upper bound for a single retry delay (24 hours).
pub const MAX_BACKOFF_MS: u64 = 86_400_000;

/// Delay policy applied between failed attempts of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// Retry as soon as a worker is free
    #[default]
    None,
    /// Same delay before every retry (milliseconds)
    Fixed { delay: u64 },
    /// Delay doubles after every failed attempt (milliseconds)
    Exponential { delay: u64 },
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay: delay.as_millis() as u64,
        }
    }

    pub fn exponential(delay: Duration) -> Self {
        Self::Exponential {
            delay: delay.as_millis() as u64,
        }
    }

    /// Delay before the next attempt, given how many attempts have failed so far.
    ///
    /// Exponential backoff waits `delay * 2^(attempts_made - 1)`: the base delay
    /// after the first failure, twice that after the second, and so on.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let ms = match *self {
            Backoff::None => 0,
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { delay } => {
                let exponent = attempts_made.saturating_sub(1);
                delay.saturating_mul(2u64.saturating_pow(exponent))
            }
        };
        Duration::from_millis(ms.min(MAX_BACKOFF_MS))
    }
}

/// How many finished jobs a queue keeps around for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub completed: usize,
    pub failed: usize,
}

impl Retention {
    pub fn new(completed: usize, failed: usize) -> Self {
        Self { completed, failed }
    }
}

impl Default for Retention {
    fn default() -> Self {
        Self::new(100, 50)
    }
}

/// A stored unit of deferred work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub return_value: Option<serde_json::Value>,
}

impl JobRecord {
    /// Whether the job may be picked up at `now`
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.run_at.map_or(true, |run_at| run_at <= now)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Context passed to job execution
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub job_type: String,
    pub queue: String,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}

/// A type-erased job handler
///
/// A queue has exactly one handler; it sees every job type enqueued on that
/// queue and dispatches on `ctx.job_type` or on the payload itself.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, ctx: JobContext, payload: serde_json::Value)
        -> Result<serde_json::Value>;
}

/// A handler with a typed payload and result
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// The data required by the job
    type Data: DeserializeOwned + Send + Debug;

    /// The value recorded on the job when it completes
    type Output: Serialize + Send;

    /// Execute the job
    async fn execute(&self, ctx: JobContext, data: Self::Data) -> Result<Self::Output>;
}

#[async_trait]
impl<P: Processor> JobHandler for P {
    async fn handle(
        &self,
        ctx: JobContext,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let data: P::Data = serde_json::from_value(payload)?;
        let output = self.execute(ctx, data).await?;
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_backoff_retries_immediately() {
        assert_eq!(Backoff::None.delay_for(1), Duration::ZERO);
        assert_eq!(Backoff::None.delay_for(4), Duration::ZERO);
    }

    #[test]
    fn exponential_starts_at_base_delay() {
        let backoff = Backoff::exponential(Duration::from_secs(2));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_serializes_like_queue_options() {
        let json = serde_json::to_value(Backoff::exponential(Duration::from_millis(2000))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "exponential", "delay": 2000}));

        let none = serde_json::to_value(Backoff::None).unwrap();
        assert_eq!(none, serde_json::json!({"type": "none"}));
    }

    proptest! {
        #[test]
        fn prop_fixed_backoff_is_constant(delay in 0u64..100_000, attempt in 1u32..50) {
            let backoff = Backoff::Fixed { delay };
            prop_assert_eq!(backoff.delay_for(attempt), Duration::from_millis(delay));
        }

        #[test]
        fn prop_exponential_doubles_until_capped(delay in 1u64..10_000, attempt in 2u32..20) {
            let backoff = Backoff::Exponential { delay };
            let current = backoff.delay_for(attempt);
            let previous = backoff.delay_for(attempt - 1);

            if current < Duration::from_millis(MAX_BACKOFF_MS) {
                prop_assert_eq!(current, previous * 2);
            } else {
                prop_assert!(current >= previous);
            }
        }

        #[test]
        fn prop_backoff_never_exceeds_cap(delay in 0u64..u64::MAX, attempt in 0u32..200) {
            let backoff = Backoff::Exponential { delay };
            prop_assert!(backoff.delay_for(attempt) <= Duration::from_millis(MAX_BACKOFF_MS));
        }
    }
}
