use super::JobBackend;
use crate::error::{JobError, Result};
use crate::job::JobRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};

impl From<redis::RedisError> for JobError {
    fn from(err: redis::RedisError) -> Self {
        JobError::BackendError(err.to_string())
    }
}

/// Redis-backed job queue
///
/// Pending jobs (waiting and delayed) share one sorted set scored by their
/// run-at time in milliseconds, so "waiting" is simply the range up to now.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    client: Client,
    pending_key: String,
    active_key: String,
    completed_key: String,
    failed_key: String,
    paused_key: String,
    pop_script: Script,
}

impl RedisBackend {
    pub fn new(url: &str, key_prefix: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| JobError::ConfigError(e.to_string()))?;

        // Atomically take the first ready job and park it in the active hash.
        // Nothing is handed out while the paused flag exists.
        let pop_script = Script::new(
            r#"
            if redis.call('EXISTS', KEYS[3]) == 1 then
                return nil
            end
            local jobs = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
            if #jobs > 0 then
                redis.call('ZREM', KEYS[1], jobs[1])
                local job = cjson.decode(jobs[1])
                redis.call('HSET', KEYS[2], job.id, jobs[1])
                return jobs[1]
            else
                return nil
            end
        "#,
        );

        Ok(Self {
            client,
            pending_key: format!("{}:pending", key_prefix),
            active_key: format!("{}:active", key_prefix),
            completed_key: format!("{}:completed", key_prefix),
            failed_key: format!("{}:failed", key_prefix),
            paused_key: format!("{}:paused", key_prefix),
            pop_script,
        })
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn finish(&self, list_key: &str, job: JobRecord, keep: usize) -> Result<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hdel(&self.active_key, &job.id)
            .ignore()
            .lpush(list_key, payload)
            .ignore();
        if keep == 0 {
            pipe.del(list_key).ignore();
        } else {
            pipe.ltrim(list_key, 0, keep as isize - 1).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn list_jobs(&self, list_key: &str) -> Result<Vec<JobRecord>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.lrange(list_key, 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(JobError::from))
            .collect()
    }
}

fn score(job: &JobRecord) -> f64 {
    job.run_at.unwrap_or_else(Utc::now).timestamp_millis() as f64
}

#[async_trait]
impl JobBackend for RedisBackend {
    async fn push(&self, job: JobRecord) -> Result<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;
        conn.zadd::<_, _, _, ()>(&self.pending_key, payload, score(&job))
            .await?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<JobRecord>> {
        let mut conn = self.conn().await?;
        let now = Utc::now();

        let result: Option<String> = self
            .pop_script
            .key(&self.pending_key)
            .key(&self.active_key)
            .key(&self.paused_key)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        let Some(json_str) = result else {
            return Ok(None);
        };

        let mut job: JobRecord = serde_json::from_str(&json_str)?;
        job.processed_at = Some(now);
        conn.hset::<_, _, _, ()>(&self.active_key, &job.id, serde_json::to_string(&job)?)
            .await?;
        Ok(Some(job))
    }

    async fn complete(&self, job: JobRecord, keep: usize) -> Result<()> {
        self.finish(&self.completed_key, job, keep).await
    }

    async fn fail(&self, job: JobRecord, keep: usize) -> Result<()> {
        self.finish(&self.failed_key, job, keep).await
    }

    async fn retry(&self, job: JobRecord) -> Result<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&job)?;
        redis::pipe()
            .atomic()
            .hdel(&self.active_key, &job.id)
            .ignore()
            .zadd(&self.pending_key, payload, score(&job))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn waiting_count(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        let now = Utc::now().timestamp_millis();
        Ok(conn.zcount(&self.pending_key, "-inf", now).await?)
    }

    async fn active_count(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.hlen(&self.active_key).await?)
    }

    async fn completed_count(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(&self.completed_key).await?)
    }

    async fn failed_count(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(&self.failed_key).await?)
    }

    async fn delayed_count(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        let after_now = format!("({}", Utc::now().timestamp_millis());
        Ok(conn.zcount(&self.pending_key, after_now, "+inf").await?)
    }

    async fn is_paused(&self) -> Result<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(&self.paused_key).await?)
    }

    async fn pause(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(&self.paused_key, 1).await?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(&self.paused_key).await?;
        Ok(())
    }

    async fn empty(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(&self.pending_key).await?;
        Ok(())
    }

    async fn completed_jobs(&self) -> Result<Vec<JobRecord>> {
        self.list_jobs(&self.completed_key).await
    }

    async fn failed_jobs(&self) -> Result<Vec<JobRecord>> {
        self.list_jobs(&self.failed_key).await
    }

    async fn recover_stalled(&self, cutoff: DateTime<Utc>) -> Result<Vec<JobRecord>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.hvals(&self.active_key).await?;

        let mut recovered = Vec::new();
        for json in raw {
            let mut job: JobRecord = serde_json::from_str(&json)?;
            if job.processed_at.map_or(false, |at| at >= cutoff) {
                continue;
            }
            job.processed_at = None;
            self.retry(job.clone()).await?;
            recovered.push(job);
        }
        Ok(recovered)
    }
}
