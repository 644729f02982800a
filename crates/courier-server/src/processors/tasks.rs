//! Queues whose work is not built yet.
//!
//! Known task types fail with `NotImplemented` instead of reporting success,
//! so "did nothing" stays visible in the failed-job list. Both errors are
//! permanent and skip retries.

use super::payload_type;
use async_trait::async_trait;
use courier_jobs::{JobContext, JobError, JobHandler, Result};
use serde_json::Value;

const SEO_TASKS: [&str; 3] = ["analyze-post", "generate-sitemap", "check-backlinks"];
const DOCUMENT_TASKS: [&str; 3] = ["generate-pdf", "extract-text", "translate"];

fn dispatch(queue: &str, known: &[&str], kind: &str) -> Result<Value> {
    if known.contains(&kind) {
        Err(JobError::NotImplemented(format!("{} task '{}'", queue, kind)))
    } else {
        Err(JobError::UnknownJobType(format!("{} task '{}'", queue, kind)))
    }
}

pub struct SeoProcessor;

#[async_trait]
impl JobHandler for SeoProcessor {
    async fn handle(&self, _ctx: JobContext, payload: Value) -> Result<Value> {
        dispatch("seo", &SEO_TASKS, payload_type(&payload))
    }
}

pub struct DocumentProcessor;

#[async_trait]
impl JobHandler for DocumentProcessor {
    async fn handle(&self, ctx: JobContext, payload: Value) -> Result<Value> {
        let document_id = payload.get("documentId").and_then(Value::as_str);
        tracing::debug!(job_id = %ctx.job_id, ?document_id, "Processing document job");
        dispatch("document", &DOCUMENT_TASKS, payload_type(&payload))
    }
}

/// Recording transcription has no provider yet.
pub struct TranscriptionProcessor;

#[async_trait]
impl JobHandler for TranscriptionProcessor {
    async fn handle(&self, ctx: JobContext, _payload: Value) -> Result<Value> {
        match ctx.job_type.as_str() {
            "transcribe-recording" => Err(JobError::NotImplemented(
                "recording transcription".to_string(),
            )),
            other => Err(JobError::UnknownJobType(format!(
                "transcription job '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn ctx(job_type: &str) -> JobContext {
        JobContext {
            job_id: "job-1".into(),
            job_type: job_type.into(),
            queue: "test".into(),
            attempt: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn known_seo_tasks_are_not_implemented() {
        for task in SEO_TASKS {
            let err = SeoProcessor
                .handle(ctx("seo"), json!({"type": task, "data": {}}))
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::NotImplemented(_)), "{}", task);
            assert!(!err.is_retryable());
        }
    }

    #[tokio::test]
    async fn unknown_or_missing_types_are_rejected() {
        let err = SeoProcessor
            .handle(ctx("seo"), json!({"type": "rank-tracking"}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownJobType(_)));

        let err = DocumentProcessor
            .handle(ctx("doc"), json!({"documentId": "d-1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownJobType(_)));
    }

    #[tokio::test]
    async fn document_tasks_are_not_implemented() {
        for task in DOCUMENT_TASKS {
            let err = DocumentProcessor
                .handle(ctx("doc"), json!({"type": task, "documentId": "d-1"}))
                .await
                .unwrap_err();
            assert!(matches!(err, JobError::NotImplemented(_)));
        }
    }

    #[tokio::test]
    async fn transcription_reports_missing_provider() {
        let err = TranscriptionProcessor
            .handle(ctx("transcribe-recording"), json!({"callId": "c"}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::NotImplemented(_)));

        let err = TranscriptionProcessor
            .handle(ctx("summarize"), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::UnknownJobType(_)));
    }
}
