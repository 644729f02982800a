//! Handlers attached to the named queues

mod call_analysis;
mod email;
mod notification;
mod tasks;

pub use call_analysis::{CallAnalysisJob, CallAnalysisProcessor};
pub use email::EmailProcessor;
pub use notification::NotificationProcessor;
pub use tasks::{DocumentProcessor, SeoProcessor, TranscriptionProcessor};

use crate::context::AppContext;
use courier_jobs::JobError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Attach every processor to its queue.
pub async fn register_processors(ctx: &AppContext) {
    let queues = &ctx.queues;
    queues
        .call_analysis()
        .process(CallAnalysisProcessor::new(ctx.clone()))
        .await;
    queues.transcription().process(TranscriptionProcessor).await;
    queues
        .notifications()
        .process(NotificationProcessor::new(ctx.notifications.clone()))
        .await;
    queues
        .email()
        .process(EmailProcessor::new(ctx.mailer.clone()))
        .await;
    queues.seo().process(SeoProcessor).await;
    queues.documents().process(DocumentProcessor).await;
}

fn worker_error(e: impl std::fmt::Display) -> JobError {
    JobError::WorkerError(e.to_string())
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, JobError> {
    Ok(serde_json::from_value(payload)?)
}

/// The `type` discriminator of a payload, empty when absent
fn payload_type(payload: &Value) -> &str {
    payload.get("type").and_then(Value::as_str).unwrap_or("")
}
