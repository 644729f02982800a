use super::worker_error;
use crate::analysis::{AnalysisRecord, CallAnalysis, Sentiment};
use crate::context::AppContext;
use async_trait::async_trait;
use chrono::Utc;
use courier_jobs::{JobContext, Processor, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

/// Payload of an `analyze-call` job.
///
/// Fields are optional because webhook payloads are not validated on intake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnalysisJob {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

pub struct CallAnalysisProcessor {
    ctx: AppContext,
}

impl CallAnalysisProcessor {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Processor for CallAnalysisProcessor {
    type Data = CallAnalysisJob;
    type Output = CallAnalysis;

    async fn execute(&self, ctx: JobContext, data: CallAnalysisJob) -> Result<CallAnalysis> {
        let started = Instant::now();
        let call_id = data
            .call_id
            .ok_or_else(|| worker_error("analyze-call job has no callId"))?;

        let analysis = self
            .ctx
            .analyzer
            .analyze(data.transcript.as_deref(), &data.metadata)
            .await
            .map_err(|e| {
                tracing::error!(%call_id, error = %e, "Call analysis failed");
                worker_error(e)
            })?;

        self.ctx
            .analyses
            .save(AnalysisRecord {
                call_id: call_id.clone(),
                analysis: analysis.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                created_at: Utc::now(),
            })
            .await
            .map_err(worker_error)?;

        tracing::info!(
            job_id = %ctx.job_id,
            %call_id,
            duration_ms = started.elapsed().as_millis() as u64,
            sentiment = ?analysis.sentiment,
            "call-analysis-job"
        );

        if analysis.sentiment == Sentiment::Negative {
            self.ctx
                .queues
                .notifications()
                .add(
                    "urgent-notification",
                    json!({
                        "type": "negative-sentiment",
                        "callId": call_id,
                        "analysis": analysis,
                    }),
                )
                .await?;
        }

        Ok(analysis)
    }
}
