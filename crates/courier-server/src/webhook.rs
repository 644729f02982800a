//! Turns inbound call events into queued jobs

use crate::processors::CallAnalysisJob;
use crate::queues::Queues;
use courier_jobs::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Inbound call-platform event.
///
/// Only `type` is required; everything else is passed through as found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub recording_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub queued: bool,
}

/// Enqueue the job for `event` and acknowledge without waiting for it to run.
///
/// `call.ended` goes to call analysis and `recording.ready` to transcription.
/// Any other type is acknowledged the same way but enqueues nothing.
pub async fn handle_webhook_async(queues: &Queues, event: WebhookEvent) -> Result<WebhookAck> {
    match event.kind.as_str() {
        "call.ended" => {
            let job_id = queues
                .call_analysis()
                .add(
                    "analyze-call",
                    CallAnalysisJob {
                        call_id: event.call_id,
                        transcript: event.transcript,
                        metadata: event.metadata.unwrap_or(Value::Null),
                    },
                )
                .await?;
            tracing::debug!(%job_id, "Queued call analysis");
        }
        "recording.ready" => {
            let job_id = queues
                .transcription()
                .add(
                    "transcribe-recording",
                    json!({
                        "callId": event.call_id,
                        "recordingUrl": event.recording_url,
                    }),
                )
                .await?;
            tracing::debug!(%job_id, "Queued transcription");
        }
        other => {
            tracing::debug!(event_type = %other, "Ignoring webhook event");
        }
    }

    Ok(WebhookAck { queued: true })
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(40))]

        /// Unrecognized event types are acknowledged and enqueue nothing
        #[test]
        fn prop_unknown_events_enqueue_nothing(kind in "[a-z]{1,10}\\.[a-z]{1,10}") {
            prop_assume!(kind != "call.ended" && kind != "recording.ready");
            runtime().block_on(async {
                let queues = Queues::in_memory();
                let event = WebhookEvent { kind, ..Default::default() };

                let ack = handle_webhook_async(&queues, event).await.unwrap();
                prop_assert!(ack.queued);
                for (_, queue) in queues.iter() {
                    prop_assert_eq!(queue.counts().await.unwrap().waiting, 0);
                }
                Ok(())
            })?;
        }

        /// Each call.ended event becomes its own job; duplicates are not merged
        #[test]
        fn prop_each_call_ended_is_one_job(n in 1usize..8) {
            runtime().block_on(async {
                let queues = Queues::in_memory();
                for _ in 0..n {
                    let event = WebhookEvent {
                        kind: "call.ended".into(),
                        call_id: Some("same-call".into()),
                        ..Default::default()
                    };
                    handle_webhook_async(&queues, event).await.unwrap();
                }
                prop_assert_eq!(queues.call_analysis().counts().await.unwrap().waiting, n as u64);
                Ok(())
            })?;
        }
    }
}
