use super::{decode, payload_type, worker_error};
use crate::analysis::CallAnalysis;
use async_trait::async_trait;
use courier_jobs::{JobContext, JobError, JobHandler, Result};
use courier_notify::{
    Appointment, BulkSmsRequest, CaseUpdate, GeneralNotification, NewClient,
    NotificationService, NotifyError, SmsRequest, Urgency,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NegativeSentiment {
    #[serde(default)]
    call_id: Option<String>,
    analysis: CallAnalysis,
}

#[derive(Debug, Deserialize)]
struct AttorneyAlert {
    message: String,
    #[serde(default)]
    urgency: Urgency,
}

/// Sends the notification described by the payload's `type`.
pub struct NotificationProcessor {
    service: Arc<NotificationService>,
}

impl NotificationProcessor {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }

    async fn dispatch(&self, kind: &str, payload: Value) -> Result<Value> {
        let service = &self.service;
        let sent = match kind {
            "negative-sentiment" => {
                let data: NegativeSentiment = decode(payload)?;
                let message = format!(
                    "Negative sentiment detected on call {}: {}",
                    data.call_id.as_deref().unwrap_or("unknown"),
                    data.analysis.summary
                );
                let report = service
                    .notify_attorneys(&message, Urgency::High)
                    .await
                    .map_err(notify_error)?;
                json!({ "notified": report.map_or(0, |r| r.sent) })
            }
            "attorney-alert" => {
                let data: AttorneyAlert = decode(payload)?;
                let report = service
                    .notify_attorneys(&data.message, data.urgency)
                    .await
                    .map_err(notify_error)?;
                json!({ "notified": report.map_or(0, |r| r.sent) })
            }
            "sms" => {
                let request: SmsRequest = decode(payload)?;
                to_value(service.send_sms(&request).await)?
            }
            "bulk-sms" => {
                let request: BulkSmsRequest = decode(payload)?;
                to_value(service.send_bulk_sms(&request).await)?
            }
            "appointment-reminder" => {
                let appointment: Appointment = decode(field(payload, "appointment"))?;
                to_value(service.send_appointment_reminder(&appointment).await)?
            }
            "case-update" => {
                let update: CaseUpdate = decode(field(payload, "update"))?;
                to_value(service.send_case_update(&update).await)?
            }
            "welcome-message" => {
                let client: NewClient = decode(field(payload, "client"))?;
                to_value(service.send_welcome_message(&client).await)?
            }
            "general-notification" => {
                let notification: GeneralNotification = decode(payload)?;
                to_value(service.send_general_notification(&notification).await)?
            }
            other => return Err(JobError::UnknownJobType(format!("notification '{}'", other))),
        };
        Ok(sent)
    }
}

/// Bad input and missing CRM setup fail the job at once; provider and
/// network errors are retried.
fn notify_error(e: NotifyError) -> JobError {
    match e {
        NotifyError::Validation { .. }
        | NotifyError::CampaignRequired(_)
        | NotifyError::NotConfigured(_) => JobError::Rejected(e.to_string()),
        other => worker_error(other),
    }
}

fn to_value<T: serde::Serialize>(result: std::result::Result<T, NotifyError>) -> Result<Value> {
    Ok(serde_json::to_value(result.map_err(notify_error)?)?)
}

/// Nested object under `key`, or the payload itself when the key is absent
fn field(mut payload: Value, key: &str) -> Value {
    match payload.get_mut(key).map(Value::take) {
        Some(inner) => inner,
        None => payload,
    }
}

#[async_trait]
impl JobHandler for NotificationProcessor {
    async fn handle(&self, ctx: JobContext, payload: Value) -> Result<Value> {
        let kind = payload_type(&payload).to_string();
        tracing::debug!(job_id = %ctx.job_id, job_type = %ctx.job_type, kind = %kind, "Processing notification");
        self.dispatch(&kind, payload).await
    }
}
