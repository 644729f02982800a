use super::worker_error;
use crate::mail::{EmailMessage, MailOutcome, Mailer};
use async_trait::async_trait;
use courier_jobs::{JobContext, Processor, Result};
use std::sync::Arc;

pub struct EmailProcessor {
    mailer: Arc<dyn Mailer>,
}

impl EmailProcessor {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Processor for EmailProcessor {
    type Data = EmailMessage;
    type Output = MailOutcome;

    async fn execute(&self, ctx: JobContext, message: EmailMessage) -> Result<MailOutcome> {
        tracing::info!(
            job_id = %ctx.job_id,
            to = %message.to,
            subject = %message.subject,
            template = ?message.template,
            "Processing email job"
        );

        let outcome = self.mailer.send(&message).await;
        if !outcome.success {
            let error = outcome
                .error
                .unwrap_or_else(|| "Email send failed".to_string());
            tracing::error!(job_id = %ctx.job_id, %error, "Email send failed");
            return Err(worker_error(error));
        }
        Ok(outcome)
    }
}
