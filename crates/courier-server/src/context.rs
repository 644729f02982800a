use crate::analysis::{AnalysisStore, CallAnalyzer, InMemoryAnalysisStore, StubAnalyzer};
use crate::config::AppConfig;
use crate::error::Result;
use crate::mail::{HttpMailer, Mailer, UnconfiguredMailer};
use crate::queues::Queues;
use courier_notify::{
    CrmClient, GhlClient, InMemoryAppointments, InMemoryDirectory, NotificationService,
    UnconfiguredCrm,
};
use std::sync::Arc;

/// Everything the processors and the HTTP layer share.
///
/// Built once at startup and passed explicitly; tests assemble one with fakes.
#[derive(Clone)]
pub struct AppContext {
    pub queues: Queues,
    pub notifications: Arc<NotificationService>,
    pub analyzer: Arc<dyn CallAnalyzer>,
    pub analyses: Arc<dyn AnalysisStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppContext {
    pub fn new(
        queues: Queues,
        notifications: Arc<NotificationService>,
        analyzer: Arc<dyn CallAnalyzer>,
        analyses: Arc<dyn AnalysisStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            queues,
            notifications,
            analyzer,
            analyses,
            mailer,
        }
    }

    /// Wire the production collaborators from configuration.
    ///
    /// Missing CRM or mail settings do not stop startup: the affected jobs
    /// fail (and are retained) until the settings are provided.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let queues = Queues::open(&config.backend_config())?;

        let crm: Arc<dyn CrmClient> = match config.ghl_config() {
            Some(ghl) => Arc::new(GhlClient::new(ghl)?),
            None => {
                tracing::warn!("GHL_API_KEY or GHL_LOCATION_ID not set; SMS notifications will fail");
                Arc::new(UnconfiguredCrm::new(
                    "GHL_API_KEY and GHL_LOCATION_ID are required",
                ))
            }
        };

        let attorneys = config.attorneys()?;
        if attorneys.is_empty() {
            tracing::warn!("ATTORNEYS not set; internal alerts will not be sent");
        }

        let notifications = NotificationService::new(
            crm,
            Arc::new(InMemoryDirectory::with_members(attorneys)),
            Arc::new(InMemoryAppointments::new()),
        )
        .with_campaigns(config.campaign_ids());

        let mailer: Arc<dyn Mailer> = match config.mail_endpoint() {
            Some((url, key)) => Arc::new(
                HttpMailer::new(url, key.map(str::to_string), config.mail_from.clone())?,
            ),
            None => {
                tracing::warn!("MAIL_API_URL not set; email jobs will fail");
                Arc::new(UnconfiguredMailer)
            }
        };

        Ok(Self::new(
            queues,
            Arc::new(notifications),
            Arc::new(StubAnalyzer::new()),
            Arc::new(InMemoryAnalysisStore::new()),
            mailer,
        ))
    }
}
