//! CRM abstraction used by the notification service

use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A contact as stored by the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Fields used when a contact has to be created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContact {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub source: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, String>,
}

impl NewContact {
    /// A contact known only by phone number.
    pub fn unknown(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            first_name: "Unknown".to_string(),
            last_name: "Contact".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentMessage {
    pub message_id: Option<String>,
}

/// Operations the notification service needs from a CRM.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// Look a contact up by phone. `Ok(None)` when the CRM has no match.
    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>>;

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact>;

    /// Send an SMS to an existing contact.
    async fn send_message(&self, contact_id: &str, message: &str) -> Result<SentMessage>;

    /// Enroll a contact in a campaign (the campaign sends its own messages).
    async fn trigger_campaign(&self, contact_id: &str, campaign_id: &str) -> Result<()>;
}

/// Stand-in used when no CRM credentials are configured.
///
/// Every call fails with [`NotifyError::NotConfigured`], so notification jobs
/// end up in the failed list instead of disappearing.
#[derive(Debug, Clone)]
pub struct UnconfiguredCrm {
    reason: String,
}

impl UnconfiguredCrm {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> NotifyError {
        NotifyError::NotConfigured(self.reason.clone())
    }
}

#[async_trait]
impl CrmClient for UnconfiguredCrm {
    async fn find_contact_by_phone(&self, _phone: &str) -> Result<Option<Contact>> {
        Err(self.error())
    }

    async fn create_contact(&self, _contact: &NewContact) -> Result<Contact> {
        Err(self.error())
    }

    async fn send_message(&self, _contact_id: &str, _message: &str) -> Result<SentMessage> {
        Err(self.error())
    }

    async fn trigger_campaign(&self, _contact_id: &str, _campaign_id: &str) -> Result<()> {
        Err(self.error())
    }
}
