//! Notification service: transactional SMS and campaign enrollment

use crate::crm::{Contact, CrmClient, NewContact};
use crate::directory::{AppointmentStore, AttorneyDirectory, ReminderMark};
use crate::error::{NotifyError, Result};
use crate::templates::{self, FirmProfile};
use crate::validate::{validate_body, validate_phone};
use chrono::{NaiveDate, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Name recorded against appointments and receipts.
pub const PROVIDER: &str = "gohighlevel";

/// Campaign per message category. A missing id selects the direct-SMS path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignIds {
    pub appointment_reminder: Option<String>,
    pub case_update: Option<String>,
    pub welcome: Option<String>,
    pub general_notification: Option<String>,
}

impl CampaignIds {
    /// Blank values count as "not configured".
    pub fn from_values(
        appointment_reminder: Option<String>,
        case_update: Option<String>,
        welcome: Option<String>,
        general_notification: Option<String>,
    ) -> Self {
        fn present(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            appointment_reminder: present(appointment_reminder),
            case_update: present(case_update),
            welcome: present(welcome),
            general_notification: present(general_notification),
        }
    }
}

/// Fixed-size batching for bulk sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkPolicy {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for BulkPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmsRequest {
    pub to: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SmsRequest {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
            tags: Vec::new(),
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsReceipt {
    pub to: String,
    pub contact_id: String,
    pub message_id: Option<String>,
    pub provider: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BulkSmsRequest {
    pub recipients: Vec<String>,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub recipient: String,
    pub error: String,
}

/// Outcome of a bulk send. `sent + failed` always equals the number of recipients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub sent: usize,
    pub failed: usize,
    pub batches: usize,
    pub results: Vec<SmsReceipt>,
    pub errors: Vec<BulkFailure>,
}

/// How a categorized message reached the contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel", rename_all = "camelCase")]
pub enum Delivery {
    #[serde(rename_all = "camelCase")]
    Campaign {
        campaign_id: String,
        contact_id: String,
    },
    Sms(SmsReceipt),
}

impl Delivery {
    pub fn contact_id(&self) -> &str {
        match self {
            Delivery::Campaign { contact_id, .. } => contact_id,
            Delivery::Sms(receipt) => &receipt.contact_id,
        }
    }
}

/// Optional contact details used when enrolling a phone number in a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub client_name: String,
    pub client_phone: String,
    pub date: NaiveDate,
    pub time: String,
    pub attorney_name: String,
    #[serde(rename = "type")]
    pub appointment_type: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseUpdate {
    pub client_name: String,
    pub client_phone: String,
    pub case_number: String,
    pub update_type: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralNotification {
    pub name: String,
    pub phone: String,
    pub message: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Urgency::High => "🚨 URGENT: ",
            _ => "",
        }
    }
}

/// "Ana María Ruiz" becomes ("Ana", "María Ruiz").
fn split_name(full_name: &str, last_default: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or("Unknown").to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    let last = if rest.is_empty() {
        last_default.to_string()
    } else {
        rest
    };
    (first, last)
}

fn tags_or<I>(tags: &[String], default: I) -> Vec<String>
where
    I: IntoIterator<Item = &'static str>,
{
    if tags.is_empty() {
        default.into_iter().map(str::to_string).collect()
    } else {
        tags.to_vec()
    }
}

/// `tag` plus the slug of a free-text label, skipping labels with no slug
fn labeled_tags(tag: &str, label: &str) -> Vec<String> {
    let mut tags = vec![tag.to_string()];
    let slug = templates::tag_slug(label);
    if !slug.is_empty() {
        tags.push(slug);
    }
    tags
}

/// Sends client and staff notifications through a [`CrmClient`].
///
/// Every public method returns a [`Result`]; validation problems surface as
/// [`NotifyError::Validation`] before any request reaches the CRM.
pub struct NotificationService {
    crm: Arc<dyn CrmClient>,
    attorneys: Arc<dyn AttorneyDirectory>,
    appointments: Arc<dyn AppointmentStore>,
    campaigns: CampaignIds,
    bulk: BulkPolicy,
    firm: FirmProfile,
}

impl NotificationService {
    pub fn new(
        crm: Arc<dyn CrmClient>,
        attorneys: Arc<dyn AttorneyDirectory>,
        appointments: Arc<dyn AppointmentStore>,
    ) -> Self {
        Self {
            crm,
            attorneys,
            appointments,
            campaigns: CampaignIds::default(),
            bulk: BulkPolicy::default(),
            firm: FirmProfile::default(),
        }
    }

    pub fn with_campaigns(mut self, campaigns: CampaignIds) -> Self {
        self.campaigns = campaigns;
        self
    }

    pub fn with_bulk_policy(mut self, bulk: BulkPolicy) -> Self {
        self.bulk = bulk;
        self
    }

    pub fn with_firm(mut self, firm: FirmProfile) -> Self {
        self.firm = firm;
        self
    }

    pub fn campaigns(&self) -> &CampaignIds {
        &self.campaigns
    }

    async fn find_or_create(&self, contact: NewContact) -> Result<Contact> {
        if let Some(existing) = self.crm.find_contact_by_phone(&contact.phone).await? {
            return Ok(existing);
        }
        self.crm.create_contact(&contact).await
    }

    /// Send one SMS, creating the CRM contact on first use of the number.
    pub async fn send_sms(&self, request: &SmsRequest) -> Result<SmsReceipt> {
        validate_phone(&request.to)?;
        validate_body(&request.body)?;

        match self.deliver_sms(request).await {
            Ok(receipt) => {
                tracing::info!(
                    to = %receipt.to,
                    contact_id = %receipt.contact_id,
                    message_id = ?receipt.message_id,
                    "SMS sent"
                );
                Ok(receipt)
            }
            Err(e) => {
                tracing::error!(to = %request.to, error = %e, "Failed to send SMS");
                Err(e)
            }
        }
    }

    async fn deliver_sms(&self, request: &SmsRequest) -> Result<SmsReceipt> {
        let mut new_contact = NewContact::unknown(&request.to);
        new_contact.tags = tags_or(&request.tags, ["automated-sms"]);
        new_contact.source = "Website SMS".to_string();

        let contact = self.find_or_create(new_contact).await?;
        let sent = self.crm.send_message(&contact.id, &request.body).await?;
        Ok(SmsReceipt {
            to: request.to.clone(),
            contact_id: contact.id,
            message_id: sent.message_id,
            provider: PROVIDER,
        })
    }

    /// Send the same body to many recipients in fixed-size batches.
    ///
    /// All recipients and the body are validated first. After that, a failed
    /// recipient is recorded in the report and does not stop the others. The
    /// next batch starts only after every send of the current one settled
    /// and the batch delay elapsed.
    pub async fn send_bulk_sms(&self, request: &BulkSmsRequest) -> Result<BulkReport> {
        validate_body(&request.body)?;
        for recipient in &request.recipients {
            validate_phone(recipient)?;
        }

        let tags = tags_or(&request.tags, ["bulk-sms"]);
        let batch_size = self.bulk.batch_size.max(1);
        let batches: Vec<&[String]> = request.recipients.chunks(batch_size).collect();
        let total = batches.len();
        let mut report = BulkReport::default();

        for (index, batch) in batches.into_iter().enumerate() {
            let sends = batch.iter().map(|to| {
                let sms = SmsRequest {
                    to: to.clone(),
                    body: request.body.clone(),
                    tags: tags.clone(),
                };
                async move {
                    let outcome = self.send_sms(&sms).await;
                    (sms.to, outcome)
                }
            });

            for (recipient, outcome) in join_all(sends).await {
                match outcome {
                    Ok(receipt) => {
                        report.sent += 1;
                        report.results.push(receipt);
                    }
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(BulkFailure {
                            recipient,
                            error: e.to_string(),
                        });
                    }
                }
            }
            report.batches += 1;

            if index + 1 < total {
                tokio::time::sleep(self.bulk.batch_delay).await;
            }
        }

        if report.failed > 0 {
            tracing::warn!(
                sent = report.sent,
                failed = report.failed,
                errors = ?report.errors,
                "Some SMS messages failed to send"
            );
        } else {
            tracing::info!(sent = report.sent, batches = report.batches, "Bulk SMS sent");
        }

        Ok(report)
    }

    /// Find or create the contact for `phone` and enroll it in `campaign_id`.
    /// Returns the CRM contact id.
    pub async fn add_to_campaign(
        &self,
        phone: &str,
        campaign_id: &str,
        details: CampaignContact,
    ) -> Result<String> {
        validate_phone(phone)?;

        let new_contact = NewContact {
            phone: phone.to_string(),
            first_name: details.first_name.unwrap_or_else(|| "Unknown".to_string()),
            last_name: details.last_name.unwrap_or_else(|| "Contact".to_string()),
            email: details.email,
            tags: tags_or(&details.tags, ["campaign-recipient"]),
            source: details.source.unwrap_or_else(|| "Website".to_string()),
            custom_fields: details.custom_fields,
        };

        let result = async {
            let contact = self.find_or_create(new_contact).await?;
            self.crm.trigger_campaign(&contact.id, campaign_id).await?;
            Ok::<_, NotifyError>(contact.id)
        }
        .await;

        match result {
            Ok(contact_id) => {
                tracing::info!(%phone, %campaign_id, %contact_id, "Contact enrolled in campaign");
                Ok(contact_id)
            }
            Err(e) => {
                tracing::error!(%phone, %campaign_id, error = %e, "Failed to add contact to campaign");
                Err(e)
            }
        }
    }

    async fn campaign_or_sms(
        &self,
        campaign_id: Option<&str>,
        phone: &str,
        details: CampaignContact,
        fallback_body: impl FnOnce() -> String,
    ) -> Result<Delivery> {
        match campaign_id {
            Some(campaign_id) => {
                let tags = details.tags.clone();
                let contact_id = self.add_to_campaign(phone, campaign_id, details).await?;
                tracing::debug!(?tags, "Delivered through campaign");
                Ok(Delivery::Campaign {
                    campaign_id: campaign_id.to_string(),
                    contact_id,
                })
            }
            None => {
                let sms = SmsRequest {
                    to: phone.to_string(),
                    body: fallback_body(),
                    tags: details.tags,
                };
                self.send_sms(&sms).await.map(Delivery::Sms)
            }
        }
    }

    /// Remind a client of an appointment, then record the reminder on the appointment.
    pub async fn send_appointment_reminder(&self, appointment: &Appointment) -> Result<Delivery> {
        let (first_name, last_name) = split_name(&appointment.client_name, "Client");
        let location = appointment
            .location
            .clone()
            .unwrap_or_else(|| "Phone Consultation".to_string());

        let custom_fields = BTreeMap::from([
            ("appointmentId".to_string(), appointment.id.clone()),
            (
                "appointmentDate".to_string(),
                templates::long_date(appointment.date),
            ),
            ("appointmentTime".to_string(), appointment.time.clone()),
            ("attorneyName".to_string(), appointment.attorney_name.clone()),
            (
                "appointmentType".to_string(),
                appointment.appointment_type.clone(),
            ),
            ("appointmentLocation".to_string(), location),
        ]);

        let details = CampaignContact {
            first_name: Some(first_name),
            last_name: Some(last_name),
            tags: labeled_tags("appointment-reminder", &appointment.appointment_type),
            source: Some("Appointment Reminder".to_string()),
            custom_fields,
            ..Default::default()
        };

        let delivery = self
            .campaign_or_sms(
                self.campaigns.appointment_reminder.as_deref(),
                &appointment.client_phone,
                details,
                || {
                    templates::appointment_reminder(
                        &self.firm,
                        &appointment.client_name,
                        &appointment.appointment_type,
                        &appointment.attorney_name,
                        appointment.date,
                        &appointment.time,
                        appointment.location.as_deref(),
                    )
                },
            )
            .await?;

        self.appointments
            .mark_reminder_sent(
                &appointment.id,
                ReminderMark {
                    reminder_sent: true,
                    reminder_sent_at: Utc::now(),
                    reminder_provider: PROVIDER.to_string(),
                    contact_id: Some(delivery.contact_id().to_string()),
                },
            )
            .await?;

        tracing::info!(appointment_id = %appointment.id, "Appointment reminder sent");
        Ok(delivery)
    }

    pub async fn send_case_update(&self, update: &CaseUpdate) -> Result<Delivery> {
        let (first_name, last_name) = split_name(&update.client_name, "Client");
        let details = CampaignContact {
            first_name: Some(first_name),
            last_name: Some(last_name),
            tags: labeled_tags("case-update", &update.update_type),
            source: Some("Case Update".to_string()),
            custom_fields: BTreeMap::from([
                ("caseNumber".to_string(), update.case_number.clone()),
                ("updateType".to_string(), update.update_type.clone()),
                ("updateMessage".to_string(), update.message.clone()),
            ]),
            ..Default::default()
        };

        self.campaign_or_sms(
            self.campaigns.case_update.as_deref(),
            &update.client_phone,
            details,
            || {
                templates::case_update(
                    &self.firm,
                    &update.client_name,
                    &update.case_number,
                    &update.update_type,
                    &update.message,
                )
            },
        )
        .await
    }

    pub async fn send_welcome_message(&self, client: &NewClient) -> Result<Delivery> {
        let details = CampaignContact {
            first_name: Some(client.first_name.clone()),
            last_name: Some(client.last_name.clone()),
            email: client.email.clone(),
            tags: vec!["welcome-message".to_string(), "new-contact".to_string()],
            source: Some(
                client
                    .source
                    .clone()
                    .unwrap_or_else(|| "Website".to_string()),
            ),
            ..Default::default()
        };

        self.campaign_or_sms(
            self.campaigns.welcome.as_deref(),
            &client.phone,
            details,
            || templates::welcome(&self.firm, &client.first_name),
        )
        .await
    }

    pub async fn send_general_notification(
        &self,
        notification: &GeneralNotification,
    ) -> Result<Delivery> {
        let (first_name, last_name) = split_name(&notification.name, "Contact");
        let details = CampaignContact {
            first_name: Some(first_name),
            last_name: Some(last_name),
            tags: tags_or(&notification.tags, ["general-notification"]),
            custom_fields: BTreeMap::from([(
                "notificationMessage".to_string(),
                notification.message.clone(),
            )]),
            ..Default::default()
        };

        self.campaign_or_sms(
            self.campaigns.general_notification.as_deref(),
            &notification.phone,
            details,
            || templates::general(&self.firm, &notification.name, &notification.message),
        )
        .await
    }

    /// Text every attorney with a phone on file.
    ///
    /// Returns `Ok(None)` when nobody is reachable.
    pub async fn notify_attorneys(
        &self,
        message: &str,
        urgency: Urgency,
    ) -> Result<Option<BulkReport>> {
        let attorneys = self.attorneys.attorneys_with_phone().await?;
        let recipients: Vec<String> = attorneys.into_iter().filter_map(|a| a.phone).collect();

        if recipients.is_empty() {
            tracing::debug!(urgency = urgency.as_str(), "No attorneys to notify");
            return Ok(None);
        }

        let request = BulkSmsRequest {
            recipients,
            body: format!("{}{}", urgency.prefix(), message),
            tags: vec![
                "attorney-notification".to_string(),
                format!("urgency-{}", urgency.as_str()),
            ],
        };

        match self.send_bulk_sms(&request).await {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to notify attorneys");
                Err(e)
            }
        }
    }

    /// Outbound calls are placed by a CRM campaign; without one there is no way to dial.
    pub async fn make_call(
        &self,
        phone: &str,
        campaign_id: Option<&str>,
        tags: &[String],
    ) -> Result<String> {
        let campaign_id = campaign_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(NotifyError::CampaignRequired("outbound calls"))?;

        self.add_to_campaign(
            phone,
            campaign_id,
            CampaignContact {
                tags: tags_or(tags, ["outbound-call"]),
                ..Default::default()
            },
        )
        .await
    }
}
