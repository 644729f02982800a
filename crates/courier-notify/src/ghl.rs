//! GoHighLevel REST client

use crate::crm::{Contact, CrmClient, NewContact, SentMessage};
use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://rest.gohighlevel.com/v1";

#[derive(Debug, Clone)]
pub struct GhlConfig {
    pub api_key: String,
    pub location_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl GhlConfig {
    pub fn new(api_key: impl Into<String>, location_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            location_id: location_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`CrmClient`] backed by the GoHighLevel v1 API.
#[derive(Debug, Clone)]
pub struct GhlClient {
    config: GhlConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateContactBody<'a> {
    #[serde(flatten)]
    contact: &'a NewContact,
    location_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    contact_id: &'a str,
    message: &'a str,
    user_id: &'a str,
}

impl GhlClient {
    pub fn new(config: GhlConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GhlConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.config.api_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(&self.config.api_key)
    }

    async fn json_or_error(response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect::<String>();
            let message = if message.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                message
            };
            return Err(NotifyError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| NotifyError::Decode(e.to_string()))
    }
}

fn decode_contact(value: Value) -> Result<Contact> {
    // Some API versions wrap the record in `contact`, others return it bare.
    let record = match value {
        Value::Object(mut map) if map.get("contact").map_or(false, Value::is_object) => {
            map.remove("contact").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(record).map_err(|e| NotifyError::Decode(e.to_string()))
}

#[async_trait]
impl CrmClient for GhlClient {
    async fn find_contact_by_phone(&self, phone: &str) -> Result<Option<Contact>> {
        let response = self
            .get("/contacts/lookup")
            .query(&[("phone", phone)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = Self::json_or_error(response).await?;
        match body.get("contacts").and_then(Value::as_array) {
            Some(contacts) => match contacts.first() {
                Some(first) => decode_contact(first.clone()).map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact> {
        let response = self
            .post("/contacts/")
            .json(&CreateContactBody {
                contact,
                location_id: &self.config.location_id,
            })
            .send()
            .await?;

        let body = Self::json_or_error(response).await?;
        let created = decode_contact(body)?;
        tracing::debug!(contact_id = %created.id, "Created CRM contact");
        Ok(created)
    }

    async fn send_message(&self, contact_id: &str, message: &str) -> Result<SentMessage> {
        let response = self
            .post("/conversations/messages")
            .json(&SendMessageBody {
                kind: "SMS",
                contact_id,
                message,
                user_id: &self.config.location_id,
            })
            .send()
            .await?;

        let body = Self::json_or_error(response).await?;
        let message_id = body
            .get("messageId")
            .or_else(|| body.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(SentMessage { message_id })
    }

    async fn trigger_campaign(&self, contact_id: &str, campaign_id: &str) -> Result<()> {
        let path = format!("/contacts/{}/campaigns/{}", contact_id, campaign_id);
        let response = self.post(&path).send().await?;
        Self::json_or_error(response).await?;
        Ok(())
    }
}
