//! Configuration loaded from the environment and an optional `.env` file.
//!
//! ```ignore
//! use courier_server::config::{load_dotenv, AppConfig};
//!
//! load_dotenv();
//! let config = AppConfig::from_env()?;
//! let backend = config.backend_config();
//! ```

use courier_jobs::BackendConfig;
use courier_notify::{validate_phone, CampaignIds, GhlConfig, Role, StaffMember};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable deserialization failed.
    #[error("Configuration error: {0}")]
    Envy(#[from] envy::Error),

    /// A variable is present but its value is unusable.
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Environment profile, read from `COURIER_ENV`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Custom(String),
}

impl Environment {
    /// `production`/`prod` and `development`/`dev` are recognized; unset means development.
    pub fn current() -> Self {
        Self::parse(std::env::var("COURIER_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("production") | Some("prod") => Self::Production,
            Some("development") | Some("dev") | None => Self::Development,
            Some(other) => Self::Custom(other.to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Self::Development => "debug",
            Self::Production | Self::Custom(_) => "info",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which job store backs the queues. Selected explicitly, never inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    #[default]
    Memory,
    Redis,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_queue_prefix() -> String {
    "courier".to_string()
}

fn default_mail_from() -> String {
    "Vasquez Law Firm <noreply@vasquezlawnc.com>".to_string()
}

fn default_worker_poll_ms() -> u64 {
    500
}

fn default_stall_timeout_secs() -> u64 {
    600
}

/// Application settings. Each field reads the SCREAMING_SNAKE_CASE variable of the same name.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub queue_backend: QueueBackendKind,
    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default)]
    pub redis_password: Option<String>,
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,
    #[serde(default = "default_worker_poll_ms")]
    pub worker_poll_ms: u64,
    /// Active jobs older than this are requeued at startup.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    #[serde(default)]
    pub ghl_api_key: Option<String>,
    #[serde(default)]
    pub ghl_location_id: Option<String>,
    #[serde(default)]
    pub ghl_api_url: Option<String>,
    #[serde(default)]
    pub ghl_appointment_reminder_campaign_id: Option<String>,
    #[serde(default)]
    pub ghl_case_update_campaign_id: Option<String>,
    #[serde(default)]
    pub ghl_welcome_campaign_id: Option<String>,
    #[serde(default)]
    pub ghl_general_notification_campaign_id: Option<String>,

    #[serde(default)]
    pub mail_api_url: Option<String>,
    #[serde(default)]
    pub mail_api_key: Option<String>,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// Attorneys who receive internal alerts, as comma-separated
    /// `Name=+19195550100` entries. A bare phone number is also accepted.
    #[serde(default)]
    pub attorneys: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::from_env::<Self>()?)
    }

    /// Build from explicit key/value pairs instead of the process environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs.into_iter().map(|(k, v)| (k.into(), v.into()));
        Ok(envy::from_iter::<_, Self>(vars)?)
    }

    pub fn redis_url(&self) -> String {
        match non_empty(&self.redis_password) {
            Some(password) => format!(
                "redis://:{}@{}:{}",
                password, self.redis_host, self.redis_port
            ),
            None => format!("redis://{}:{}", self.redis_host, self.redis_port),
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        match self.queue_backend {
            QueueBackendKind::Memory => BackendConfig::InMemory,
            QueueBackendKind::Redis => BackendConfig::Redis {
                url: self.redis_url(),
                prefix: self.queue_prefix.clone(),
            },
        }
    }

    /// CRM settings, or `None` when the API key or location id is missing.
    pub fn ghl_config(&self) -> Option<GhlConfig> {
        let api_key = non_empty(&self.ghl_api_key)?;
        let location_id = non_empty(&self.ghl_location_id)?;
        let config = GhlConfig::new(api_key, location_id);
        Some(match non_empty(&self.ghl_api_url) {
            Some(url) => config.base_url(url),
            None => config,
        })
    }

    pub fn campaign_ids(&self) -> CampaignIds {
        CampaignIds::from_values(
            self.ghl_appointment_reminder_campaign_id.clone(),
            self.ghl_case_update_campaign_id.clone(),
            self.ghl_welcome_campaign_id.clone(),
            self.ghl_general_notification_campaign_id.clone(),
        )
    }

    /// Parse `ATTORNEYS` into directory entries, rejecting numbers that are not E.164.
    pub fn attorneys(&self) -> Result<Vec<StaffMember>, ConfigError> {
        let Some(list) = non_empty(&self.attorneys) else {
            return Ok(Vec::new());
        };

        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .enumerate()
            .map(|(i, entry)| {
                let (name, phone) = match entry.rsplit_once('=') {
                    Some((name, phone)) => (name.trim(), phone.trim()),
                    None => ("", entry),
                };
                validate_phone(phone).map_err(|e| ConfigError::Invalid {
                    var: "ATTORNEYS",
                    message: e.to_string(),
                })?;
                let id = format!("attorney-{}", i + 1);
                Ok(StaffMember {
                    name: if name.is_empty() { id.clone() } else { name.to_string() },
                    id,
                    role: Role::Attorney,
                    phone: Some(phone.to_string()),
                })
            })
            .collect()
    }

    pub fn mail_endpoint(&self) -> Option<(&str, Option<&str>)> {
        non_empty(&self.mail_api_url).map(|url| (url, non_empty(&self.mail_api_key)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms.max(10))
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            var: "BIND_ADDR",
            message: e.to_string(),
        })
    }
}

/// Load variables from `.env` in the working directory.
///
/// A missing file is not an error and existing variables are not overridden.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        AppConfig::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string()))).unwrap()
    }

    #[test]
    fn environment_parsing() {
        assert_eq!(Environment::parse(None), Environment::Development);
        assert_eq!(Environment::parse(Some("prod")), Environment::Production);
        assert_eq!(
            Environment::parse(Some("staging")),
            Environment::Custom("staging".into())
        );
        assert_eq!(Environment::Production.default_log_level(), "info");
        assert_eq!(Environment::Development.default_log_level(), "debug");
    }

    #[test]
    fn defaults_select_memory_backend() {
        let cfg = config(&[]);
        assert_eq!(cfg.queue_backend, QueueBackendKind::Memory);
        assert!(matches!(cfg.backend_config(), BackendConfig::InMemory));
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert!(cfg.ghl_config().is_none());
        assert!(cfg.mail_endpoint().is_none());
    }

    #[test]
    fn redis_host_alone_does_not_switch_backend() {
        let cfg = config(&[("REDIS_HOST", "cache.internal")]);
        assert!(matches!(cfg.backend_config(), BackendConfig::InMemory));
    }

    #[test]
    fn redis_url_includes_password() {
        let cfg = config(&[
            ("QUEUE_BACKEND", "redis"),
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "s3cret"),
        ]);
        match cfg.backend_config() {
            BackendConfig::Redis { url, prefix } => {
                assert_eq!(url, "redis://:s3cret@cache.internal:6380");
                assert_eq!(prefix, "courier");
            }
            other => panic!("unexpected backend: {:?}", other),
        }
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let result = AppConfig::from_pairs([("QUEUE_BACKEND", "postgres")]);
        assert!(matches!(result, Err(ConfigError::Envy(_))));
    }

    #[test]
    fn ghl_config_needs_key_and_location() {
        let partial = config(&[("GHL_API_KEY", "key")]);
        assert!(partial.ghl_config().is_none());

        let full = config(&[
            ("GHL_API_KEY", "key"),
            ("GHL_LOCATION_ID", "loc"),
            ("GHL_API_URL", "http://127.0.0.1:9999/v1/"),
        ]);
        let ghl = full.ghl_config().unwrap();
        assert_eq!(ghl.location_id, "loc");
        assert_eq!(ghl.base_url, "http://127.0.0.1:9999/v1");
    }

    #[test]
    fn empty_campaign_ids_fall_back_to_sms() {
        let cfg = config(&[
            ("GHL_APPOINTMENT_REMINDER_CAMPAIGN_ID", ""),
            ("GHL_WELCOME_CAMPAIGN_ID", "camp-w"),
        ]);
        let ids = cfg.campaign_ids();
        assert!(ids.appointment_reminder.is_none());
        assert_eq!(ids.welcome.as_deref(), Some("camp-w"));
    }

    #[test]
    fn attorneys_are_read_from_a_list() {
        assert!(config(&[]).attorneys().unwrap().is_empty());

        let cfg = config(&[("ATTORNEYS", "Maria Vasquez=+19195550100, +19195550101,")]);
        let attorneys = cfg.attorneys().unwrap();
        assert_eq!(attorneys.len(), 2);
        assert_eq!(attorneys[0].name, "Maria Vasquez");
        assert_eq!(attorneys[0].phone.as_deref(), Some("+19195550100"));
        assert_eq!(attorneys[0].role, Role::Attorney);
        assert_eq!(attorneys[1].id, "attorney-2");
        assert_eq!(attorneys[1].phone.as_deref(), Some("+19195550101"));
    }

    #[test]
    fn attorney_without_valid_phone_is_rejected() {
        let cfg = config(&[("ATTORNEYS", "Maria Vasquez=919-555-0100")]);
        assert!(matches!(
            cfg.attorneys(),
            Err(ConfigError::Invalid { var: "ATTORNEYS", .. })
        ));
    }

    #[test]
    fn bad_bind_addr_is_reported() {
        let cfg = config(&[("BIND_ADDR", "not an address")]);
        assert!(matches!(
            cfg.socket_addr(),
            Err(ConfigError::Invalid { var: "BIND_ADDR", .. })
        ));
    }
}
