use thiserror::Error;

/// Error type for notification operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Input rejected before any request was made.
    #[error("Invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The CRM answered with a non-success status.
    #[error("CRM API error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// The CRM could not be reached.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The CRM answered with a body we could not understand.
    #[error("Unexpected CRM response: {0}")]
    Decode(String),

    /// The operation is only available through a campaign.
    #[error("Campaign ID required for {0}")]
    CampaignRequired(&'static str),

    /// No CRM credentials were provided.
    #[error("CRM is not configured: {0}")]
    NotConfigured(String),

    /// Reading staff or writing appointment records failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl NotifyError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
