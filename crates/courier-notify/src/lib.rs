//! Client and staff notifications over a CRM's SMS and campaign API.
//!
//! [`NotificationService`] validates phone numbers and message bodies, finds
//! or creates the CRM contact, and then either enrolls it in a configured
//! campaign or sends a templated SMS directly.
//!
//! ```rust,ignore
//! use courier_notify::{GhlClient, GhlConfig, NotificationService, SmsRequest};
//!
//! let crm = GhlClient::new(GhlConfig::new(api_key, location_id))?;
//! let service = NotificationService::new(Arc::new(crm), directory, appointments);
//! service.send_sms(&SmsRequest::new("+19195550100", "Your documents are ready")).await?;
//! ```

pub mod crm;
pub mod directory;
pub mod error;
pub mod ghl;
pub mod service;
pub mod templates;
pub mod validate;

pub use crm::{Contact, CrmClient, NewContact, SentMessage, UnconfiguredCrm};
pub use directory::{
    AppointmentStore, AttorneyDirectory, InMemoryAppointments, InMemoryDirectory, ReminderMark,
    Role, StaffMember,
};
pub use error::{NotifyError, Result};
pub use ghl::{GhlClient, GhlConfig};
pub use service::{
    Appointment, BulkFailure, BulkPolicy, BulkReport, BulkSmsRequest, CampaignContact,
    CampaignIds, CaseUpdate, Delivery, GeneralNotification, NewClient, NotificationService,
    SmsReceipt, SmsRequest, Urgency,
};
pub use templates::FirmProfile;
pub use validate::{validate_body, validate_phone};
