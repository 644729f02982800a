//! Staff and appointment records the notification service reads and writes

use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attorney,
    Paralegal,
    Staff,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffMember {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub phone: Option<String>,
}

/// Source of the attorneys who receive internal alerts.
#[async_trait]
pub trait AttorneyDirectory: Send + Sync {
    /// Attorneys that have a phone number on file.
    async fn attorneys_with_phone(&self) -> Result<Vec<StaffMember>>;
}

/// Records that an appointment reminder went out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMark {
    pub reminder_sent: bool,
    pub reminder_sent_at: DateTime<Utc>,
    pub reminder_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn mark_reminder_sent(&self, appointment_id: &str, mark: ReminderMark) -> Result<()>;
}

fn poisoned<T>(_: T) -> NotifyError {
    NotifyError::Store("lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    members: RwLock<Vec<StaffMember>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_members(members: Vec<StaffMember>) -> Self {
        Self {
            members: RwLock::new(members),
        }
    }

    pub fn add(&self, member: StaffMember) -> Result<()> {
        self.members.write().map_err(poisoned)?.push(member);
        Ok(())
    }
}

#[async_trait]
impl AttorneyDirectory for InMemoryDirectory {
    async fn attorneys_with_phone(&self) -> Result<Vec<StaffMember>> {
        let members = self.members.read().map_err(poisoned)?;
        Ok(members
            .iter()
            .filter(|m| m.role == Role::Attorney && m.phone.is_some())
            .cloned()
            .collect())
    }
}

/// Keeps the latest reminder mark per appointment.
#[derive(Debug, Default)]
pub struct InMemoryAppointments {
    marks: RwLock<HashMap<String, ReminderMark>>,
}

impl InMemoryAppointments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reminder(&self, appointment_id: &str) -> Option<ReminderMark> {
        self.marks
            .read()
            .ok()
            .and_then(|marks| marks.get(appointment_id).cloned())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointments {
    async fn mark_reminder_sent(&self, appointment_id: &str, mark: ReminderMark) -> Result<()> {
        self.marks
            .write()
            .map_err(poisoned)?
            .insert(appointment_id.to_string(), mark);
        Ok(())
    }
}
