//! Schedule domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::sync::{Domain, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// Domain model representing a scheduled appointment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub client_id: Option<String>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

impl Appointment {
    pub fn is_upcoming(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        self.status == AppointmentStatus::Scheduled && self.starts_at >= now && self.starts_at < until
    }
}

impl Record for Appointment {
    const DOMAIN: Domain = Domain::Schedule;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }
        if self.ends_at < self.starts_at {
            return Err(ValidationError::invalid("ends_at", "ends before it starts"));
        }
        Ok(())
    }
}
