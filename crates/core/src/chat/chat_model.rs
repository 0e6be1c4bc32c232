//! Chat domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::sync::{Domain, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Assistant,
}

/// One chat message of a session.
///
/// Messages of a session are kept in ascending `sequence_id` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub sequence_id: i64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Record for Message {
    const DOMAIN: Domain = Domain::ChatMessages;

    fn key(&self) -> &str {
        &self.id
    }

    fn sequence(&self) -> Option<i64> {
        Some(self.sequence_id)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.session_id.trim().is_empty() {
            return Err(ValidationError::MissingField("session_id".to_string()));
        }
        if self.sequence_id < 0 {
            return Err(ValidationError::invalid("sequence_id", "must not be negative"));
        }
        Ok(())
    }
}
