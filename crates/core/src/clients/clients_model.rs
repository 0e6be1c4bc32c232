//! Client domain models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::custom_fields::CustomFieldValue;
use crate::errors::ValidationError;
use crate::sync::{Domain, Record};

/// Lifecycle stage of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Lead,
    Active,
    Inactive,
}

/// Domain model representing a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: ClientStatus,
    /// Acquisition channel (campaign, referral, ...)
    pub source: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, CustomFieldValue>,
    pub created_at: DateTime<Utc>,
}

impl Record for Client {
    const DOMAIN: Domain = Domain::Clients;

    fn key(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(ValidationError::invalid("email", "not an email address"));
            }
        }
        self.custom_fields
            .iter()
            .try_for_each(|(field, value)| value.validate_shape(field))
    }
}
