//! Change-feed event types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{CHAT_MESSAGES_TABLE, CLIENTS_TABLE, SCHEDULE_TABLE};
use crate::errors::Error;

/// A data domain backed by one remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Clients,
    Schedule,
    ChatMessages,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Clients, Domain::Schedule, Domain::ChatMessages];

    /// Remote table name for this domain.
    pub fn table(&self) -> &'static str {
        match self {
            Domain::Clients => CLIENTS_TABLE,
            Domain::Schedule => SCHEDULE_TABLE,
            Domain::ChatMessages => CHAT_MESSAGES_TABLE,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.table() == s)
            .ok_or_else(|| Error::UnknownDomain(s.to_string()))
    }
}

/// Kind of row change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
    /// Something in the domain changed, without row detail.
    Wildcard,
}

/// One notification from a change feed.
///
/// `payload` stays as raw JSON until it reaches the reconciler, which decodes
/// it into the collection's record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub domain: Domain,
    pub operation: ChangeOperation,
    pub affected_key: Option<String>,
    pub payload: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(domain: Domain, key: impl Into<String>, payload: Value) -> Self {
        Self {
            domain,
            operation: ChangeOperation::Insert,
            affected_key: Some(key.into()),
            payload: Some(payload),
        }
    }

    pub fn update(domain: Domain, key: impl Into<String>, payload: Value) -> Self {
        Self {
            domain,
            operation: ChangeOperation::Update,
            affected_key: Some(key.into()),
            payload: Some(payload),
        }
    }

    pub fn delete(domain: Domain, key: impl Into<String>) -> Self {
        Self {
            domain,
            operation: ChangeOperation::Delete,
            affected_key: Some(key.into()),
            payload: None,
        }
    }

    /// A delete that carries the old row, as feeds with full replica identity send.
    pub fn delete_with_row(domain: Domain, key: impl Into<String>, old_row: Value) -> Self {
        Self {
            payload: Some(old_row),
            ..Self::delete(domain, key)
        }
    }

    pub fn wildcard(domain: Domain) -> Self {
        Self {
            domain,
            operation: ChangeOperation::Wildcard,
            affected_key: None,
            payload: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.operation == ChangeOperation::Wildcard
    }
}

/// What a change feed hands to a subscription callback.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedSignal {
    Change(ChangeEvent),
    /// The channel dropped; no further events will arrive on it.
    ConnectionLost(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_domain_round_trips_through_table_name() {
        for domain in Domain::ALL {
            assert_eq!(domain.table().parse::<Domain>().unwrap(), domain);
        }
    }

    #[test]
    fn test_unknown_domain_is_rejected() {
        let err = "invoices".parse::<Domain>().unwrap_err();
        assert!(matches!(err, Error::UnknownDomain(name) if name == "invoices"));
    }

    #[test]
    fn test_change_event_serialization() {
        let event = ChangeEvent::insert(Domain::Clients, "c1", json!({ "id": "c1" }));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "clients");
        assert_eq!(json["operation"], "INSERT");
        assert_eq!(json["affectedKey"], "c1");

        let wildcard = ChangeEvent::wildcard(Domain::Schedule);
        assert!(wildcard.is_wildcard());
        assert!(wildcard.affected_key.is_none());
    }
}
