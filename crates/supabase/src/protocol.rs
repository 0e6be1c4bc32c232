//! Realtime wire protocol: Phoenix channel frames and `postgres_changes`
//! payload decoding.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use clientdesk_core::sync::{ChangeEvent, Domain, RowFilter};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";
pub const PHOENIX_TOPIC: &str = "phoenix";

const KEY_COLUMN: &str = "id";

/// One Phoenix channel frame (JSON serializer v1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    /// Join frame subscribing `topic` to row changes of one table.
    pub fn join(
        topic: &str,
        msg_ref: &str,
        schema: &str,
        table: &str,
        filter: &RowFilter,
        access_token: &str,
    ) -> Self {
        let mut change = json!({
            "event": "*",
            "schema": schema,
            "table": table,
        });
        if let Some(query) = filter.to_query() {
            change["filter"] = Value::String(query);
        }
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [change],
                    "private": false,
                },
                "access_token": access_token,
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn leave(topic: &str, msg_ref: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn heartbeat(msg_ref: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    /// `Some(Ok(()))` for an ok reply, `Some(Err(reason))` for an error
    /// reply, `None` when this is not a reply.
    pub fn reply_status(&self) -> Option<Result<(), String>> {
        if self.event != EVENT_REPLY {
            return None;
        }
        match self.payload.get("status").and_then(Value::as_str) {
            Some("ok") => Some(Ok(())),
            other => {
                let reason = self
                    .payload
                    .pointer("/response/reason")
                    .and_then(Value::as_str)
                    .or(other)
                    .unwrap_or("unknown")
                    .to_string();
                Some(Err(reason))
            }
        }
    }
}

/// The `data` object of a `postgres_changes` frame.
#[derive(Debug, Deserialize)]
struct PostgresChange {
    #[serde(rename = "type")]
    change_type: String,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
    #[serde(default)]
    errors: Option<Value>,
}

fn row_key(row: &Value) -> Option<String> {
    match row.get(KEY_COLUMN)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decodes the payload of a `postgres_changes` frame into a change event.
///
/// Anything that cannot be turned into a precise row event (malformed data,
/// server-side errors such as oversized rows, a missing primary key) becomes
/// a wildcard so the collection is refetched.
pub fn decode_postgres_change(domain: Domain, payload: &Value) -> ChangeEvent {
    let data = payload.get("data").unwrap_or(payload);
    let change: PostgresChange = match serde_json::from_value(data.clone()) {
        Ok(change) => change,
        Err(e) => {
            warn!("Undecodable {} change, refetching: {}", domain, e);
            return ChangeEvent::wildcard(domain);
        }
    };

    if change.errors.as_ref().is_some_and(|e| !e.is_null()) {
        warn!("{} change carries server errors, refetching", domain);
        return ChangeEvent::wildcard(domain);
    }
    if let Some(table) = &change.table {
        if table != domain.table() {
            warn!("Change for table {} on {} channel, refetching", table, domain);
            return ChangeEvent::wildcard(domain);
        }
    }

    match change.change_type.as_str() {
        "INSERT" | "UPDATE" => {
            let Some(record) = change.record else {
                return ChangeEvent::wildcard(domain);
            };
            let Some(key) = row_key(&record) else {
                return ChangeEvent::wildcard(domain);
            };
            if change.change_type == "INSERT" {
                ChangeEvent::insert(domain, key, record)
            } else {
                ChangeEvent::update(domain, key, record)
            }
        }
        "DELETE" => {
            let Some(old) = change.old_record else {
                return ChangeEvent::wildcard(domain);
            };
            match row_key(&old) {
                Some(key) => ChangeEvent::delete_with_row(domain, key, old),
                None => ChangeEvent::wildcard(domain),
            }
        }
        other => {
            warn!("Unknown change type {} on {}, refetching", other, domain);
            ChangeEvent::wildcard(domain)
        }
    }
}
