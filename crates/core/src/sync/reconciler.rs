//! Pure merge of one change event into a collection.
//!
//! `merge` never fails and performs no I/O. When it cannot act it hands the
//! collection back untouched together with an outcome telling the caller
//! whether to ignore the event or escalate to a refetch.

use log::debug;

use super::{decode_record, ChangeEvent, ChangeOperation, Collection, Record};

/// Result of merging one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The collection now reflects the event.
    Applied,
    /// The event referenced a key the collection does not hold. Not an error.
    Skipped { key: String },
    /// The event cannot be merged safely; the caller must refetch.
    Escalate(EscalationReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationReason {
    /// Wildcard event with no identifying payload.
    Wildcard,
    /// Row event without a key or a usable payload.
    Incomplete(String),
}

impl MergeOutcome {
    pub fn needs_refetch(&self) -> bool {
        matches!(self, MergeOutcome::Escalate(_))
    }
}

/// Collection after a merge plus what happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged<T> {
    pub collection: Collection<T>,
    pub outcome: MergeOutcome,
}

impl<T> Merged<T> {
    fn new(collection: Collection<T>, outcome: MergeOutcome) -> Self {
        Self {
            collection,
            outcome,
        }
    }
}

/// Merges `event` into `collection`.
///
/// Events for another domain are treated as incomplete and escalate.
pub fn merge<T: Record>(mut collection: Collection<T>, event: &ChangeEvent) -> Merged<T> {
    if event.domain != T::DOMAIN {
        return Merged::new(
            collection,
            MergeOutcome::Escalate(EscalationReason::Incomplete(format!(
                "event for {} delivered to {} collection",
                event.domain,
                T::DOMAIN
            ))),
        );
    }

    if event.operation == ChangeOperation::Wildcard {
        return Merged::new(collection, MergeOutcome::Escalate(EscalationReason::Wildcard));
    }

    let Some(key) = event.affected_key.as_deref() else {
        return Merged::new(
            collection,
            MergeOutcome::Escalate(EscalationReason::Incomplete(format!(
                "{:?} event without affected key",
                event.operation
            ))),
        );
    };

    match event.operation {
        ChangeOperation::Delete => {
            let outcome = match collection.remove(key) {
                Some(_) => MergeOutcome::Applied,
                None => skipped(event, key),
            };
            Merged::new(collection, outcome)
        }
        ChangeOperation::Insert | ChangeOperation::Update => {
            let record = match decode_payload::<T>(event, key) {
                Ok(record) => record,
                Err(reason) => {
                    return Merged::new(
                        collection,
                        MergeOutcome::Escalate(EscalationReason::Incomplete(reason)),
                    )
                }
            };
            let outcome = if event.operation == ChangeOperation::Insert {
                collection.upsert(record);
                MergeOutcome::Applied
            } else if collection.replace(record) {
                MergeOutcome::Applied
            } else {
                skipped(event, key)
            };
            Merged::new(collection, outcome)
        }
        ChangeOperation::Wildcard => {
            Merged::new(collection, MergeOutcome::Escalate(EscalationReason::Wildcard))
        }
    }
}

fn decode_payload<T: Record>(event: &ChangeEvent, key: &str) -> Result<T, String> {
    let payload = event
        .payload
        .as_ref()
        .ok_or_else(|| format!("{:?} event for {} without payload", event.operation, key))?;
    let record: T = decode_record(payload).map_err(|e| e.to_string())?;
    if record.key() != key {
        return Err(format!(
            "payload key {} does not match affected key {}",
            record.key(),
            key
        ));
    }
    Ok(record)
}

fn skipped(event: &ChangeEvent, key: &str) -> MergeOutcome {
    debug!(
        "{:?} on {} for unknown key {}, ignoring",
        event.operation, event.domain, key
    );
    MergeOutcome::Skipped {
        key: key.to_string(),
    }
}
