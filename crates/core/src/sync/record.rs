//! Record trait implemented by every synced domain type.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::Domain;
use crate::errors::{Result, ValidationError};

/// A row of a synced domain.
///
/// Rows arrive as JSON and are decoded and validated once, at the data-access
/// boundary. Nothing past that point handles untyped payloads.
pub trait Record: Clone + Send + Sync + DeserializeOwned + 'static {
    /// Domain the record belongs to.
    const DOMAIN: Domain;

    /// Primary key.
    fn key(&self) -> &str;

    /// Position key for domains kept in ascending order.
    ///
    /// Records returning `None` keep fetch/arrival order.
    fn sequence(&self) -> Option<i64> {
        None
    }

    /// Structural checks beyond what deserialization enforces.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Ok(())
    }
}

/// Decodes and validates one JSON row.
pub fn decode_record<T: Record>(row: &Value) -> Result<T> {
    let record: T = serde_json::from_value(row.clone())?;
    record.validate()?;
    Ok(record)
}

/// Decodes a fetched result set. One bad row fails the whole set.
pub fn decode_rows<T: Record>(rows: &[Value]) -> Result<Vec<T>> {
    rows.iter().map(decode_record).collect()
}
