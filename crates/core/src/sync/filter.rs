//! Row filters narrowing which rows a fetch or a feed covers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Predicate over a row, expressible to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RowFilter {
    #[default]
    All,
    /// `column` equals `value` (compared on the value's text form).
    Eq { column: String, value: String },
}

/// Result of evaluating a filter against a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMatch {
    Match,
    NoMatch,
    /// The row does not carry the filtered column.
    Unknown,
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        RowFilter::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, RowFilter::All)
    }

    /// Evaluates the filter against a JSON row.
    pub fn evaluate(&self, row: &Value) -> FilterMatch {
        match self {
            RowFilter::All => FilterMatch::Match,
            RowFilter::Eq { column, value } => match row.get(column) {
                None => FilterMatch::Unknown,
                Some(cell) => match scalar_text(cell) {
                    Some(text) if text == *value => FilterMatch::Match,
                    _ => FilterMatch::NoMatch,
                },
            },
        }
    }

    /// Renders the filter in PostgREST/Realtime syntax (`column=eq.value`).
    pub fn to_query(&self) -> Option<String> {
        match self {
            RowFilter::All => None,
            RowFilter::Eq { column, value } => Some(format!("{}=eq.{}", column, value)),
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_query() {
            Some(query) => f.write_str(&query),
            None => f.write_str("*"),
        }
    }
}

fn scalar_text(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_matches_everything() {
        assert_eq!(RowFilter::All.evaluate(&json!({})), FilterMatch::Match);
        assert_eq!(RowFilter::All.to_query(), None);
    }

    #[test]
    fn test_eq_compares_text_form() {
        let filter = RowFilter::eq("session_id", "42");
        assert_eq!(filter.evaluate(&json!({ "session_id": 42 })), FilterMatch::Match);
        assert_eq!(filter.evaluate(&json!({ "session_id": "42" })), FilterMatch::Match);
        assert_eq!(filter.evaluate(&json!({ "session_id": "7" })), FilterMatch::NoMatch);
        assert_eq!(filter.evaluate(&json!({ "session_id": null })), FilterMatch::NoMatch);
        assert_eq!(filter.evaluate(&json!({ "id": "m1" })), FilterMatch::Unknown);
    }

    #[test]
    fn test_query_rendering() {
        let filter = RowFilter::eq("session_id", "abc");
        assert_eq!(filter.to_query().as_deref(), Some("session_id=eq.abc"));
        assert_eq!(filter.to_string(), "session_id=eq.abc");
        assert_eq!(RowFilter::All.to_string(), "*");
    }
}
