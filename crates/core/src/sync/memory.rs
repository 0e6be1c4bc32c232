//! In-process [`DataSource`] for tests, demos and previews.
//!
//! Rows are plain JSON keyed by their `id` column. Every write is broadcast to
//! all channels of the domain without server-side filtering, like a feed that
//! over-delivers; the subscriber is responsible for narrowing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use super::{
    ChangeEvent, DataSource, Domain, FeedCallback, FeedHandle, FeedSignal, FilterMatch, RowFilter,
};
use crate::errors::{Error, Result};

const KEY_COLUMN: &str = "id";

struct Channel {
    domain: Domain,
    callback: FeedCallback,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<Domain, Vec<Value>>,
    channels: HashMap<String, Channel>,
    fetch_counts: HashMap<Domain, usize>,
    next_channel: u64,
    fail_fetches: bool,
    fail_subscribes: bool,
    fetch_delay: Option<Duration>,
}

/// In-memory backend with a broadcast change feed.
#[derive(Default)]
pub struct MemoryDataSource {
    state: Mutex<MemoryState>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the rows of `domain` without emitting events.
    pub fn seed(&self, domain: Domain, rows: Vec<Value>) {
        self.state().tables.insert(domain, rows);
    }

    /// Current rows of `domain`.
    pub fn rows(&self, domain: Domain) -> Vec<Value> {
        self.state().tables.get(&domain).cloned().unwrap_or_default()
    }

    /// Inserts or replaces a row and emits an INSERT.
    pub fn insert_row(&self, domain: Domain, row: Value) {
        let key = row_key(&row);
        self.upsert(domain, &key, row.clone());
        self.emit(ChangeEvent::insert(domain, key, row));
    }

    /// Replaces a row and emits an UPDATE.
    pub fn update_row(&self, domain: Domain, row: Value) {
        let key = row_key(&row);
        self.upsert(domain, &key, row.clone());
        self.emit(ChangeEvent::update(domain, key, row));
    }

    /// Removes a row and emits a DELETE carrying the old row when known.
    pub fn delete_row(&self, domain: Domain, key: &str) {
        let removed = {
            let mut state = self.state();
            let table = state.tables.entry(domain).or_default();
            let idx = table.iter().position(|r| row_key(r) == key);
            idx.map(|idx| table.remove(idx))
        };
        let event = match removed {
            Some(old) => ChangeEvent::delete_with_row(domain, key, old),
            None => ChangeEvent::delete(domain, key),
        };
        self.emit(event);
    }

    /// Replaces every row of `domain` and emits a single wildcard.
    pub fn bulk_replace(&self, domain: Domain, rows: Vec<Value>) {
        self.seed(domain, rows);
        self.emit(ChangeEvent::wildcard(domain));
    }

    /// Delivers `event` to every channel of its domain.
    pub fn emit(&self, event: ChangeEvent) {
        let callbacks: Vec<FeedCallback> = self
            .state()
            .channels
            .values()
            .filter(|c| c.domain == event.domain)
            .map(|c| c.callback.clone())
            .collect();
        for callback in callbacks {
            callback(FeedSignal::Change(event.clone()));
        }
    }

    /// Closes every channel with a connection-lost signal.
    pub fn drop_connections(&self, reason: &str) {
        let channels: Vec<Channel> = self.state().channels.drain().map(|(_, c)| c).collect();
        for channel in channels {
            (channel.callback)(FeedSignal::ConnectionLost(reason.to_string()));
        }
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.state().fail_fetches = fail;
    }

    pub fn set_fail_subscribes(&self, fail: bool) {
        self.state().fail_subscribes = fail;
    }

    /// Delays every fetch; a very long delay models a fetch that never resolves.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state().fetch_delay = delay;
    }

    /// Number of `fetch_all` calls made for `domain`.
    pub fn fetch_count(&self, domain: Domain) -> usize {
        self.state().fetch_counts.get(&domain).copied().unwrap_or(0)
    }

    pub fn open_channels(&self) -> usize {
        self.state().channels.len()
    }

    fn upsert(&self, domain: Domain, key: &str, row: Value) {
        let mut state = self.state();
        let table = state.tables.entry(domain).or_default();
        match table.iter().position(|r| row_key(r) == key) {
            Some(idx) => table[idx] = row,
            None => table.push(row),
        }
    }
}

fn row_key(row: &Value) -> String {
    match row.get(KEY_COLUMN) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn fetch_all(&self, domain: Domain, filter: &RowFilter) -> Result<Vec<Value>> {
        let (delay, fail) = {
            let mut state = self.state();
            *state.fetch_counts.entry(domain).or_default() += 1;
            (state.fetch_delay, state.fail_fetches)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::FetchFailed(format!("{} is unavailable", domain)));
        }
        Ok(self
            .rows(domain)
            .into_iter()
            .filter(|row| filter.evaluate(row) == FilterMatch::Match)
            .collect())
    }

    async fn subscribe_changes(
        &self,
        domain: Domain,
        _filter: &RowFilter,
        callback: FeedCallback,
    ) -> Result<FeedHandle> {
        let mut state = self.state();
        if state.fail_subscribes {
            return Err(Error::ConnectionLost("change feed unavailable".to_string()));
        }
        state.next_channel += 1;
        let id = format!("memory-{}", state.next_channel);
        state
            .channels
            .insert(id.clone(), Channel { domain, callback });
        debug!("Opened memory channel {} for {}", id, domain);
        Ok(FeedHandle::new(id))
    }

    fn unsubscribe(&self, handle: &FeedHandle) {
        if self.state().channels.remove(handle.as_str()).is_some() {
            debug!("Closed memory channel {}", handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_applies_filter_and_counts() {
        let source = MemoryDataSource::new();
        source.seed(
            Domain::ChatMessages,
            vec![
                json!({ "id": "m1", "session_id": "s1" }),
                json!({ "id": "m2", "session_id": "s2" }),
            ],
        );

        let rows = source
            .fetch_all(Domain::ChatMessages, &RowFilter::eq("session_id", "s2"))
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({ "id": "m2", "session_id": "s2" })]);
        assert_eq!(source.fetch_count(Domain::ChatMessages), 1);
        assert_eq!(source.fetch_count(Domain::Clients), 0);
    }

    #[tokio::test]
    async fn test_injected_fetch_failure() {
        let source = MemoryDataSource::new();
        source.set_fail_fetches(true);
        let err = source
            .fetch_all(Domain::Clients, &RowFilter::All)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FetchFailed(_)));
    }

    #[test]
    fn test_writes_update_table() {
        let source = MemoryDataSource::new();
        source.insert_row(Domain::Clients, json!({ "id": "c1", "name": "Ada" }));
        source.update_row(Domain::Clients, json!({ "id": "c1", "name": "Ada L." }));
        assert_eq!(source.rows(Domain::Clients), vec![json!({ "id": "c1", "name": "Ada L." })]);

        source.delete_row(Domain::Clients, "c1");
        assert!(source.rows(Domain::Clients).is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_handle_is_ignored() {
        let source = MemoryDataSource::new();
        source.unsubscribe(&FeedHandle::new("memory-404"));
        assert_eq!(source.open_channels(), 0);
    }
}
