//! Scoped change-feed subscriptions.
//!
//! A [`Subscription`] is released on drop, on explicit `unsubscribe`, or both.
//! Once released, or once its connection is lost, its callback is detached:
//! signals that are still in flight are dropped without reaching the caller.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeOperation, DataSource, Domain, FeedCallback, FeedHandle, FeedSignal,
    FilterMatch, RowFilter,
};
use crate::errors::Result;

/// Opens filtered change-feed channels on a [`DataSource`].
#[derive(Clone)]
pub struct ChangeFeedSubscriber {
    source: Arc<dyn DataSource>,
}

impl ChangeFeedSubscriber {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Opens one channel for `domain` rows matching `filter`.
    ///
    /// Every call opens a new channel; subscribing twice with the same
    /// arguments delivers every event twice.
    pub async fn subscribe<F>(
        &self,
        domain: Domain,
        filter: RowFilter,
        on_event: F,
    ) -> Result<Subscription>
    where
        F: Fn(FeedSignal) + Send + Sync + 'static,
    {
        let channel_id = format!("{}:{}:{}", domain, filter, Uuid::new_v4());
        let active = Arc::new(AtomicBool::new(true));

        let gate = Arc::clone(&active);
        let scope = filter.clone();
        let channel = channel_id.clone();
        let callback: FeedCallback = Arc::new(move |signal| {
            if !gate.load(Ordering::SeqCst) {
                debug!("Dropping signal for detached channel {}", channel);
                return;
            }
            match signal {
                FeedSignal::Change(event) => {
                    if let Some(event) = scope_event(domain, &scope, event) {
                        on_event(FeedSignal::Change(event));
                    }
                }
                FeedSignal::ConnectionLost(reason) => {
                    gate.store(false, Ordering::SeqCst);
                    on_event(FeedSignal::ConnectionLost(reason));
                }
            }
        });

        let handle = self
            .source
            .subscribe_changes(domain, &filter, callback)
            .await?;
        info!("Subscribed channel {} ({})", channel_id, handle);

        Ok(Subscription {
            channel_id,
            domain,
            filter,
            active,
            handle: Mutex::new(Some(handle)),
            source: Arc::clone(&self.source),
        })
    }

    /// Releases `subscription`. Safe to call any number of times.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }
}

/// Narrows a raw feed event to what this channel may deliver.
///
/// Row events whose payload cannot be checked against the filter are turned
/// into a wildcard for the domain, so no unchecked row reaches the caller
/// while the change still triggers a refetch. An UPDATE whose new row falls
/// outside the filter becomes a DELETE of that key: the row may have left it.
fn scope_event(domain: Domain, filter: &RowFilter, event: ChangeEvent) -> Option<ChangeEvent> {
    if event.domain != domain {
        debug!("Dropping {} event on {} channel", event.domain, domain);
        return None;
    }
    if filter.is_all() || event.is_wildcard() {
        return Some(event);
    }
    let verdict = event
        .payload
        .as_ref()
        .map_or(FilterMatch::Unknown, |row| filter.evaluate(row));
    match verdict {
        FilterMatch::Match => Some(event),
        FilterMatch::NoMatch if event.operation == ChangeOperation::Update => {
            match event.affected_key {
                Some(key) => {
                    debug!("{} row {} left {}, removing it", domain, key, filter);
                    Some(ChangeEvent::delete(domain, key))
                }
                None => Some(ChangeEvent::wildcard(domain)),
            }
        }
        FilterMatch::NoMatch => None,
        FilterMatch::Unknown => {
            debug!(
                "{:?} on {} cannot be checked against {}, widening to wildcard",
                event.operation, domain, filter
            );
            Some(ChangeEvent::wildcard(domain))
        }
    }
}

/// One open change-feed channel, owned by the view that created it.
pub struct Subscription {
    channel_id: String,
    domain: Domain,
    filter: RowFilter,
    active: Arc<AtomicBool>,
    handle: Mutex<Option<FeedHandle>>,
    source: Arc<dyn DataSource>,
}

impl Subscription {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn filter(&self) -> &RowFilter {
        &self.filter
    }

    /// False once released or once the connection was lost.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Detaches the callback and closes the channel. Idempotent.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::SeqCst);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            self.source.unsubscribe(&handle);
            info!("Unsubscribed channel {}", self.channel_id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel_id", &self.channel_id)
            .field("domain", &self.domain)
            .field("filter", &self.filter)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryDataSource;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<FeedSignal>>>, impl Fn(FeedSignal) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |signal| sink.lock().unwrap().push(signal))
    }

    #[tokio::test]
    async fn test_filtered_channel_drops_non_matching_rows() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());
        let (seen, on_event) = recorder();

        let _sub = subscriber
            .subscribe(Domain::ChatMessages, RowFilter::eq("session_id", "s1"), on_event)
            .await
            .unwrap();

        source.insert_row(Domain::ChatMessages, json!({ "id": "m1", "session_id": "s2" }));
        source.insert_row(Domain::ChatMessages, json!({ "id": "m2", "session_id": "s1" }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            FeedSignal::Change(event) if event.affected_key.as_deref() == Some("m2")
        ));
    }

    #[tokio::test]
    async fn test_update_leaving_filter_becomes_delete() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());
        let (seen, on_event) = recorder();

        let _sub = subscriber
            .subscribe(Domain::ChatMessages, RowFilter::eq("session_id", "s1"), on_event)
            .await
            .unwrap();
        source.update_row(Domain::ChatMessages, json!({ "id": "m1", "session_id": "s2" }));
        // Inserts outside the filter are still dropped.
        source.insert_row(Domain::ChatMessages, json!({ "id": "m2", "session_id": "s2" }));

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[FeedSignal::Change(ChangeEvent::delete(Domain::ChatMessages, "m1"))]
        );
    }

    #[tokio::test]
    async fn test_unverifiable_delete_widens_to_wildcard() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());
        let (seen, on_event) = recorder();

        let _sub = subscriber
            .subscribe(Domain::ChatMessages, RowFilter::eq("session_id", "s1"), on_event)
            .await
            .unwrap();
        source.emit(ChangeEvent::delete(Domain::ChatMessages, "m9"));

        let seen = seen.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[FeedSignal::Change(ChangeEvent::wildcard(Domain::ChatMessages))]
        );
    }

    #[tokio::test]
    async fn test_duplicate_subscriptions_open_independent_channels() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());
        let (seen, on_event) = recorder();
        let on_event = Arc::new(on_event);

        let first = {
            let on_event = Arc::clone(&on_event);
            subscriber
                .subscribe(Domain::Clients, RowFilter::All, move |s| (*on_event)(s))
                .await
                .unwrap()
        };
        let second = {
            let on_event = Arc::clone(&on_event);
            subscriber
                .subscribe(Domain::Clients, RowFilter::All, move |s| (*on_event)(s))
                .await
                .unwrap()
        };

        assert_ne!(first.channel_id(), second.channel_id());
        assert_eq!(source.open_channels(), 2);

        source.emit(ChangeEvent::wildcard(Domain::Clients));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_detaches() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());
        let (seen, on_event) = recorder();

        let sub = subscriber
            .subscribe(Domain::Clients, RowFilter::All, on_event)
            .await
            .unwrap();
        subscriber.unsubscribe(&sub);
        subscriber.unsubscribe(&sub);

        assert!(!sub.is_active());
        assert_eq!(source.open_channels(), 0);
        source.emit(ChangeEvent::wildcard(Domain::Clients));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_after_connection_lost_does_not_error() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());
        let (seen, on_event) = recorder();

        let sub = subscriber
            .subscribe(Domain::Schedule, RowFilter::All, on_event)
            .await
            .unwrap();
        source.drop_connections("socket closed");

        assert!(!sub.is_active());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[FeedSignal::ConnectionLost("socket closed".to_string())]
        );
        sub.unsubscribe();
        drop(sub);
    }

    #[tokio::test]
    async fn test_drop_releases_channel() {
        let source = Arc::new(MemoryDataSource::new());
        let subscriber = ChangeFeedSubscriber::new(source.clone());

        let sub = subscriber
            .subscribe(Domain::Clients, RowFilter::All, |_| {})
            .await
            .unwrap();
        assert_eq!(source.open_channels(), 1);
        drop(sub);
        assert_eq!(source.open_channels(), 0);
    }
}
