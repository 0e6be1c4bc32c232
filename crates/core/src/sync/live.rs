//! Per-view live collection: the glue between a change feed, the reconciler,
//! the refetch coordinator and a view.
//!
//! Lifecycle:
//! 1. `open` registers with the coordinator and subscribes (status `Loading`)
//! 2. `load` performs the initial full fetch (status `Ready`)
//! 3. change events are merged; wildcard or unmergeable events escalate to a
//!    debounced refetch
//! 4. `unmount` (or drop) detaches everything; late events and late fetch
//!    completions are ignored

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use log::{debug, info, warn};

use super::{
    decode_rows, merge, ChangeEvent, ChangeFeedSubscriber, ChangeOperation, Collection,
    CollectionView, DataSource, Domain, FeedSignal, MergeOutcome, Record, RefetchScheduler,
    RefetchTarget, RowFilter, Subscription, TargetId,
};
use crate::errors::{Error, Result, SyncErrorKind};

/// Load state of a live collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No successful fetch yet; events escalate to refetches.
    Loading,
    Ready,
    /// The last refetch failed; the previous collection is still shown.
    Stale,
}

struct LiveState<T> {
    collection: Collection<T>,
    status: LoadStatus,
    /// Fetches started and not yet finished.
    fetches_in_flight: usize,
}

struct LiveInner<T: Record> {
    filter: RowFilter,
    source: Arc<dyn DataSource>,
    scheduler: Arc<dyn RefetchScheduler>,
    view: Arc<dyn CollectionView<T>>,
    state: Mutex<LiveState<T>>,
    mounted: AtomicBool,
}

impl<T: Record> LiveInner<T> {
    fn state(&self) -> MutexGuard<'_, LiveState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn on_signal(&self, signal: FeedSignal) {
        if !self.is_mounted() {
            return;
        }
        match signal {
            FeedSignal::Change(event) => self.apply(event),
            FeedSignal::ConnectionLost(reason) => {
                warn!("Change feed for {} lost: {}", T::DOMAIN, reason);
                self.view.on_error(SyncErrorKind::connection_lost(reason));
            }
        }
    }

    fn apply(&self, event: ChangeEvent) {
        let mut state = self.state();
        if state.status == LoadStatus::Loading {
            drop(state);
            debug!("{} not loaded yet, deferring event to refetch", T::DOMAIN);
            self.scheduler.schedule_refetch(T::DOMAIN);
            return;
        }

        // A fetch in flight may have read its rows before this commit and
        // would overwrite the merge, so a follow-up refetch is required.
        let fetching = state.fetches_in_flight > 0;
        let operation = event.operation;
        let collection = std::mem::take(&mut state.collection);
        let merged = merge(collection, &event);
        state.collection = merged.collection;

        let refetch = match merged.outcome {
            MergeOutcome::Applied => {
                let snapshot = state.collection.clone();
                drop(state);
                self.view.on_collection_changed(&snapshot);
                fetching
            }
            MergeOutcome::Skipped { key } => {
                drop(state);
                // A filtered view misses rows updated into its filter.
                let moved_in = operation == ChangeOperation::Update && !self.filter.is_all();
                if moved_in {
                    debug!(
                        "Update of unknown {} row {} may have entered the filter",
                        T::DOMAIN,
                        key
                    );
                }
                fetching || moved_in
            }
            MergeOutcome::Escalate(reason) => {
                drop(state);
                debug!("Escalating {} event to refetch: {:?}", T::DOMAIN, reason);
                true
            }
        };
        if refetch {
            self.scheduler.schedule_refetch(T::DOMAIN);
        }
    }

    async fn reload(&self) -> Result<usize> {
        if !self.is_mounted() {
            return Ok(0);
        }

        let in_flight = FetchInFlight::start(self);
        let fetched = self
            .source
            .fetch_all(T::DOMAIN, &self.filter)
            .await
            .and_then(|rows| decode_rows::<T>(&rows));

        let mut state = self.state();
        // Cleared under the same lock that installs the rows, so every event
        // merged before this point has already scheduled a follow-up.
        in_flight.finish(&mut state);
        if !self.is_mounted() {
            debug!("{} unmounted during fetch, discarding result", T::DOMAIN);
            return Ok(0);
        }

        match fetched {
            Ok(records) => {
                state.collection = Collection::from_records(records);
                state.status = LoadStatus::Ready;
                let snapshot = state.collection.clone();
                drop(state);
                self.view.on_collection_changed(&snapshot);
                Ok(snapshot.len())
            }
            Err(e) => {
                let err = match e {
                    Error::FetchFailed(msg) => Error::FetchFailed(msg),
                    other => Error::FetchFailed(other.to_string()),
                };
                warn!("Refetch of {} failed, keeping previous data: {}", T::DOMAIN, err);
                if state.status == LoadStatus::Ready {
                    state.status = LoadStatus::Stale;
                }
                drop(state);
                self.view.on_error(SyncErrorKind::from(&err));
                Err(err)
            }
        }
    }
}

/// Marks a fetch as in flight until finished or dropped (cancellation).
struct FetchInFlight<'a, T: Record> {
    inner: &'a LiveInner<T>,
    finished: bool,
}

impl<'a, T: Record> FetchInFlight<'a, T> {
    fn start(inner: &'a LiveInner<T>) -> Self {
        inner.state().fetches_in_flight += 1;
        Self {
            inner,
            finished: false,
        }
    }

    fn finish(mut self, state: &mut LiveState<T>) {
        state.fetches_in_flight = state.fetches_in_flight.saturating_sub(1);
        self.finished = true;
    }
}

impl<T: Record> Drop for FetchInFlight<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.inner.state();
            state.fetches_in_flight = state.fetches_in_flight.saturating_sub(1);
        }
    }
}

#[async_trait]
impl<T: Record> RefetchTarget for LiveInner<T> {
    async fn refetch(&self) -> Result<usize> {
        self.reload().await
    }
}

/// A collection kept in sync with its remote domain for one view.
pub struct LiveCollection<T: Record> {
    inner: Arc<LiveInner<T>>,
    subscriber: ChangeFeedSubscriber,
    subscription: Mutex<Option<Subscription>>,
    target_id: TargetId,
}

impl<T: Record> LiveCollection<T> {
    /// Registers and subscribes without fetching. Status starts as `Loading`.
    pub async fn open(
        subscriber: &ChangeFeedSubscriber,
        scheduler: Arc<dyn RefetchScheduler>,
        filter: RowFilter,
        view: Arc<dyn CollectionView<T>>,
    ) -> Result<Self> {
        let inner = Arc::new(LiveInner {
            filter,
            source: Arc::clone(subscriber.source()),
            scheduler: Arc::clone(&scheduler),
            view,
            state: Mutex::new(LiveState {
                collection: Collection::new(),
                status: LoadStatus::Loading,
                fetches_in_flight: 0,
            }),
            mounted: AtomicBool::new(true),
        });

        let target: Arc<dyn RefetchTarget> = inner.clone();
        let target_id = scheduler.register_target(T::DOMAIN, Arc::downgrade(&target));

        let live = Self {
            inner,
            subscriber: subscriber.clone(),
            subscription: Mutex::new(None),
            target_id,
        };
        // On error `live` is dropped here, which deregisters it.
        live.subscribe().await?;
        info!("Opened live {} collection ({})", T::DOMAIN, live.inner.filter);
        Ok(live)
    }

    /// Opens and performs the initial fetch.
    ///
    /// A failed initial fetch is reported to the view and leaves the
    /// collection mounted in `Loading`; the next event or refresh retries.
    pub async fn mount(
        subscriber: &ChangeFeedSubscriber,
        scheduler: Arc<dyn RefetchScheduler>,
        filter: RowFilter,
        view: Arc<dyn CollectionView<T>>,
    ) -> Result<Self> {
        let live = Self::open(subscriber, scheduler, filter, view).await?;
        if let Err(e) = live.load().await {
            debug!("Initial load of {} failed: {}", T::DOMAIN, e);
        }
        Ok(live)
    }

    /// Performs a full fetch of this collection only.
    pub async fn load(&self) -> Result<usize> {
        self.inner.reload().await
    }

    async fn subscribe(&self) -> Result<()> {
        let weak: Weak<LiveInner<T>> = Arc::downgrade(&self.inner);
        let subscription = self
            .subscriber
            .subscribe(T::DOMAIN, self.inner.filter.clone(), move |signal| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_signal(signal);
                }
            })
            .await?;
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
        Ok(())
    }

    pub fn domain(&self) -> Domain {
        T::DOMAIN
    }

    pub fn filter(&self) -> &RowFilter {
        &self.inner.filter
    }

    pub fn status(&self) -> LoadStatus {
        self.inner.state().status
    }

    pub fn snapshot(&self) -> Collection<T> {
        self.inner.state().collection.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted()
    }

    /// True while the change feed channel is open and attached.
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| s.is_active())
    }

    /// Requests a debounced refetch of this collection's domain.
    pub fn schedule_refetch(&self) {
        self.inner.scheduler.schedule_refetch(T::DOMAIN);
    }

    /// Refetches this collection now (after any in-flight refetch of the
    /// domain) and returns it. Other views of the domain are not touched.
    /// On failure the previous collection is kept.
    pub async fn refetch_now(&self) -> Result<Collection<T>> {
        self.inner
            .scheduler
            .refetch_target(T::DOMAIN, self.target_id)
            .await?;
        Ok(self.snapshot())
    }

    /// Reopens the change feed after `ConnectionLost` and refetches, since
    /// events missed while disconnected are not replayed.
    pub async fn reconnect(&self) -> Result<Collection<T>> {
        if !self.is_mounted() {
            return Err(Error::Subscription(format!(
                "{} collection is unmounted",
                T::DOMAIN
            )));
        }
        self.subscribe().await?;
        info!("Reconnected live {} collection", T::DOMAIN);
        self.refetch_now().await
    }

    /// Detaches the view and releases the subscription. Idempotent.
    pub fn unmount(&self) {
        if !self.inner.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        self.inner
            .scheduler
            .deregister_target(T::DOMAIN, self.target_id);
        info!("Unmounted live {} collection", T::DOMAIN);
    }
}

impl<T: Record> Drop for LiveCollection<T> {
    fn drop(&mut self) {
        self.unmount();
    }
}
