//! Debounced, per-domain full refetches.
//!
//! Each domain has one lane. A trigger arms the lane; further triggers inside
//! the debounce window collapse into it. When the window expires the lane
//! refetches every registered target of the domain. A trigger arriving while
//! that refetch is in flight queues exactly one follow-up run, so the final
//! state after a burst of writes is always fetched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, error, info, warn};

use super::Domain;
use crate::errors::{Error, Result};
use crate::settings::Settings;

/// Something that can reload itself from the remote source.
#[async_trait]
pub trait RefetchTarget: Send + Sync {
    /// Reloads and returns the number of records now held.
    ///
    /// On failure the target keeps its previous state and reports the error
    /// to its own view before returning it.
    async fn refetch(&self) -> Result<usize>;
}

/// Identifier returned by [`RefetchScheduler::register_target`].
pub type TargetId = u64;

/// Refetch entry points used by live collections.
#[async_trait]
pub trait RefetchScheduler: Send + Sync {
    /// Requests a debounced refetch of `domain`. Returns immediately.
    fn schedule_refetch(&self, domain: Domain);

    /// Refetches `domain` now, after any refetch already in flight.
    async fn refetch_now(&self, domain: Domain) -> Result<usize>;

    /// Refetches one registered target now, serialized like `refetch_now`.
    /// Only that target's own result is returned.
    async fn refetch_target(&self, domain: Domain, id: TargetId) -> Result<usize>;

    fn register_target(&self, domain: Domain, target: Weak<dyn RefetchTarget>) -> TargetId;

    fn deregister_target(&self, domain: Domain, id: TargetId);
}

#[derive(Default)]
struct Lane {
    /// A debounce timer is pending.
    armed: bool,
    /// A scheduled refetch is executing.
    running: bool,
    /// A trigger arrived while running.
    rerun: bool,
    /// Serializes every fetch of the domain, scheduled or immediate.
    fetch_lock: Arc<tokio::sync::Mutex<()>>,
    targets: Vec<(TargetId, Weak<dyn RefetchTarget>)>,
}

struct CoordinatorInner {
    debounce: Duration,
    lanes: Mutex<HashMap<Domain, Lane>>,
    next_target_id: AtomicU64,
}

/// Debounces and serializes full refetches per domain.
#[derive(Clone)]
pub struct RefetchCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl RefetchCoordinator {
    pub fn new(debounce: Duration) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                debounce,
                lanes: Mutex::new(HashMap::new()),
                next_target_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.refetch_debounce())
    }

    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Number of live targets registered for `domain`.
    pub fn target_count(&self, domain: Domain) -> usize {
        self.inner.with_lane(domain, |lane| {
            lane.targets
                .iter()
                .filter(|(_, t)| t.strong_count() > 0)
                .count()
        })
    }

    /// True while a refetch of `domain` is pending or executing.
    pub fn is_busy(&self, domain: Domain) -> bool {
        self.inner
            .with_lane(domain, |lane| lane.armed || lane.running || lane.rerun)
    }
}

impl CoordinatorInner {
    fn with_lane<R>(&self, domain: Domain, f: impl FnOnce(&mut Lane) -> R) -> R {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        f(lanes.entry(domain).or_default())
    }

    async fn run_lane(self: Arc<Self>, domain: Domain) {
        loop {
            tokio::time::sleep(self.debounce).await;
            self.with_lane(domain, |lane| {
                lane.armed = false;
                lane.running = true;
            });

            if let Err(e) = self.refetch_targets(domain).await {
                warn!("Scheduled refetch of {} failed: {}", domain, e);
            }

            let again = self.with_lane(domain, |lane| {
                lane.running = false;
                if lane.rerun {
                    lane.rerun = false;
                    lane.armed = true;
                    true
                } else {
                    false
                }
            });
            if !again {
                break;
            }
            debug!("Running queued refetch of {}", domain);
        }
    }

    async fn refetch_targets(&self, domain: Domain) -> Result<usize> {
        let (fetch_lock, targets) = self.with_lane(domain, |lane| {
            lane.targets.retain(|(_, t)| t.strong_count() > 0);
            let targets: Vec<Arc<dyn RefetchTarget>> =
                lane.targets.iter().filter_map(|(_, t)| t.upgrade()).collect();
            (Arc::clone(&lane.fetch_lock), targets)
        });
        let _serial = fetch_lock.lock().await;

        if targets.is_empty() {
            debug!("No targets registered for {}, skipping refetch", domain);
            return Ok(0);
        }

        info!("Refetching {} ({} target(s))", domain, targets.len());
        let results = join_all(targets.iter().map(|t| t.refetch())).await;

        let mut total = 0;
        let mut first_error: Option<Error> = None;
        for result in results {
            match result {
                Ok(count) => total += count,
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }

    async fn refetch_one(&self, domain: Domain, id: TargetId) -> Result<usize> {
        let (fetch_lock, target) = self.with_lane(domain, |lane| {
            let target = lane
                .targets
                .iter()
                .find(|(tid, _)| *tid == id)
                .and_then(|(_, t)| t.upgrade());
            (Arc::clone(&lane.fetch_lock), target)
        });
        let Some(target) = target else {
            debug!("Target {} of {} is gone, skipping refetch", id, domain);
            return Ok(0);
        };
        let _serial = fetch_lock.lock().await;
        target.refetch().await
    }
}

#[async_trait]
impl RefetchScheduler for RefetchCoordinator {
    fn schedule_refetch(&self, domain: Domain) {
        let spawn = self.inner.with_lane(domain, |lane| {
            if lane.running {
                lane.rerun = true;
                debug!("Refetch of {} in flight, queued another", domain);
                false
            } else if lane.armed {
                debug!("Refetch of {} already pending, collapsed", domain);
                false
            } else {
                lane.armed = true;
                true
            }
        });
        if !spawn {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(Arc::clone(&self.inner).run_lane(domain));
            }
            Err(e) => {
                error!("Cannot schedule refetch of {} outside a runtime: {}", domain, e);
                self.inner.with_lane(domain, |lane| lane.armed = false);
            }
        }
    }

    async fn refetch_now(&self, domain: Domain) -> Result<usize> {
        self.inner.refetch_targets(domain).await
    }

    async fn refetch_target(&self, domain: Domain, id: TargetId) -> Result<usize> {
        self.inner.refetch_one(domain, id).await
    }

    fn register_target(&self, domain: Domain, target: Weak<dyn RefetchTarget>) -> TargetId {
        let id = self.inner.next_target_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .with_lane(domain, |lane| lane.targets.push((id, target)));
        id
    }

    fn deregister_target(&self, domain: Domain, id: TargetId) {
        self.inner
            .with_lane(domain, |lane| lane.targets.retain(|(tid, _)| *tid != id));
    }
}
