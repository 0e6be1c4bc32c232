//! View-side sink for collection updates.

use std::sync::{Arc, Mutex, PoisonError};

use super::Collection;
use crate::errors::SyncErrorKind;

/// Receives collection snapshots and recoverable errors.
///
/// # Design Rules
///
/// - Callbacks must be fast and must not call back into the live collection
///   that invoked them
/// - Errors are informational (banner/toast); the collection stays usable
pub trait CollectionView<T>: Send + Sync {
    fn on_collection_changed(&self, collection: &Collection<T>);

    fn on_error(&self, error: SyncErrorKind);
}

/// No-op view for headless use.
#[derive(Clone, Default)]
pub struct NoOpCollectionView;

impl<T> CollectionView<T> for NoOpCollectionView {
    fn on_collection_changed(&self, _collection: &Collection<T>) {}

    fn on_error(&self, _error: SyncErrorKind) {}
}

/// Mock view for testing - records every callback.
pub struct MockCollectionView<T> {
    snapshots: Arc<Mutex<Vec<Collection<T>>>>,
    errors: Arc<Mutex<Vec<SyncErrorKind>>>,
}

impl<T> Clone for MockCollectionView<T> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
            errors: Arc::clone(&self.errors),
        }
    }
}

impl<T> Default for MockCollectionView<T> {
    fn default() -> Self {
        Self {
            snapshots: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> MockCollectionView<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the most recent snapshot, if any.
    pub fn latest(&self) -> Option<Collection<T>> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Returns how many snapshots were delivered.
    pub fn change_count(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns all reported errors.
    pub fn errors(&self) -> Vec<SyncErrorKind> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: Clone + Send> CollectionView<T> for MockCollectionView<T> {
    fn on_collection_changed(&self, collection: &Collection<T>) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(collection.clone());
    }

    fn on_error(&self, error: SyncErrorKind) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
    }
}
