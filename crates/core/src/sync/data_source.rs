//! Data-access contract the sync layer depends on.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{Domain, FeedSignal, RowFilter};
use crate::errors::Result;

/// Callback invoked by a data source for every signal on a channel.
pub type FeedCallback = Arc<dyn Fn(FeedSignal) + Send + Sync>;

/// Opaque handle for one change-feed channel opened by a data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedHandle(String);

impl FeedHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote source of truth: full fetches plus a push change feed.
///
/// Implementations translate their backend's wire format into JSON rows and
/// [`ChangeEvent`](super::ChangeEvent)s. Delivery is best effort.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetches every row of `domain` matching `filter`.
    async fn fetch_all(&self, domain: Domain, filter: &RowFilter) -> Result<Vec<Value>>;

    /// Opens a channel delivering changes of `domain` to `callback`.
    async fn subscribe_changes(
        &self,
        domain: Domain,
        filter: &RowFilter,
        callback: FeedCallback,
    ) -> Result<FeedHandle>;

    /// Closes a channel.
    ///
    /// Must not block and must ignore unknown or already-closed handles.
    fn unsubscribe(&self, handle: &FeedHandle);
}
