//! Real-time collection sync.
//!
//! Views hold a [`LiveCollection`] per domain. Change-feed signals are narrowed
//! by the [`ChangeFeedSubscriber`], merged by the pure [`merge`] function, and
//! anything the reconciler cannot merge safely escalates to the
//! [`RefetchCoordinator`], which debounces and serializes full reloads.

mod change_event;
mod collection;
mod data_source;
mod filter;
mod live;
mod memory;
mod reconciler;
mod record;
mod refetch;
mod subscriber;
mod view;

pub use change_event::{ChangeEvent, ChangeOperation, Domain, FeedSignal};
pub use collection::Collection;
pub use data_source::{DataSource, FeedCallback, FeedHandle};
pub use filter::{FilterMatch, RowFilter};
pub use live::{LiveCollection, LoadStatus};
pub use memory::MemoryDataSource;
pub use reconciler::{merge, EscalationReason, MergeOutcome, Merged};
pub use record::{decode_record, decode_rows, Record};
pub use refetch::{RefetchCoordinator, RefetchScheduler, RefetchTarget, TargetId};
pub use subscriber::{ChangeFeedSubscriber, Subscription};
pub use view::{CollectionView, MockCollectionView, NoOpCollectionView};
