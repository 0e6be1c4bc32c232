//! ClientDesk Supabase - hosted backend adapter.
//!
//! Implements [`clientdesk_core::sync::DataSource`] on top of a Supabase
//! project: full fetches go through PostgREST, row-change notifications
//! arrive over the Realtime websocket (`postgres_changes`).
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clientdesk_core::sync::ChangeFeedSubscriber;
//! use clientdesk_supabase::{SupabaseConfig, SupabaseDataSource};
//!
//! let config = SupabaseConfig::new("https://abc.supabase.co", "anon-key", "public");
//! let source = Arc::new(SupabaseDataSource::new(config)?);
//! let subscriber = ChangeFeedSubscriber::new(source);
//! ```

mod config;
mod error;
mod protocol;
mod realtime;
mod rest;
mod source;

pub use config::SupabaseConfig;
pub use error::{Result, SupabaseError};
pub use protocol::{decode_postgres_change, PhoenixMessage};
pub use realtime::RealtimeClient;
pub use rest::RestClient;
pub use source::SupabaseDataSource;
