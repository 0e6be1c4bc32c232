//! ClientDesk Core - real-time sync of CRM collections.
//!
//! This crate keeps in-memory collections (clients, schedule, chat messages)
//! consistent with a hosted backend that pushes row-change notifications.
//! It is backend-agnostic: adapters implement [`sync::DataSource`].

pub mod chat;
pub mod clients;
pub mod constants;
pub mod custom_fields;
pub mod errors;
pub mod schedule;
pub mod settings;
pub mod stats;
pub mod sync;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
