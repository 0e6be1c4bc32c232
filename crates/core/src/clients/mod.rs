//! Clients module - the CRM contact list.

mod clients_model;

pub use clients_model::{Client, ClientStatus};
