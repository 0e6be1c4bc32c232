//! Stats module - marketing dashboard metrics.

mod stats_model;

pub use stats_model::DashboardStats;
