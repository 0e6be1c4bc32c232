//! Dashboard metrics derived from synced collections.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::{Client, ClientStatus};
use crate::constants::UPCOMING_WINDOW_DAYS;
use crate::schedule::{Appointment, AppointmentStatus};
use crate::sync::Collection;

/// Headline numbers shown on the marketing dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_clients: usize,
    pub leads: usize,
    pub active_clients: usize,
    pub inactive_clients: usize,
    /// Share of non-lead clients among all clients, 0.0 when empty.
    pub conversion_rate: f64,
    /// Client count per acquisition source; unknown sources under "unknown".
    pub clients_by_source: BTreeMap<String, usize>,
    pub upcoming_appointments: usize,
    pub completed_appointments: usize,
    pub cancelled_appointments: usize,
}

impl DashboardStats {
    /// Computes the stats as of `now`.
    ///
    /// Pure: recompute whenever either collection changes.
    pub fn compute(
        clients: &Collection<Client>,
        schedule: &Collection<Appointment>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut stats = DashboardStats {
            total_clients: clients.len(),
            ..Default::default()
        };

        for client in clients {
            match client.status {
                ClientStatus::Lead => stats.leads += 1,
                ClientStatus::Active => stats.active_clients += 1,
                ClientStatus::Inactive => stats.inactive_clients += 1,
            }
            let source = client
                .source
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("unknown");
            *stats.clients_by_source.entry(source.to_string()).or_default() += 1;
        }
        if stats.total_clients > 0 {
            let converted = stats.total_clients - stats.leads;
            stats.conversion_rate = converted as f64 / stats.total_clients as f64;
        }

        let until = now + Duration::days(UPCOMING_WINDOW_DAYS);
        for appointment in schedule {
            match appointment.status {
                AppointmentStatus::Completed => stats.completed_appointments += 1,
                AppointmentStatus::Cancelled => stats.cancelled_appointments += 1,
                AppointmentStatus::Scheduled if appointment.is_upcoming(now, until) => {
                    stats.upcoming_appointments += 1
                }
                AppointmentStatus::Scheduled => {}
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn client(id: &str, status: ClientStatus, source: Option<&str>) -> Client {
        Client {
            id: id.to_string(),
            name: format!("Client {}", id),
            email: None,
            phone: None,
            status,
            source: source.map(str::to_string),
            custom_fields: Default::default(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn appointment(id: &str, day: u32, status: AppointmentStatus) -> Appointment {
        let starts_at = Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap();
        Appointment {
            id: id.to_string(),
            client_id: None,
            title: "Call".to_string(),
            starts_at,
            ends_at: starts_at + Duration::hours(1),
            status,
            notes: None,
        }
    }

    #[test]
    fn test_empty_collections() {
        let stats = DashboardStats::compute(&Collection::new(), &Collection::new(), Utc::now());
        assert_eq!(stats, DashboardStats::default());
    }

    #[test]
    fn test_client_and_schedule_metrics() {
        let clients = Collection::from_records(vec![
            client("1", ClientStatus::Lead, Some("ads")),
            client("2", ClientStatus::Active, Some("ads")),
            client("3", ClientStatus::Active, Some("referral")),
            client("4", ClientStatus::Inactive, None),
        ]);
        let schedule = Collection::from_records(vec![
            appointment("a1", 2, AppointmentStatus::Scheduled),
            appointment("a2", 5, AppointmentStatus::Scheduled),
            appointment("a3", 20, AppointmentStatus::Scheduled),
            appointment("a4", 1, AppointmentStatus::Completed),
            appointment("a5", 3, AppointmentStatus::Cancelled),
        ]);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let stats = DashboardStats::compute(&clients, &schedule, now);

        assert_eq!(stats.total_clients, 4);
        assert_eq!(stats.leads, 1);
        assert_eq!(stats.active_clients, 2);
        assert_eq!(stats.inactive_clients, 1);
        assert!((stats.conversion_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(stats.clients_by_source.get("ads"), Some(&2));
        assert_eq!(stats.clients_by_source.get("unknown"), Some(&1));
        assert_eq!(stats.upcoming_appointments, 2);
        assert_eq!(stats.completed_appointments, 1);
        assert_eq!(stats.cancelled_appointments, 1);
    }
}
