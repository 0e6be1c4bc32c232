//! Schedule module - appointments shown in the calendar views.

mod schedule_model;

pub use schedule_model::{Appointment, AppointmentStatus};
