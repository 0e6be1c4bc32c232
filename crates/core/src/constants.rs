/// Debounce window for collapsing refetch triggers of one domain
pub const DEFAULT_REFETCH_DEBOUNCE_MS: u64 = 300;

/// Backend table for client records
pub const CLIENTS_TABLE: &str = "clients";

/// Backend table for scheduled appointments
pub const SCHEDULE_TABLE: &str = "schedule";

/// Backend table for chat messages
pub const CHAT_MESSAGES_TABLE: &str = "chat_messages";

/// Default database schema exposed by the backend
pub const DEFAULT_SCHEMA: &str = "public";

/// Days ahead counted as "upcoming" on the dashboard
pub const UPCOMING_WINDOW_DAYS: i64 = 7;
