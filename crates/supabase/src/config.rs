//! Connection settings for a Supabase project.

use std::time::Duration;

use clientdesk_core::settings::BackendSettings;

use crate::error::{Result, SupabaseError};

/// Default timeout for PostgREST requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Interval between Realtime heartbeats.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// Everything needed to reach one Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    /// Anon or service key; sent as `apikey` and bearer token.
    pub api_key: String,
    pub schema: String,
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl SupabaseConfig {
    pub fn new(url: &str, api_key: &str, schema: &str) -> Self {
        Self {
            url: url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            schema: schema.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }

    /// Builds a config from validated backend settings. The API key is required.
    pub fn from_backend(backend: &BackendSettings) -> Result<Self> {
        let api_key = backend
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SupabaseError::invalid_request("backend.apiKey is not configured"))?;
        if backend.url.trim().is_empty() {
            return Err(SupabaseError::invalid_request("backend.url is not configured"));
        }
        Ok(Self::new(&backend.url, api_key, &backend.schema))
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }

    /// Realtime websocket endpoint, with the scheme switched to ws/wss.
    pub fn realtime_url(&self) -> String {
        let base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base,
            urlencoding::encode(&self.api_key)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = SupabaseConfig::new("https://abc.supabase.co/", "anon", "public");
        assert_eq!(config.rest_url(), "https://abc.supabase.co/rest/v1");
        assert_eq!(
            config.realtime_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = SupabaseConfig::new("http://localhost:54321", "k", "public");
        assert!(local.realtime_url().starts_with("ws://localhost:54321/realtime/v1/"));
    }

    #[test]
    fn test_from_backend_requires_key() {
        let mut backend = BackendSettings {
            url: "https://abc.supabase.co".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            SupabaseConfig::from_backend(&backend),
            Err(SupabaseError::InvalidRequest(_))
        ));

        backend.api_key = Some(" anon ".to_string());
        let config = SupabaseConfig::from_backend(&backend).unwrap();
        assert_eq!(config.api_key, "anon");
        assert_eq!(config.schema, "public");
    }
}
