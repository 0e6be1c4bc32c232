//! [`DataSource`] backed by a Supabase project.

use async_trait::async_trait;
use log::warn;
use serde_json::Value;

use clientdesk_core::settings::Settings;
use clientdesk_core::sync::{DataSource, Domain, FeedCallback, FeedHandle, RowFilter};

use crate::config::SupabaseConfig;
use crate::error::Result;
use crate::realtime::RealtimeClient;
use crate::rest::RestClient;

/// PostgREST for full fetches, Realtime for the change feed.
pub struct SupabaseDataSource {
    rest: RestClient,
    realtime: RealtimeClient,
}

impl SupabaseDataSource {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        Ok(Self {
            rest: RestClient::new(&config)?,
            realtime: RealtimeClient::new(config),
        })
    }

    /// Builds a source from app settings (after env overrides).
    pub fn from_settings(settings: &Settings) -> clientdesk_core::Result<Self> {
        let backend = settings.require_backend()?;
        let config = SupabaseConfig::from_backend(backend)?;
        Ok(Self::new(config)?)
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }
}

#[async_trait]
impl DataSource for SupabaseDataSource {
    async fn fetch_all(
        &self,
        domain: Domain,
        filter: &RowFilter,
    ) -> clientdesk_core::Result<Vec<Value>> {
        self.rest
            .select_all(domain.table(), filter)
            .await
            .map_err(|e| {
                warn!("Fetch of {} ({}) failed: {}", domain, filter, e);
                clientdesk_core::Error::FetchFailed(e.to_string())
            })
    }

    async fn subscribe_changes(
        &self,
        domain: Domain,
        filter: &RowFilter,
        callback: FeedCallback,
    ) -> clientdesk_core::Result<FeedHandle> {
        let topic = self.realtime.join(domain, filter, callback).await?;
        Ok(FeedHandle::new(topic))
    }

    fn unsubscribe(&self, handle: &FeedHandle) {
        self.realtime.leave(handle.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clientdesk_core::settings::BackendSettings;

    #[test]
    fn test_from_settings_requires_backend() {
        let settings = Settings::default();
        assert!(matches!(
            SupabaseDataSource::from_settings(&settings),
            Err(clientdesk_core::Error::InvalidConfigValue(_))
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            backend: BackendSettings {
                url: "https://abc.supabase.co".to_string(),
                api_key: Some("anon".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let source = SupabaseDataSource::from_settings(&settings).unwrap();
        assert!(!source.realtime().is_connected());
    }
}
