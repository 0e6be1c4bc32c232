//! Settings domain models.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_REFETCH_DEBOUNCE_MS, DEFAULT_SCHEMA};
use crate::errors::{Error, Result};

/// Environment variable overriding the backend url.
pub const API_URL_ENV: &str = "CLIENTDESK_API_URL";

/// Environment variable overriding the backend api key.
pub const API_KEY_ENV: &str = "CLIENTDESK_API_KEY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Connection details of the hosted backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub schema: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

/// Application settings, loaded once at start and saved at stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: Theme,
    pub refetch_debounce_ms: u64,
    pub backend: BackendSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            refetch_debounce_ms: DEFAULT_REFETCH_DEBOUNCE_MS,
            backend: BackendSettings::default(),
        }
    }
}

/// Partial update of [`Settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub theme: Option<Theme>,
    pub refetch_debounce_ms: Option<u64>,
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
}

impl Settings {
    pub fn refetch_debounce(&self) -> Duration {
        Duration::from_millis(self.refetch_debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refetch_debounce_ms == 0 {
            return Err(Error::InvalidConfigValue(
                "refetchDebounceMs must be greater than zero".to_string(),
            ));
        }
        if self.backend.schema.trim().is_empty() {
            return Err(Error::InvalidConfigValue(
                "backend.schema must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that a backend is configured, as needed before connecting.
    pub fn require_backend(&self) -> Result<&BackendSettings> {
        if self.backend.url.trim().is_empty() {
            return Err(Error::InvalidConfigValue(
                "backend.url is not configured".to_string(),
            ));
        }
        Ok(&self.backend)
    }

    /// Applies a partial update and validates the result.
    pub fn apply(&mut self, update: SettingsUpdate) -> Result<()> {
        let mut next = self.clone();
        if let Some(theme) = update.theme {
            next.theme = theme;
        }
        if let Some(ms) = update.refetch_debounce_ms {
            next.refetch_debounce_ms = ms;
        }
        if let Some(url) = update.backend_url {
            next.backend.url = normalize_url(&url);
        }
        if let Some(key) = update.api_key {
            next.backend.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Applies `CLIENTDESK_API_URL` / `CLIENTDESK_API_KEY` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`; blank values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(url) = read(API_URL_ENV) {
            self.backend.url = normalize_url(&url);
        }
        if let Some(key) = read(API_KEY_ENV) {
            self.backend.api_key = Some(key);
        }
        self
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.refetch_debounce(), Duration::from_millis(300));
        assert!(settings.require_backend().is_err());
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "theme": "dark" }"#).unwrap();
        assert_eq!(settings.theme, Theme::Dark);
        assert_eq!(settings.refetch_debounce_ms, DEFAULT_REFETCH_DEBOUNCE_MS);
        assert_eq!(settings.backend.schema, "public");
    }

    #[test]
    fn test_apply_rejects_zero_debounce_and_keeps_previous() {
        let mut settings = Settings::default();
        let err = settings
            .apply(SettingsUpdate {
                theme: Some(Theme::Light),
                refetch_debounce_ms: Some(0),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, Error::InvalidConfigValue(_)));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_apply_normalizes_url() {
        let mut settings = Settings::default();
        settings
            .apply(SettingsUpdate {
                backend_url: Some(" https://demo.supabase.co/ ".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.backend.url, "https://demo.supabase.co");
    }

    #[test]
    fn test_overrides_ignore_blank_values() {
        let settings = Settings::default().with_overrides(|name| match name {
            API_URL_ENV => Some("https://env.example.com/".to_string()),
            API_KEY_ENV => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(settings.backend.url, "https://env.example.com");
        assert_eq!(settings.backend.api_key, None);
    }
}
