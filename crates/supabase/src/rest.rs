//! PostgREST client used for full fetches.

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;

use clientdesk_core::sync::RowFilter;

use crate::config::SupabaseConfig;
use crate::error::{Result, SupabaseError};

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

/// Thin client over the project's REST endpoint.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    schema: String,
}

impl RestClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.rest_url(),
            api_key: config.api_key.clone(),
            schema: config.schema.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| SupabaseError::invalid_request("Invalid API key format"))?;
        headers.insert("apikey", key);

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| SupabaseError::invalid_request("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, bearer);

        let profile = HeaderValue::from_str(&self.schema)
            .map_err(|_| SupabaseError::invalid_request("Invalid schema name"))?;
        headers.insert("Accept-Profile", profile);

        Ok(headers)
    }

    /// Builds the select URL for `table` narrowed by `filter`.
    pub fn select_url(&self, table: &str, filter: &RowFilter) -> String {
        let mut url = format!("{}/{}?select=*", self.base_url, table);
        if let RowFilter::Eq { column, value } = filter {
            url.push_str(&format!(
                "&{}=eq.{}",
                urlencoding::encode(column),
                urlencoding::encode(value)
            ));
        }
        url
    }

    /// Fetches every row of `table` matching `filter`.
    ///
    /// GET /rest/v1/{table}?select=*[&column=eq.value]
    pub async fn select_all(&self, table: &str, filter: &RowFilter) -> Result<Vec<Value>> {
        let url = self.select_url(table, filter);
        debug!("[Supabase] select {}", url);

        let response = self.client.get(&url).headers(self.headers()?).send().await?;
        Self::parse_response(response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<PostgrestError>(&body) {
                let message = match error.code {
                    Some(code) => format!("{}: {}", code, error.message),
                    None => error.message,
                };
                return Err(SupabaseError::api(status.as_u16(), message));
            }
            return Err(SupabaseError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to deserialize PostgREST response: {}", e);
            SupabaseError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }
}
