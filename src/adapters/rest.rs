use crate::config::toml_config::StoreConfig;
use crate::domain::model::{Filter, Record};
use crate::domain::ports::RecordStore;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;

/// Read-only client for a PostgREST-style endpoint of the hosted store.
#[derive(Debug, Clone)]
pub struct RestRecordStore {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl RestRecordStore {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: None,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        let store = Self::new(config.endpoint.clone(), config.api_key.clone());
        match config.timeout_seconds {
            Some(seconds) => store.with_timeout(Duration::from_secs(seconds)),
            None => store,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn request(&self, method: Method, table: &str, filter: &Filter) -> RequestBuilder {
        let url = format!("{}/{}", self.endpoint, table);
        let mut request = self
            .client
            .request(method, &url)
            .query(&filter.to_query_pairs())
            .header("Accept", "application/json");

        // 添加 API 金鑰
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        // 設定超時
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        request
    }

    /// Any non-success status is a transport failure. PostgREST answers a filter with no
    /// matching row with `200 []`; a 404 only means the table or route is missing, which
    /// must never be mistaken for absence.
    fn check_status(table: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(SyncError::transport(format!(
            "{} returned {}",
            table,
            status.as_u16()
        )))
    }
}

/// Parses the total from a `Content-Range` value such as `0-24/57` or `*/0`.
pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Record>> {
        tracing::debug!("Querying {}/{} with {:?}", self.endpoint, table, filter);

        let response = self.request(Method::GET, table, filter).send().await?;
        let response = Self::check_status(table, response)?;

        let body: serde_json::Value = response.json().await?;
        match body {
            serde_json::Value::Array(items) => {
                Ok(items.into_iter().filter_map(Record::from_json).collect())
            }
            _ => Err(SyncError::transport(format!(
                "{} returned a non-array payload",
                table
            ))),
        }
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let response = self
            .request(Method::HEAD, table, filter)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::check_status(table, response)?;

        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                SyncError::transport(format!("{} count response had no Content-Range", table))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("0-24/57"), Some(57));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let store = RestRecordStore::new("https://db.example.com/rest/v1/", None);
        assert_eq!(store.endpoint, "https://db.example.com/rest/v1");
    }
}
