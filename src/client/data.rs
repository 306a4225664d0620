//! Data API client for portfolio queries
//!
//! Position payloads are passed through as opaque JSON: the data-api owns the
//! shape and downstream consumers read it directly.

use crate::error::{BackendError, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub struct DataClient {
    http: Client,
    base_url: String,
}

impl DataClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Open positions for a wallet address
    pub async fn get_positions(&self, user: &str) -> Result<Value> {
        self.fetch("/positions", user).await
    }

    /// Closed (settled) positions for a wallet address
    pub async fn get_closed_positions(&self, user: &str) -> Result<Value> {
        self.fetch("/closed-positions", user).await
    }

    async fn fetch(&self, path: &str, user: &str) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&[("user", user)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!(
                "data-api {} returned {}: {}",
                path, status, text
            )));
        }

        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_positions_pass_through_untouched() {
        let server = MockServer::start().await;
        let body = json!([{
            "asset": "123",
            "conditionId": "0xabc",
            "size": 10.5,
            "custom_upstream_field": {"nested": true}
        }]);
        Mock::given(method("GET"))
            .and(path("/positions"))
            .and(query_param("user", "0xwallet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;

        let client = DataClient::new(&server.uri(), 5).unwrap();
        let positions = client.get_positions("0xwallet").await.unwrap();
        assert_eq!(positions, body);
    }

    #[tokio::test]
    async fn test_closed_positions_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/closed-positions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = DataClient::new(&server.uri(), 5).unwrap();
        let err = client.get_closed_positions("0xwallet").await.unwrap_err();
        assert!(matches!(err, BackendError::Api(_)));
    }
}
