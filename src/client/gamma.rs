//! Gamma API client for market discovery
//!
//! Issues exactly one GET against `public-search` per call: no retry, no
//! pagination. The polymorphic response shape (`{events: [...]}`, bare array,
//! or anything else) is resolved here, once, into `SearchOutcome` so the rest
//! of the pipeline never re-checks it.

use crate::error::Result;
use crate::types::MarketRecord;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Gamma API client
pub struct GammaClient {
    http: Client,
    base_url: String,
}

/// Resolved search response
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    /// Recognized shape: a list of event records
    Events(Vec<MarketRecord>),
    /// Unrecognized JSON value, passed through untouched
    Other(Value),
    /// Network failure or non-200 status, as an error payload
    Error(SearchError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub search_query: String,
}

impl SearchOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, SearchOutcome::Error(_))
    }
}

impl GammaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Search for active markets accepting orders.
    ///
    /// Upstream failures come back as `SearchOutcome::Error`, never as `Err`:
    /// the caller distinguishes outcomes, it does not handle exceptions.
    pub async fn search_active_markets(&self, query: &str) -> SearchOutcome {
        let url = format!("{}/public-search", self.base_url);
        tracing::info!("searching markets: q={:?}", query);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("q", query),
                ("active", "true"),
                ("closed", "false"),
                ("acceptingOrders", "true"),
                ("events_status", "active"),
            ])
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                return SearchOutcome::Error(SearchError {
                    error: format!("Network error: {}", e),
                    details: None,
                    search_query: query.to_string(),
                })
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return SearchOutcome::Error(SearchError {
                error: format!("API returned status {}", status.as_u16()),
                details: Some(body),
                search_query: query.to_string(),
            });
        }

        let value: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                return SearchOutcome::Error(SearchError {
                    error: format!("Invalid JSON response: {}", e),
                    details: None,
                    search_query: query.to_string(),
                })
            }
        };

        Self::resolve_shape(value)
    }

    /// Resolve the polymorphic response into a tagged outcome
    fn resolve_shape(value: Value) -> SearchOutcome {
        match value {
            Value::Object(mut obj) => match obj.remove("events") {
                Some(Value::Array(events)) => {
                    SearchOutcome::Events(events.into_iter().map(MarketRecord).collect())
                }
                Some(other) => {
                    // events key present but not an array: keep whole object
                    obj.insert("events".to_string(), other);
                    SearchOutcome::Other(Value::Object(obj))
                }
                None => SearchOutcome::Other(Value::Object(obj)),
            },
            Value::Array(events) => {
                SearchOutcome::Events(events.into_iter().map(MarketRecord).collect())
            }
            other => SearchOutcome::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> GammaClient {
        GammaClient::new(&server.uri(), 5).unwrap()
    }

    #[tokio::test]
    async fn test_search_events_object_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public-search"))
            .and(query_param("q", "Bitcoin"))
            .and(query_param("active", "true"))
            .and(query_param("closed", "false"))
            .and(query_param("acceptingOrders", "true"))
            .and(query_param("events_status", "active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [
                    {"id": "1", "title": "Bitcoin to $100k?"},
                    {"id": "2", "title": "Fed rate hike?"}
                ]
            })))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.search_active_markets("Bitcoin").await;
        match outcome {
            SearchOutcome::Events(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].id(), Some("1"));
            }
            other => panic!("expected events, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_bare_array_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public-search"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "7", "title": "X"}])),
            )
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.search_active_markets("x").await;
        match outcome {
            SearchOutcome::Events(events) => assert_eq!(events.len(), 1),
            other => panic!("expected events, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_unknown_shape_passes_through() {
        let server = MockServer::start().await;
        let body = json!({"pagination": {"total": 0}, "data": null});
        Mock::given(method("GET"))
            .and(path("/public-search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.search_active_markets("x").await;
        match outcome {
            SearchOutcome::Other(value) => assert_eq!(value, body),
            other => panic!("expected raw passthrough, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_http_500_is_error_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/public-search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let outcome = client_for(&server).await.search_active_markets("Fed").await;
        match outcome {
            SearchOutcome::Error(err) => {
                assert!(err.error.contains("500"));
                assert_eq!(err.details.as_deref(), Some("boom"));
                assert_eq!(err.search_query, "Fed");
            }
            other => panic!("expected error payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_network_error_is_error_payload() {
        // Unroutable port: connection refused
        let client = GammaClient::new("http://127.0.0.1:1", 1).unwrap();
        let outcome = client.search_active_markets("q").await;
        assert!(outcome.is_error());
    }

    #[test]
    fn test_resolve_shape_events_key_not_array() {
        let outcome = GammaClient::resolve_shape(json!({"events": "oops"}));
        match outcome {
            SearchOutcome::Other(v) => assert_eq!(v, json!({"events": "oops"})),
            other => panic!("expected raw passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_shape_scalar() {
        let outcome = GammaClient::resolve_shape(json!(42));
        assert!(matches!(outcome, SearchOutcome::Other(_)));
    }
}
