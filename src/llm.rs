//! Cohere chat-completion client
//!
//! Single request/response, text-in text-out. The `ChatClient` trait is the
//! substitution seam: the extractor and ranker take `&dyn ChatClient`, so
//! tests can stub the model without any network access.

use crate::error::{BackendError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// One chat call: the prompt plus its per-call tunables
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Text-in, text-out chat completion
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<String>;
}

/// Cohere `/v1/chat` client
pub struct CohereClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct CohereChatRequest<'a> {
    model: &'a str,
    message: &'a str,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    text: String,
}

impl CohereClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &crate::config::CohereConfig) -> Result<Self> {
        Self::new(&config.base_url, &config.api_key, &config.model)
    }
}

#[async_trait]
impl ChatClient for CohereClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let body = CohereChatRequest {
            model: &self.model,
            message: &request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!(
                "Cohere returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        let text = resp.text().await?;
        tracing::debug!(
            "Cohere raw response: {}",
            text.chars().take(500).collect::<String>()
        );

        let parsed: CohereChatResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::Api(format!("Unexpected chat response shape: {}", e)))?;

        Ok(parsed.text)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Scripted chat stub: pops canned responses in call order.
    /// An `Err` entry simulates an upstream model failure.
    pub struct ScriptedChat {
        responses: Mutex<Vec<Result<String>>>,
    }

    impl ScriptedChat {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }

        /// A stub whose every call fails
        pub fn always_failing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn chat(&self, _request: &ChatRequest) -> Result<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(BackendError::Api("stubbed model failure".to_string()));
            }
            responses.remove(0)
        }
    }
}
