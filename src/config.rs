//! Configuration management

use crate::error::{BackendError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cohere: CohereConfig,
    pub polymarket: PolymarketConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CohereConfig {
    /// Cohere API key
    pub api_key: String,
    /// Chat model name
    #[serde(default = "default_cohere_model")]
    pub model: String,
    /// Chat API endpoint
    #[serde(default = "default_cohere_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolymarketConfig {
    /// Gamma API endpoint (market search)
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    /// CLOB API endpoint (orders, prices)
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    /// Data API endpoint (positions)
    #[serde(default = "default_data_api_url")]
    pub data_api_url: String,
    /// Private key for signing (hex, without 0x prefix)
    pub private_key: Option<String>,
    /// Funder address (for proxy/Magic wallets)
    pub funder_address: Option<String>,
    /// Chain ID (137 for Polygon mainnet)
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Signature type (0=EOA, 1=Magic, 2=Proxy)
    #[serde(default = "default_signature_type")]
    pub signature_type: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum markets considered per search
    pub max_markets_to_fetch: usize,
    /// Default number of ranked markets returned
    pub top_markets_count: usize,
    /// Total request timeout for the search endpoint, in seconds
    pub request_timeout_secs: u64,
    /// Delay between per-market ranking calls, in milliseconds
    pub rate_limit_delay_ms: u64,
    /// Max tokens for sentiment extraction prompts
    pub sentiment_max_tokens: u32,
    /// Temperature for sentiment extraction prompts
    pub sentiment_temperature: f64,
    /// Max tokens for relevance scoring prompts
    pub relevance_max_tokens: u32,
    /// Temperature for relevance scoring prompts
    pub relevance_temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP facade bind address
    pub bind_addr: String,
}

fn default_cohere_model() -> String {
    "command-r-plus".to_string()
}

fn default_cohere_url() -> String {
    "https://api.cohere.ai".to_string()
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_data_api_url() -> String {
    "https://data-api.polymarket.com".to_string()
}

fn default_chain_id() -> u64 {
    137
}

fn default_signature_type() -> u8 {
    1
}

impl Config {
    /// Load configuration from file, with environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path.as_ref().to_string_lossy()))
            .add_source(config::Environment::with_prefix("POLYTWEET").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("POLYTWEET").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations, falling back to the environment
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = ["config.toml", "~/.config/polytweet-backend/config.toml"];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        Self::from_env()
    }

    /// Validate required settings at startup, before any request is served
    pub fn validate(&self) -> Result<()> {
        if self.cohere.api_key.is_empty() || self.cohere.api_key == "your_cohere_api_key_here" {
            return Err(BackendError::Config(
                "cohere.api_key must be set (POLYTWEET__COHERE__API_KEY)".to_string(),
            ));
        }
        if self.pipeline.top_markets_count < 1 || self.pipeline.top_markets_count > 10 {
            return Err(BackendError::Config(
                "pipeline.top_markets_count must be between 1 and 10".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_markets_to_fetch: 50,
            top_markets_count: 5,
            request_timeout_secs: 30,
            rate_limit_delay_ms: 100,
            sentiment_max_tokens: 50,
            sentiment_temperature: 0.3,
            relevance_max_tokens: 200,
            relevance_temperature: 0.2,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}
