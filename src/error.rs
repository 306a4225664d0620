//! Error types for the backend

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
