//! Tweet-to-Polymarket analysis backend
//!
//! Turns a tweet into ranked, tradeable Polymarket markets: LLM sentiment
//! extraction, market search, LLM relevance ranking, and an HTTP facade for
//! trading and portfolio queries.

pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod ranker;
pub mod sentiment;
pub mod server;
pub mod types;
