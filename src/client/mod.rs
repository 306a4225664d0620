//! Polymarket API clients
//!
//! Three distinct upstream services:
//! - Gamma API: market discovery (public, unauthenticated)
//! - CLOB API: prices, balances, and order placement (signed)
//! - Data API: portfolio positions (public, keyed by wallet address)

pub mod clob;
pub mod data;
pub mod gamma;

pub use clob::{ClobClient, Side};
pub use data::DataClient;
pub use gamma::{GammaClient, SearchOutcome};

use crate::config::PolymarketConfig;
use crate::error::Result;

/// Unified Polymarket client
pub struct PolymarketClient {
    pub gamma: GammaClient,
    pub data: DataClient,
    /// Present only when a private key is configured
    pub clob: Option<ClobClient>,
    config: PolymarketConfig,
}

impl PolymarketClient {
    pub fn new(config: PolymarketConfig, timeout_secs: u64) -> Result<Self> {
        let gamma = GammaClient::new(&config.gamma_url, timeout_secs)?;
        let data = DataClient::new(&config.data_api_url, timeout_secs)?;

        let clob = match &config.private_key {
            Some(key) => Some(ClobClient::new(
                &config.clob_url,
                key,
                config.funder_address.as_deref(),
                config.chain_id,
                config.signature_type,
            )?),
            None => None,
        };

        Ok(Self {
            gamma,
            data,
            clob,
            config,
        })
    }

    /// Wallet address whose positions the data-api is queried for
    pub fn funder_address(&self) -> Option<&str> {
        self.config.funder_address.as_deref()
    }

    pub fn trading_enabled(&self) -> bool {
        self.clob.is_some()
    }
}
