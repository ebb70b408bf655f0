use std::collections::HashMap;
use std::env;

use crate::constants::{
    BALANCE_FETCH_TIMEOUT_SECS, DEFAULT_TARGET_CHAIN_ID, PRICE_REFRESH_INTERVAL_SECS,
};
use crate::registry;

// Quote endpoints in Binance 24h-ticker shape; the fallback is tried when
// the primary fails, and simulated prices cover the rest.
const DEFAULT_PRICE_API_URL: &str = "https://data-api.binance.vision/api/v3/ticker/24hr";
const DEFAULT_PRICE_API_FALLBACK_URL: &str = "https://api.binance.com/api/v3/ticker/24hr";

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,

    /// Network the swap flow requires; anything else is wrong-network.
    pub target_chain_id: u64,

    /// Per-chain overrides of the registry's default public RPC URLs,
    /// keyed by chain id (env: RPC_URL_<chain id>).
    pub rpc_url_overrides: HashMap<u64, String>,

    pub price_api_url: String,
    pub price_api_fallback_url: String,
    pub price_refresh_interval_secs: u64,

    pub balance_fetch_timeout_secs: u64,

    /// Address the headless binary aggregates; optional, the engine also
    /// serves addresses supplied at runtime.
    pub watch_address: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut rpc_url_overrides = HashMap::new();
        for chain_id in registry::all_chain_ids() {
            if let Ok(url) = env::var(format!("RPC_URL_{chain_id}")) {
                if !url.trim().is_empty() {
                    rpc_url_overrides.insert(chain_id, url.trim().to_string());
                }
            }
        }

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            target_chain_id: env::var("TARGET_CHAIN_ID")
                .unwrap_or_else(|_| DEFAULT_TARGET_CHAIN_ID.to_string())
                .parse()?,

            rpc_url_overrides,

            price_api_url: env::var("PRICE_API_URL")
                .unwrap_or_else(|_| DEFAULT_PRICE_API_URL.to_string()),
            price_api_fallback_url: env::var("PRICE_API_FALLBACK_URL")
                .unwrap_or_else(|_| DEFAULT_PRICE_API_FALLBACK_URL.to_string()),
            price_refresh_interval_secs: env::var("PRICE_REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| PRICE_REFRESH_INTERVAL_SECS.to_string())
                .parse()?,

            balance_fetch_timeout_secs: env::var("BALANCE_FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| BALANCE_FETCH_TIMEOUT_SECS.to_string())
                .parse()?,

            watch_address: env::var("WATCH_ADDRESS")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !registry::is_supported(self.target_chain_id) {
            anyhow::bail!("TARGET_CHAIN_ID {} is not a supported chain", self.target_chain_id);
        }

        for (chain_id, url) in &self.rpc_url_overrides {
            if url::Url::parse(url).is_err() {
                anyhow::bail!("RPC_URL_{} is not a valid URL: {}", chain_id, url);
            }
        }
        if url::Url::parse(&self.price_api_url).is_err() {
            anyhow::bail!("PRICE_API_URL is not a valid URL");
        }
        if url::Url::parse(&self.price_api_fallback_url).is_err() {
            anyhow::bail!("PRICE_API_FALLBACK_URL is not a valid URL");
        }

        if self.price_refresh_interval_secs == 0 {
            tracing::warn!("PRICE_REFRESH_INTERVAL_SECS should be > 0; prices will spin");
        }
        if self.balance_fetch_timeout_secs == 0 {
            tracing::warn!("BALANCE_FETCH_TIMEOUT_SECS of 0 treats every fetch as failed");
        }
        if self.watch_address.is_none() {
            tracing::warn!("WATCH_ADDRESS not set; headless run will idle until shutdown");
        }

        Ok(())
    }

    /// RPC endpoint for a chain: configured override, else registry default.
    pub fn rpc_url_for(&self, chain_id: u64) -> Option<String> {
        if let Some(url) = self.rpc_url_overrides.get(&chain_id) {
            return Some(url.clone());
        }
        registry::network(chain_id).map(|n| n.rpc_url.to_string())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
