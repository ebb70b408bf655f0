// Engine services
pub mod portfolio;
pub mod price_feed;
pub mod swap_quoter;

// Re-export for convenience
pub use portfolio::PortfolioAggregator;
pub use price_feed::PriceFeed;
pub use swap_quoter::SwapQuoter;

use std::str::FromStr;
use std::sync::Arc;

use ethers::types::Address;
use tokio::sync::watch;

use crate::config::Config;
use crate::session::WalletSession;

/// Start the background services: the periodic price refresh and the
/// wallet-state watcher that refreshes the portfolio whenever a session
/// becomes connected, changes account or changes chain. The refresh runs as
/// a spawned side effect, so session transitions never block on it.
pub async fn start_background_services(
    session: Arc<WalletSession>,
    portfolio: Arc<PortfolioAggregator>,
    prices: Arc<PriceFeed>,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) {
    tracing::info!("Starting background services...");

    prices
        .clone()
        .start_refresh_loop(config.price_refresh_interval_secs, shutdown.clone());

    let mut state_rx = session.state();
    let mut shutdown_rx = shutdown;
    let watcher_session = session.clone();
    tokio::spawn(async move {
        // (address, chain) last refreshed for; avoids re-fetching on state
        // changes that do not affect the portfolio.
        let mut refreshed_for: Option<(String, u64)> = None;
        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let state = state_rx.borrow_and_update().clone();
                    if !state.is_connected() {
                        refreshed_for = None;
                        continue;
                    }
                    let key = (state.address.clone(), state.chain_id);
                    if refreshed_for.as_ref() == Some(&key) {
                        continue;
                    }
                    refreshed_for = Some(key);
                    let Ok(address) = Address::from_str(&state.address) else {
                        tracing::warn!("connected with unparseable address {}", state.address);
                        continue;
                    };
                    let portfolio = portfolio.clone();
                    let session = watcher_session.clone();
                    tokio::spawn(async move {
                        let snapshot = portfolio.refresh(address).await;
                        if let Some(native) = snapshot.native_balance {
                            session.set_native_balance(native);
                        }
                    });
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("portfolio watcher stopping");
                        return;
                    }
                }
            }
        }
    });

    tracing::info!("All background services started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::WalletState;
    use crate::provider::testing::MockProvider;
    use crate::provider::WalletProvider;
    use async_trait::async_trait;
    use ethers::types::U256;
    use super::portfolio::BalanceSource;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    struct FixedSource;

    #[async_trait]
    impl BalanceSource for FixedSource {
        async fn native_balance(&self, _address: Address, _chain_id: u64) -> Result<String> {
            Ok(format!("{:#x}", U256::from(2u64) * U256::exp10(18)))
        }

        async fn erc20_balance(
            &self,
            _address: Address,
            _token_contract: &str,
            _chain_id: u64,
        ) -> Result<String> {
            Ok("0x0".to_string())
        }
    }

    fn test_config() -> Config {
        Config {
            environment: "test".to_string(),
            target_chain_id: 56,
            rpc_url_overrides: HashMap::new(),
            price_api_url: "http://127.0.0.1:1/ticker".to_string(),
            price_api_fallback_url: "http://127.0.0.1:1/ticker2".to_string(),
            // Long interval: the loop's first refresh runs once, then idles.
            price_refresh_interval_secs: 3600,
            balance_fetch_timeout_secs: 2,
            watch_address: None,
        }
    }

    #[tokio::test]
    async fn connecting_triggers_a_refresh_and_mirrors_native_balance() {
        let config = test_config();
        let provider = Arc::new(MockProvider::new());
        provider.respond(
            "eth_requestAccounts",
            json!(["0x1234567890abcdef1234567890abcdef12345678"]),
        );
        provider.respond("eth_chainId", json!("0x38"));
        let provider: Arc<dyn WalletProvider> = provider;

        let session = WalletSession::new(Some(provider), config.target_chain_id);
        let prices = Arc::new(PriceFeed::new(&config));
        let portfolio = Arc::new(PortfolioAggregator::new(
            Arc::new(FixedSource),
            prices.clone(),
            session.state(),
            Duration::from_secs(2),
        ));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        start_background_services(
            session.clone(),
            portfolio.clone(),
            prices,
            &config,
            shutdown_rx,
        )
        .await;

        session.connect().await.unwrap();

        // Let the watcher observe the transition and finish the refresh.
        let state_rx = session.state();
        for _ in 0..100 {
            if state_rx.borrow().native_balance == "2" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(state_rx.borrow().native_balance, "2");
        assert!(portfolio.snapshot().borrow().balances.contains_key("BNB"));
    }
}
