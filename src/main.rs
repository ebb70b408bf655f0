use std::str::FromStr;
use std::sync::Arc;

use ethers::types::Address;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod codec;
mod config;
mod constants;
mod error;
mod models;
mod provider;
mod registry;
mod rpc;
mod services;
mod session;
mod utils;

use config::Config;
use provider::WalletProvider;
use rpc::RpcClient;
use services::{PortfolioAggregator, PriceFeed, SwapQuoter};
use session::WalletSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "indoswap_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting IndoSwap engine");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!(
        "Target network: {} ({})",
        registry::network(config.target_chain_id)
            .map(|n| n.name)
            .unwrap_or("unknown"),
        config.target_chain_id
    );

    // Headless runs have no injected browser wallet; the session stays
    // available for embedders that wrap one behind the provider trait.
    let injected: Option<Arc<dyn WalletProvider>> = None;
    for option in provider::wallet_options(injected.as_deref()) {
        tracing::debug!("wallet option {}: {:?}", option.name, option.availability);
    }

    let session = WalletSession::new(injected.clone(), config.target_chain_id);
    session.start_event_loop().await;

    let prices = Arc::new(PriceFeed::new(&config));
    tracing::info!("Price feed tracking {:?}", PriceFeed::tracked_symbols());
    let rpc = {
        let client = RpcClient::new(&config);
        match injected {
            Some(provider) => Arc::new(client.with_wallet(provider, session.state())),
            None => Arc::new(client),
        }
    };
    let portfolio = Arc::new(PortfolioAggregator::new(
        rpc,
        prices.clone(),
        session.state(),
        std::time::Duration::from_secs(config.balance_fetch_timeout_secs),
    ));
    let quoter = SwapQuoter::new(prices.clone());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    services::start_background_services(
        session.clone(),
        portfolio.clone(),
        prices.clone(),
        &config,
        shutdown_rx,
    )
    .await;

    match config.watch_address.as_deref() {
        Some(raw) => {
            let address = Address::from_str(raw)
                .map_err(|_| anyhow::anyhow!("WATCH_ADDRESS is not a valid EVM address: {raw}"))?;
            watch_portfolio(address, &portfolio, &prices, &quoter).await;
        }
        None => {
            tracing::info!("No WATCH_ADDRESS configured; waiting for shutdown");
            tokio::signal::ctrl_c().await?;
        }
    }

    let _ = shutdown_tx.send(true);
    session.shutdown().await;
    tracing::info!("IndoSwap engine stopped");
    Ok(())
}

/// Aggregate the configured address on a fixed cadence and log the published
/// snapshots until interrupted.
async fn watch_portfolio(
    address: Address,
    portfolio: &Arc<PortfolioAggregator>,
    prices: &Arc<PriceFeed>,
    quoter: &SwapQuoter,
) {
    let short = utils::short_address(&format!("{address:#x}"));
    tracing::info!("Watching portfolio for {short}");

    loop {
        let snapshot = portfolio.refresh(address).await;
        tracing::info!(
            "portfolio total {} across {} tokens{}",
            snapshot.total_display,
            snapshot.balances.len(),
            if prices.is_stale(constants::PRICE_STALE_AFTER_MS) {
                " (prices stale)"
            } else {
                ""
            }
        );
        for balance in snapshot.balances.values() {
            tracing::info!(
                "  {:>5}: {} ({}){}",
                balance.symbol,
                balance.amount,
                utils::format_usd_value(balance.usd_value),
                if balance.degraded { " [partial]" } else { "" }
            );
        }

        for price in prices.prices().await.values() {
            tracing::debug!(
                "price {:>5}: ${} ({})",
                price.symbol,
                utils::format_price(price.usd_price),
                utils::format_percentage(price.change_24h)
            );
        }

        // A sample quote keeps the swap path exercised in demo runs.
        if let Some(quote) = quoter.quote("BNB", "USDT", 1.0).await {
            tracing::debug!(
                "1 BNB -> {:.4} USDT (rate {:.4}, min received {:.4})",
                quote.to_amount,
                quote.exchange_rate,
                quote.minimum_received
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received");
                return;
            }
        }
    }
}
