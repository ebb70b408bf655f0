//! Multi-chain portfolio aggregation.
//!
//! One refresh fans out a balance fetch for every (chain, token) pair in the
//! registry, waits for all of them to settle, merges same-symbol holdings
//! across chains and publishes a single immutable snapshot. A failed or
//! timed-out fetch degrades that one item to a zero contribution; it never
//! fails the aggregate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, U256};
use futures_util::future::join_all;
use tokio::sync::watch;

use crate::codec;
use crate::error::Result;
use crate::models::{PortfolioSnapshot, TokenBalance, WalletState};
use crate::registry::{self, TokenSpec};
use crate::rpc::RpcClient;
use crate::services::price_feed::PriceFeed;
use crate::utils::format_usd_value;

/// Everything the aggregator needs from the RPC layer. The seam keeps the
/// aggregation logic independent of the transport.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn native_balance(&self, address: Address, chain_id: u64) -> Result<String>;
    async fn erc20_balance(
        &self,
        address: Address,
        token_contract: &str,
        chain_id: u64,
    ) -> Result<String>;
}

#[async_trait]
impl BalanceSource for RpcClient {
    async fn native_balance(&self, address: Address, chain_id: u64) -> Result<String> {
        self.get_native_balance(address, chain_id).await
    }

    async fn erc20_balance(
        &self,
        address: Address,
        token_contract: &str,
        chain_id: u64,
    ) -> Result<String> {
        self.get_erc20_balance(address, token_contract, chain_id)
            .await
    }
}

// Common scale the per-chain raw amounts are normalized to before summing;
// keeps the merge exact when the same symbol has different decimals per chain.
const MERGE_DECIMALS: u32 = 18;

struct FetchOutcome {
    spec: &'static TokenSpec,
    /// None when the fetch failed or timed out; counts as zero.
    raw: Option<U256>,
}

pub struct PortfolioAggregator {
    source: Arc<dyn BalanceSource>,
    prices: Arc<PriceFeed>,
    wallet_state: watch::Receiver<WalletState>,
    snapshot_tx: watch::Sender<PortfolioSnapshot>,
    /// Monotonic refresh generation; a refresh only publishes if no newer
    /// one has started since (last writer wins by invocation time).
    generation: AtomicU64,
    fetch_timeout: Duration,
}

impl PortfolioAggregator {
    pub fn new(
        source: Arc<dyn BalanceSource>,
        prices: Arc<PriceFeed>,
        wallet_state: watch::Receiver<WalletState>,
        fetch_timeout: Duration,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(PortfolioSnapshot::empty());
        Self {
            source,
            prices,
            wallet_state,
            snapshot_tx,
            generation: AtomicU64::new(0),
            fetch_timeout,
        }
    }

    /// Read-only handle to the latest published snapshot.
    pub fn snapshot(&self) -> watch::Receiver<PortfolioSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Fetch, merge and publish the portfolio for `address`.
    ///
    /// Safe to call concurrently with itself: each invocation takes a new
    /// generation, and a result whose generation is no longer the newest is
    /// discarded instead of overwriting fresher data.
    pub async fn refresh(&self, address: Address) -> PortfolioSnapshot {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot_tx.send_modify(|s| s.is_refreshing = true);

        let fetches = registry::all_chain_ids()
            .flat_map(registry::supported_tokens)
            .map(|spec| self.fetch_one(address, spec));
        let outcomes = join_all(fetches).await;

        let snapshot = self.build_snapshot(&outcomes).await;

        if self.generation.load(Ordering::SeqCst) == generation {
            self.snapshot_tx.send_replace(snapshot.clone());
        } else {
            tracing::debug!(
                "portfolio refresh generation {generation} superseded; result discarded"
            );
        }
        snapshot
    }

    async fn fetch_one(&self, address: Address, spec: &'static TokenSpec) -> FetchOutcome {
        let fetch = async {
            let raw = match spec.contract_address {
                None => self.source.native_balance(address, spec.chain_id).await?,
                Some(contract) => {
                    self.source
                        .erc20_balance(address, contract, spec.chain_id)
                        .await?
                }
            };
            codec::parse_base_units(&raw)
        };

        let result = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(crate::error::AppError::Timeout),
        };
        let raw = match result {
            Ok(value) => Some(value),
            Err(err) => {
                // Absorbed here: one bad item degrades to zero, the
                // aggregate carries on.
                tracing::warn!(
                    "balance fetch failed for {} on chain {}: {err}",
                    spec.symbol,
                    spec.chain_id
                );
                None
            }
        };
        FetchOutcome { spec, raw }
    }

    async fn build_snapshot(&self, outcomes: &[FetchOutcome]) -> PortfolioSnapshot {
        struct Merged {
            scaled_sum: U256,
            degraded: bool,
        }

        // Merge by symbol across chains; accumulation happens in U256 at a
        // common scale so no chain's contribution is dropped or rounded.
        let mut merged: HashMap<String, Merged> = HashMap::new();
        for outcome in outcomes {
            let spec = outcome.spec;
            let entry = merged.entry(spec.symbol.to_string()).or_insert(Merged {
                scaled_sum: U256::zero(),
                degraded: false,
            });
            match outcome.raw {
                Some(raw) => {
                    let scale = U256::exp10((MERGE_DECIMALS - spec.decimals) as usize);
                    entry.scaled_sum = entry.scaled_sum.saturating_add(raw.saturating_mul(scale));
                }
                None => entry.degraded = true,
            }
        }

        let now = Utc::now();
        let mut balances = HashMap::with_capacity(merged.len());
        let mut total_usd = 0.0;
        for (symbol, item) in merged {
            let amount = codec::format_units(item.scaled_sum, MERGE_DECIMALS);
            let price = self
                .prices
                .get_price(&symbol)
                .await
                .map(|p| p.usd_price)
                .unwrap_or(0.0);
            let usd_value = amount.parse::<f64>().unwrap_or(0.0) * price;
            total_usd += usd_value;
            balances.insert(
                symbol.clone(),
                TokenBalance {
                    symbol,
                    amount,
                    usd_value,
                    degraded: item.degraded,
                    last_updated: now,
                },
            );
        }

        PortfolioSnapshot {
            total_display: format_usd_value(total_usd),
            native_balance: self.native_balance_for_wallet(outcomes),
            balances,
            total_usd,
            is_refreshing: false,
            taken_at: now,
        }
    }

    /// Decoded native balance of the wallet's currently-selected chain,
    /// mirrored into WalletState for display independent of the portfolio.
    fn native_balance_for_wallet(&self, outcomes: &[FetchOutcome]) -> Option<String> {
        let wallet_chain = self.wallet_state.borrow().chain_id;
        outcomes
            .iter()
            .find(|o| o.spec.chain_id == wallet_chain && o.spec.is_native())
            .and_then(|o| o.raw)
            .map(|raw| codec::format_units(raw, MERGE_DECIMALS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::AppError;
    use crate::models::WalletState;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;

    const OWNER: &str = "0x1234567890abcdef1234567890abcdef12345678";
    const ONE: u128 = 1_000_000_000_000_000_000;

    /// Balances keyed by (chain, symbol); missing entries fail the fetch.
    struct MapSource {
        balances: HashMap<(u64, &'static str), u128>,
    }

    #[async_trait]
    impl BalanceSource for MapSource {
        async fn native_balance(&self, _address: Address, chain_id: u64) -> Result<String> {
            let spec = registry::supported_tokens(chain_id)
                .find(|t| t.is_native())
                .unwrap();
            self.lookup(chain_id, spec.symbol)
        }

        async fn erc20_balance(
            &self,
            _address: Address,
            token_contract: &str,
            chain_id: u64,
        ) -> Result<String> {
            let spec = registry::supported_tokens(chain_id)
                .find(|t| t.contract_address == Some(token_contract))
                .unwrap();
            self.lookup(chain_id, spec.symbol)
        }
    }

    impl MapSource {
        fn lookup(&self, chain_id: u64, symbol: &str) -> Result<String> {
            match self.balances.get(&(chain_id, symbol)) {
                Some(raw) => Ok(format!("{:#x}", U256::from(*raw))),
                None => Err(AppError::Rpc {
                    code: -32000,
                    message: "unavailable".to_string(),
                }),
            }
        }
    }

    fn feed() -> Arc<PriceFeed> {
        let config = Config {
            environment: "test".to_string(),
            target_chain_id: 56,
            rpc_url_overrides: HashMap::new(),
            price_api_url: "http://127.0.0.1:1/ticker".to_string(),
            price_api_fallback_url: "http://127.0.0.1:1/ticker2".to_string(),
            price_refresh_interval_secs: 10,
            balance_fetch_timeout_secs: 6,
            watch_address: None,
        };
        Arc::new(PriceFeed::new(&config))
    }

    fn aggregator(
        source: Arc<dyn BalanceSource>,
        state: WalletState,
    ) -> (PortfolioAggregator, watch::Sender<WalletState>) {
        let (state_tx, state_rx) = watch::channel(state);
        let aggregator = PortfolioAggregator::new(
            source,
            feed(),
            state_rx,
            Duration::from_millis(500),
        );
        (aggregator, state_tx)
    }

    fn owner() -> Address {
        Address::from_str(OWNER).unwrap()
    }

    #[tokio::test]
    async fn merges_same_symbol_across_chains() {
        // ETH: 1.5 on BSC (wrapped) + 0.5 native on Ethereum.
        let source = Arc::new(MapSource {
            balances: HashMap::from([
                ((56, "ETH"), ONE + ONE / 2),
                ((1, "ETH"), ONE / 2),
            ]),
        });
        let (aggregator, _state) = aggregator(source, WalletState::initial(56));

        let snapshot = aggregator.refresh(owner()).await;
        let eth = snapshot.balances.get("ETH").unwrap();
        assert_eq!(eth.amount, "2");

        let eth_price = aggregator.prices.get_price("ETH").await.unwrap().usd_price;
        assert!((eth.usd_value - 2.0 * eth_price).abs() < 1e-6);
    }

    #[tokio::test]
    async fn merge_is_exact_for_mixed_decimals() {
        // USDT has 18 decimals on BSC but 6 on Ethereum; 1.5 + 0.25 = 1.75.
        let source = Arc::new(MapSource {
            balances: HashMap::from([
                ((56, "USDT"), ONE + ONE / 2),
                ((1, "USDT"), 250_000),
            ]),
        });
        let (aggregator, _state) = aggregator(source, WalletState::initial(56));

        let snapshot = aggregator.refresh(owner()).await;
        assert_eq!(snapshot.balances.get("USDT").unwrap().amount, "1.75");
    }

    #[tokio::test]
    async fn one_failing_chain_degrades_only_its_contribution() {
        // Chain 1's ETH fetch fails; chain 56 contributes 1.5 ETH.
        let source = Arc::new(MapSource {
            balances: HashMap::from([((56, "ETH"), ONE + ONE / 2)]),
        });
        let (aggregator, _state) = aggregator(source, WalletState::initial(56));

        let snapshot = aggregator.refresh(owner()).await;
        let eth = snapshot.balances.get("ETH").unwrap();
        assert_eq!(eth.amount, "1.5");
        assert!(eth.degraded);
        // Other symbols still present, zeroed and degraded, not missing.
        assert!(snapshot.balances.contains_key("BNB"));
    }

    #[tokio::test]
    async fn refresh_is_idempotent_without_balance_changes() {
        let source = Arc::new(MapSource {
            balances: HashMap::from([
                ((56, "BNB"), 2 * ONE),
                ((56, "ETH"), ONE),
                ((56, "USDT"), 100 * ONE),
                ((1, "ETH"), ONE),
                ((1, "USDT"), 5_000_000),
                ((1, "BNB"), 0),
            ]),
        });
        let (aggregator, _state) = aggregator(source, WalletState::initial(56));

        let first = aggregator.refresh(owner()).await;
        let second = aggregator.refresh(owner()).await;
        assert_eq!(first.balances.len(), second.balances.len());
        for (symbol, balance) in &first.balances {
            let other = second.balances.get(symbol).unwrap();
            assert_eq!(balance.amount, other.amount);
            assert_eq!(balance.usd_value, other.usd_value);
        }
        assert_eq!(first.total_usd, second.total_usd);
        assert!(!second.is_refreshing);
    }

    #[tokio::test]
    async fn native_balance_mirrors_the_wallet_chain() {
        let source = Arc::new(MapSource {
            balances: HashMap::from([((56, "BNB"), 3 * ONE)]),
        });
        let (aggregator, _state) = aggregator(source, WalletState::initial(56));

        let snapshot = aggregator.refresh(owner()).await;
        assert_eq!(snapshot.native_balance.as_deref(), Some("3"));
    }

    /// Slow first round, fast second round: the second (newer) result must
    /// win even though the first finishes later.
    struct TwoPhaseSource {
        calls: AtomicUsize,
        per_round: usize,
    }

    #[async_trait]
    impl BalanceSource for TwoPhaseSource {
        async fn native_balance(&self, _address: Address, _chain_id: u64) -> Result<String> {
            self.answer().await
        }

        async fn erc20_balance(
            &self,
            _address: Address,
            _token_contract: &str,
            _chain_id: u64,
        ) -> Result<String> {
            self.answer().await
        }
    }

    impl TwoPhaseSource {
        async fn answer(&self) -> Result<String> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            if index < self.per_round {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(format!("{:#x}", U256::from(100u64) * U256::exp10(18)))
            } else {
                Ok(format!("{:#x}", U256::from(200u64) * U256::exp10(18)))
            }
        }
    }

    #[tokio::test]
    async fn stale_in_flight_refresh_does_not_overwrite_newer_result() {
        let per_round = registry::all_chain_ids()
            .flat_map(registry::supported_tokens)
            .count();
        let source = Arc::new(TwoPhaseSource {
            calls: AtomicUsize::new(0),
            per_round,
        });
        let (state_tx, state_rx) = watch::channel(WalletState::initial(56));
        let _keep = state_tx;
        let aggregator = Arc::new(PortfolioAggregator::new(
            source,
            feed(),
            state_rx,
            Duration::from_secs(5),
        ));

        let slow = {
            let aggregator = aggregator.clone();
            tokio::spawn(async move { aggregator.refresh(owner()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = aggregator.refresh(owner()).await;
        // Two chains contribute 200 BNB each in the fast round (100 in the slow).
        assert_eq!(fast.balances.get("BNB").unwrap().amount, "400");
        let _ = slow.await.unwrap();

        let published = aggregator.snapshot().borrow().clone();
        assert_eq!(published.balances.get("BNB").unwrap().amount, "400");
        assert!(!published.is_refreshing);
    }
}
