/// Application constants

// Chain ids
pub const CHAIN_ETHEREUM: u64 = 1;
pub const CHAIN_BSC: u64 = 56;

// Default target network for the swap flow (BSC)
pub const DEFAULT_TARGET_CHAIN_ID: u64 = CHAIN_BSC;

// ERC-20 balanceOf(address) selector
pub const ERC20_BALANCE_OF_SELECTOR: &str = "0x70a08231";

// EIP-1193 / MetaMask provider error codes
pub const PROVIDER_ERR_USER_REJECTED: i64 = 4001;
pub const PROVIDER_ERR_UNAUTHORIZED: i64 = 4100;
pub const PROVIDER_ERR_UNSUPPORTED_METHOD: i64 = 4200;
pub const PROVIDER_ERR_DISCONNECTED: i64 = 4900;
pub const PROVIDER_ERR_CHAIN_DISCONNECTED: i64 = 4901;
pub const PROVIDER_ERR_CHAIN_NOT_ADDED: i64 = 4902;

pub const METAMASK_DOWNLOAD_URL: &str = "https://metamask.io/download/";

// Swap pricing heuristics (observed tier boundaries, kept literal)
pub const TRADING_FEE_PCT: f64 = 0.25;
pub const STABLE_SYMBOLS: [&str; 3] = ["BUSD", "USDT", "USDC"];

// Price impact tiers by notional USD value of the trade
pub const IMPACT_PCT_UNDER_1K: f64 = 0.01;
pub const IMPACT_PCT_UNDER_10K: f64 = 0.05;
pub const IMPACT_PCT_UNDER_100K: f64 = 0.2;
pub const IMPACT_PCT_LARGE: f64 = 1.0;

// Slippage tiers, stable-to-stable pairs
pub const SLIPPAGE_PCT_STABLE_UNDER_1K: f64 = 0.05;
pub const SLIPPAGE_PCT_STABLE_UNDER_10K: f64 = 0.1;
pub const SLIPPAGE_PCT_STABLE_LARGE: f64 = 0.15;

// Slippage tiers, everything else
pub const SLIPPAGE_PCT_UNDER_1K: f64 = 0.1;
pub const SLIPPAGE_PCT_UNDER_10K: f64 = 0.3;
pub const SLIPPAGE_PCT_UNDER_100K: f64 = 0.8;
pub const SLIPPAGE_PCT_LARGE: f64 = 2.0;

// Simulated price walk bounds (per refresh cycle)
pub const SIM_PRICE_JITTER_FRACTION: f64 = 0.003; // +/-0.3%
pub const SIM_CHANGE_24H_JITTER: f64 = 0.025; // percentage points

// Background service intervals
pub const PRICE_REFRESH_INTERVAL_SECS: u64 = 10;
pub const PRICE_STALE_AFTER_MS: i64 = 30_000;

// Per-item balance fetch window; expiry counts as a zero contribution
pub const BALANCE_FETCH_TIMEOUT_SECS: u64 = 6;

// Simulated swap settlement latency
pub const SWAP_EXECUTE_LATENCY_MS: u64 = 2_000;
