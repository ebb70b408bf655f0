//! Static chain and token tables.
//!
//! Every supported network and every token the portfolio tracks lives here,
//! indexed by (chain id, symbol). The same symbol may appear on several
//! chains (bridged representations); the aggregator merges those by symbol.

use crate::constants::{CHAIN_BSC, CHAIN_ETHEREUM};

#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub chain_id: u64,
    /// Hex-encoded chain id as used by wallet_switchEthereumChain payloads.
    pub chain_id_hex: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
    pub native_symbol: &'static str,
    pub native_decimals: u32,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenSpec {
    pub symbol: &'static str,
    pub display_name: &'static str,
    pub decimals: u32,
    /// None for the chain's native asset.
    pub contract_address: Option<&'static str>,
    pub chain_id: u64,
    /// Ticker pair on the quote source; "STABLE" pins the price to $1.00.
    pub price_feed_key: &'static str,
}

impl TokenSpec {
    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }
}

static NETWORKS: [NetworkConfig; 2] = [
    NetworkConfig {
        chain_id: CHAIN_BSC,
        chain_id_hex: "0x38",
        name: "Binance Smart Chain",
        native_name: "Binance Coin",
        native_symbol: "BNB",
        native_decimals: 18,
        rpc_url: "https://bsc-dataseed.binance.org/",
        explorer_url: "https://bscscan.com/",
    },
    NetworkConfig {
        chain_id: CHAIN_ETHEREUM,
        chain_id_hex: "0x1",
        name: "Ethereum Mainnet",
        native_name: "Ether",
        native_symbol: "ETH",
        native_decimals: 18,
        rpc_url: "https://eth.llamarpc.com",
        explorer_url: "https://etherscan.io/",
    },
];

static TOKENS: [TokenSpec; 6] = [
    // Binance Smart Chain (56)
    TokenSpec {
        symbol: "BNB",
        display_name: "Binance Coin",
        decimals: 18,
        contract_address: None,
        chain_id: CHAIN_BSC,
        price_feed_key: "BNBUSDT",
    },
    TokenSpec {
        symbol: "ETH",
        display_name: "Ethereum",
        decimals: 18,
        // Wrapped ETH on BSC
        contract_address: Some("0x2170Ed0880ac9A755fd29B2688956BD959F933F8"),
        chain_id: CHAIN_BSC,
        price_feed_key: "ETHUSDT",
    },
    TokenSpec {
        symbol: "USDT",
        display_name: "Tether USD",
        decimals: 18,
        contract_address: Some("0x55d398326f99059fF775485246999027B3197955"),
        chain_id: CHAIN_BSC,
        price_feed_key: "STABLE",
    },
    // Ethereum Mainnet (1)
    TokenSpec {
        symbol: "ETH",
        display_name: "Ethereum",
        decimals: 18,
        contract_address: None,
        chain_id: CHAIN_ETHEREUM,
        price_feed_key: "ETHUSDT",
    },
    TokenSpec {
        symbol: "USDT",
        display_name: "Tether USD",
        // USDT on Ethereum has 6 decimals
        decimals: 6,
        contract_address: Some("0xdAC17F958D2ee523a2206206994597C13D831ec7"),
        chain_id: CHAIN_ETHEREUM,
        price_feed_key: "STABLE",
    },
    TokenSpec {
        symbol: "BNB",
        display_name: "Binance Coin",
        decimals: 18,
        contract_address: Some("0xB8c77482e45F1F44dE1745F52C74426C631bDD52"),
        chain_id: CHAIN_ETHEREUM,
        price_feed_key: "BNBUSDT",
    },
];

pub fn network(chain_id: u64) -> Option<&'static NetworkConfig> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

pub fn is_supported(chain_id: u64) -> bool {
    network(chain_id).is_some()
}

pub fn all_chain_ids() -> impl Iterator<Item = u64> {
    NETWORKS.iter().map(|n| n.chain_id)
}

pub fn supported_tokens(chain_id: u64) -> impl Iterator<Item = &'static TokenSpec> {
    TOKENS.iter().filter(move |t| t.chain_id == chain_id)
}

pub fn token(chain_id: u64, symbol: &str) -> Option<&'static TokenSpec> {
    TOKENS
        .iter()
        .find(|t| t.chain_id == chain_id && t.symbol.eq_ignore_ascii_case(symbol))
}
