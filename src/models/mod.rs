//! Shared data model published by the engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::utils::short_address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    WrongNetwork,
    Error,
}

/// Single mutable instance owned by WalletSession; everything else reads the
/// latest published snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WalletState {
    pub status: ConnectionStatus,
    /// Lowercase 0x-prefixed hex, empty until connected.
    pub address: String,
    pub chain_id: u64,
    /// Decoded native balance of the connected chain, for display.
    pub native_balance: String,
}

impl WalletState {
    pub fn initial(chain_id: u64) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            address: String::new(),
            chain_id,
            native_balance: "0".to_string(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// "0x1234...abcd" form for compact display.
    pub fn short_address(&self) -> String {
        short_address(&self.address)
    }
}

/// Per-symbol holding, merged across chains.
#[derive(Debug, Clone, Serialize)]
pub struct TokenBalance {
    pub symbol: String,
    /// Decoded decimal amount, exact.
    pub amount: String,
    pub usd_value: f64,
    /// True when at least one chain's fetch failed and contributed zero.
    pub degraded: bool,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Live,
    Simulated,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPrice {
    pub symbol: String,
    pub usd_price: f64,
    pub change_24h: f64,
    pub last_updated: DateTime<Utc>,
    pub source: PriceSource,
}

/// Immutable portfolio view; replaced wholesale on every refresh so readers
/// never observe a mix of old and new balances.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSnapshot {
    pub balances: HashMap<String, TokenBalance>,
    pub total_usd: f64,
    pub total_display: String,
    /// Decoded native balance of the wallet's connected chain, when known.
    pub native_balance: Option<String>,
    pub is_refreshing: bool,
    pub taken_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    pub fn empty() -> Self {
        Self {
            balances: HashMap::new(),
            total_usd: 0.0,
            total_display: crate::utils::format_usd_value(0.0),
            native_balance: None,
            is_refreshing: false,
            taken_at: Utc::now(),
        }
    }
}

/// Ephemeral quote, recomputed on every input change.
#[derive(Debug, Clone, Serialize)]
pub struct SwapQuote {
    pub from_token: String,
    pub to_token: String,
    pub from_amount: f64,
    pub to_amount: f64,
    pub exchange_rate: f64,
    pub price_impact_pct: f64,
    pub trading_fee_pct: f64,
    pub slippage_pct: f64,
    pub minimum_received: f64,
}

/// Lifecycle notices published for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Info { message: String },
    Error { message: String },
    Connected { address: String, chain_id: u64 },
    Disconnected,
    NetworkSwitched { chain_id: u64 },
}
