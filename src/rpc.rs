//! Stateless JSON-RPC 2.0 layer over two transports: the injected wallet
//! provider for the chain the wallet is currently on, and plain HTTPS POST
//! against each chain's public endpoint for everything else.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::Address;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::config::Config;
use crate::constants::ERC20_BALANCE_OF_SELECTOR;
use crate::error::{AppError, Result};
use crate::models::WalletState;
use crate::provider::WalletProvider;
use crate::registry;

fn rpc_request(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    })
}

/// balanceOf(address) calldata: 4-byte selector, then the owner address
/// left-padded to 32 bytes.
fn balance_of_calldata(owner: Address) -> String {
    format!(
        "{}{}{}",
        ERC20_BALANCE_OF_SELECTOR,
        "0".repeat(24),
        hex::encode(owner.as_bytes())
    )
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

pub struct RpcClient {
    http: reqwest::Client,
    endpoints: HashMap<u64, String>,
    wallet: Option<WalletTransport>,
}

struct WalletTransport {
    provider: Arc<dyn WalletProvider>,
    state: watch::Receiver<WalletState>,
}

impl RpcClient {
    pub fn new(config: &Config) -> Self {
        let endpoints = registry::all_chain_ids()
            .filter_map(|chain_id| config.rpc_url_for(chain_id).map(|url| (chain_id, url)))
            .collect();
        Self {
            http: reqwest::Client::new(),
            endpoints,
            wallet: None,
        }
    }

    /// Route requests for the wallet's currently-selected chain through the
    /// injected provider instead of the public endpoint.
    pub fn with_wallet(
        mut self,
        provider: Arc<dyn WalletProvider>,
        state: watch::Receiver<WalletState>,
    ) -> Self {
        self.wallet = Some(WalletTransport { provider, state });
        self
    }

    /// Send a single JSON-RPC request against the endpoint for `chain_id`.
    pub async fn call(&self, chain_id: u64, method: &str, params: Value) -> Result<Value> {
        if let Some(wallet) = &self.wallet {
            if wallet.state.borrow().chain_id == chain_id {
                return wallet.provider.request(method, params).await;
            }
        }

        let endpoint = self
            .endpoints
            .get(&chain_id)
            .ok_or(AppError::UnsupportedChain(chain_id))?;

        let envelope: RpcEnvelope = self
            .http
            .post(endpoint)
            .json(&rpc_request(method, params))
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = envelope.error {
            return Err(AppError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| AppError::Internal("RPC response missing result".into()))
    }

    /// eth_getBalance; returns the raw hex balance in base units.
    pub async fn get_native_balance(&self, address: Address, chain_id: u64) -> Result<String> {
        let params = json!([format!("{address:#x}"), "latest"]);
        let result = self.call(chain_id, "eth_getBalance", params).await?;
        as_hex_string(result)
    }

    /// eth_call of balanceOf(owner) on `token_contract`; returns the raw hex
    /// balance in base units.
    pub async fn get_erc20_balance(
        &self,
        address: Address,
        token_contract: &str,
        chain_id: u64,
    ) -> Result<String> {
        let params = json!([
            {
                "to": token_contract,
                "data": balance_of_calldata(address)
            },
            "latest"
        ]);
        let result = self.call(chain_id, "eth_call", params).await?;
        as_hex_string(result)
    }
}

fn as_hex_string(value: Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidNumericFormat(value.to_string()))
}
