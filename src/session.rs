//! Wallet connection lifecycle.
//!
//! WalletSession is the single writer of [`WalletState`]; it owns the
//! injected provider handle and the subscription to its events, and it
//! publishes every transition through a watch channel. The state machine:
//!
//! disconnected -> connecting -> {connected | wrong-network | error}
//! connected <-> wrong-network        (chainChanged)
//! any state  -> disconnected         (disconnect, zero accounts)

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::constants::METAMASK_DOWNLOAD_URL;
use crate::error::{AppError, Result};
use crate::models::{ConnectionStatus, SessionEvent, WalletState};
use crate::provider::{ProviderEvent, WalletProvider};
use crate::registry;

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    target_chain_id: u64,
    state_tx: watch::Sender<WalletState>,
    events_tx: broadcast::Sender<SessionEvent>,
    /// Provider event subscription; aborted (and thereby released) on
    /// teardown.
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl WalletSession {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, target_chain_id: u64) -> Arc<Self> {
        let (state_tx, _) = watch::channel(WalletState::initial(target_chain_id));
        let (events_tx, _) = broadcast::channel(32);
        Arc::new(Self {
            provider,
            target_chain_id,
            state_tx,
            events_tx,
            event_task: Mutex::new(None),
        })
    }

    /// Read-only handle to the published wallet state.
    pub fn state(&self) -> watch::Receiver<WalletState> {
        self.state_tx.subscribe()
    }

    /// Lifecycle notices for the presentation layer.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Begin consuming provider events. Idempotent; a no-op when no provider
    /// is attached.
    pub async fn start_event_loop(self: &Arc<Self>) {
        let Some(provider) = self.provider.clone() else {
            return;
        };
        let mut guard = self.event_task.lock().await;
        if guard.is_some() {
            return;
        }
        let session = self.clone();
        let mut events = provider.subscribe();
        *guard = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => session.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("provider event stream lagged by {skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("provider event stream closed");
                        return;
                    }
                }
            }
        }));
    }

    /// Release the provider subscription.
    pub async fn shutdown(&self) {
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
    }

    /// Connect to the injected wallet. Only meaningful from `disconnected`.
    pub async fn connect(&self) -> Result<()> {
        if self.state_tx.borrow().status != ConnectionStatus::Disconnected {
            tracing::debug!("connect() ignored: session not in disconnected state");
            return Ok(());
        }

        let Some(provider) = self.provider.clone() else {
            self.emit(SessionEvent::Error {
                message: format!("No wallet detected. Install MetaMask: {METAMASK_DOWNLOAD_URL}"),
            });
            return Err(AppError::ProviderNotFound);
        };

        self.state_tx
            .send_modify(|s| s.status = ConnectionStatus::Connecting);

        let accounts = match provider.request("eth_requestAccounts", json!([])).await {
            Ok(value) => value,
            Err(err) => return self.fail_connect(err),
        };
        let accounts = account_list(&accounts);
        if accounts.is_empty() {
            // A locked wallet answers with no accounts; that is a failure,
            // never a connected session.
            self.state_tx
                .send_modify(|s| s.status = ConnectionStatus::Error);
            self.emit(SessionEvent::Error {
                message: "Wallet returned no accounts; unlock it and retry".to_string(),
            });
            return Err(AppError::Internal("wallet returned no accounts".into()));
        }
        let address = accounts[0].to_lowercase();

        let chain_id = match provider.request("eth_chainId", json!([])).await {
            Ok(value) => match parse_chain_id(&value) {
                Ok(id) => id,
                Err(err) => return self.fail_connect(err),
            },
            Err(err) => return self.fail_connect(err),
        };

        self.state_tx.send_modify(|s| {
            s.address = address.clone();
            s.chain_id = chain_id;
        });
        self.evaluate_network(chain_id);

        if self.state_tx.borrow().is_connected() {
            self.emit(SessionEvent::Connected { address, chain_id });
        }
        Ok(())
    }

    fn fail_connect(&self, err: AppError) -> Result<()> {
        let err = match err {
            AppError::Rpc { code, message } => {
                AppError::from_provider_code(code, message, self.target_chain_id)
            }
            other => other,
        };
        if err.is_informational() {
            // The user closed the prompt; back to square one, not an error.
            self.state_tx
                .send_replace(WalletState::initial(self.target_chain_id));
            self.emit(SessionEvent::Info {
                message: "Connection cancelled. You can try again anytime".to_string(),
            });
        } else {
            self.state_tx
                .send_modify(|s| s.status = ConnectionStatus::Error);
            self.emit(SessionEvent::Error {
                message: format!("Wallet connection failed: {err}"),
            });
        }
        Err(err)
    }

    /// Ask the wallet to switch to the target network, adding its definition
    /// first if the wallet does not know the chain.
    pub async fn switch_network(&self) -> Result<()> {
        let Some(provider) = self.provider.clone() else {
            return Err(AppError::ProviderNotFound);
        };
        let network = registry::network(self.target_chain_id)
            .ok_or(AppError::UnsupportedChain(self.target_chain_id))?;

        let switch_params = json!([{ "chainId": network.chain_id_hex }]);
        match provider
            .request("wallet_switchEthereumChain", switch_params.clone())
            .await
        {
            Ok(_) => {}
            Err(AppError::Rpc { code, message }) => {
                match AppError::from_provider_code(code, message, self.target_chain_id) {
                    AppError::ChainNotConfigured(_) => {
                        // Unknown to the wallet: register the network, then retry.
                        provider
                            .request(
                                "wallet_addEthereumChain",
                                json!([{
                                    "chainId": network.chain_id_hex,
                                    "chainName": network.name,
                                    "nativeCurrency": {
                                        "name": network.native_name,
                                        "symbol": network.native_symbol,
                                        "decimals": network.native_decimals,
                                    },
                                    "rpcUrls": [network.rpc_url],
                                    "blockExplorerUrls": [network.explorer_url],
                                }]),
                            )
                            .await?;
                        provider
                            .request("wallet_switchEthereumChain", switch_params)
                            .await?;
                    }
                    AppError::UserRejected => {
                        self.emit(SessionEvent::Info {
                            message: "Network switch cancelled".to_string(),
                        });
                        return Err(AppError::UserRejected);
                    }
                    other => return Err(other),
                }
            }
            Err(other) => return Err(other),
        }

        // Re-read the chain instead of trusting the switch blindly; the
        // provider also emits chainChanged, which lands in the event loop.
        let chain_id = parse_chain_id(&provider.request("eth_chainId", json!([])).await?)?;
        self.apply_chain(chain_id);
        if chain_id != self.target_chain_id {
            return Err(AppError::WrongNetwork(chain_id));
        }
        if self.state_tx.borrow().is_connected() {
            self.emit(SessionEvent::NetworkSwitched { chain_id });
        }
        Ok(())
    }

    /// Reset to the initial disconnected state. Valid from any state.
    pub fn disconnect(&self) {
        self.state_tx
            .send_replace(WalletState::initial(self.target_chain_id));
        self.emit(SessionEvent::Disconnected);
    }

    /// Mirror of the connected chain's native balance, written by the
    /// portfolio aggregator after a refresh.
    pub(crate) fn set_native_balance(&self, balance: String) {
        self.state_tx.send_modify(|s| {
            if s.is_connected() {
                s.native_balance = balance;
            }
        });
    }

    async fn handle_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                tracing::info!("provider reported zero accounts; disconnecting");
                self.disconnect();
            }
            ProviderEvent::AccountsChanged(accounts) => {
                let address = accounts[0].to_lowercase();
                let changed = self.state_tx.borrow().address != address;
                if changed {
                    self.state_tx.send_modify(|s| {
                        s.address = address.clone();
                        s.native_balance = "0".to_string();
                    });
                    self.emit(SessionEvent::Info {
                        message: format!("Account changed to {address}"),
                    });
                }
            }
            ProviderEvent::ChainChanged(chain_id) => {
                self.apply_chain(chain_id);
            }
            ProviderEvent::Disconnected => {
                self.disconnect();
            }
        }
    }

    fn apply_chain(&self, chain_id: u64) {
        self.state_tx.send_modify(|s| s.chain_id = chain_id);
        self.evaluate_network(chain_id);
    }

    /// Recompute connected vs wrong-network once an address is present.
    fn evaluate_network(&self, chain_id: u64) {
        self.state_tx.send_modify(|s| {
            if s.address.is_empty() {
                return;
            }
            match s.status {
                ConnectionStatus::Connecting
                | ConnectionStatus::Connected
                | ConnectionStatus::WrongNetwork => {
                    if chain_id == self.target_chain_id {
                        s.status = ConnectionStatus::Connected;
                    } else {
                        s.status = ConnectionStatus::WrongNetwork;
                        s.native_balance = "0".to_string();
                    }
                }
                ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
            }
        });
        if self.state_tx.borrow().status == ConnectionStatus::WrongNetwork {
            self.emit(SessionEvent::Info {
                message: format!(
                    "Wrong network: switch to {}",
                    registry::network(self.target_chain_id)
                        .map(|n| n.name)
                        .unwrap_or("the target network")
                ),
            });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; the engine does not require a listener.
        let _ = self.events_tx.send(event);
    }
}

fn account_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_chain_id(value: &Value) -> Result<u64> {
    if let Some(raw) = value.as_str() {
        let digits = raw.strip_prefix("0x").unwrap_or(raw);
        let radix = if raw.starts_with("0x") { 16 } else { 10 };
        return u64::from_str_radix(digits, radix)
            .map_err(|_| AppError::InvalidNumericFormat(raw.to_string()));
    }
    value
        .as_u64()
        .ok_or_else(|| AppError::InvalidNumericFormat(value.to_string()))
}
