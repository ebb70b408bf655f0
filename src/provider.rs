//! Boundary to the injected browser wallet.
//!
//! The wallet object is never touched as ambient state; it is wrapped once at
//! startup in a [`WalletProvider`] implementation and handed to the session
//! as a capability. Notifications are modeled as a broadcast subscription
//! whose receiver handle is held by the session and dropped on teardown.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::constants::METAMASK_DOWNLOAD_URL;
use crate::error::Result;

/// Events pushed by the provider (accountsChanged / chainChanged /
/// disconnect in EIP-1193 terms).
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(u64),
    Disconnected,
}

/// EIP-1193 style wallet provider surface.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// `request({method, params})`; errors carry the provider's JSON-RPC
    /// error code and message.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Subscribe to provider events. Dropping the receiver releases the
    /// subscription.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;

    /// Provider identification flag (isMetaMask).
    fn is_metamask(&self) -> bool;
}

// ---- wallet option catalog -------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletKind {
    MetaMask,
    WalletConnect,
    Coinbase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletAvailability {
    Available,
    NotInstalled,
    ComingSoon,
}

#[derive(Debug, Clone)]
pub struct WalletOption {
    pub kind: WalletKind,
    pub name: &'static str,
    pub description: &'static str,
    pub availability: WalletAvailability,
    pub install_url: Option<&'static str>,
}

/// The closed set of wallet choices offered by the connect flow. Only
/// MetaMask maps to a live provider today; the rest are placeholders the
/// presentation layer renders as coming soon.
pub fn wallet_options(provider: Option<&dyn WalletProvider>) -> Vec<WalletOption> {
    let metamask_available = provider.map(|p| p.is_metamask()).unwrap_or(false);
    vec![
        WalletOption {
            kind: WalletKind::MetaMask,
            name: "MetaMask",
            description: "Connect using browser extension",
            availability: if metamask_available {
                WalletAvailability::Available
            } else {
                WalletAvailability::NotInstalled
            },
            install_url: Some(METAMASK_DOWNLOAD_URL),
        },
        WalletOption {
            kind: WalletKind::WalletConnect,
            name: "WalletConnect",
            description: "Connect using mobile wallet",
            availability: WalletAvailability::ComingSoon,
            install_url: None,
        },
        WalletOption {
            kind: WalletKind::Coinbase,
            name: "Coinbase Wallet",
            description: "Connect using Coinbase Wallet",
            availability: WalletAvailability::ComingSoon,
            install_url: None,
        },
    ]
}

#[cfg(test)]
pub mod testing {
    //! Scripted provider used by session and RPC tests.

    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Scripted = std::result::Result<Value, (i64, String)>;

    pub struct MockProvider {
        responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
        pub calls: Mutex<Vec<(String, Value)>>,
        events: broadcast::Sender<ProviderEvent>,
        metamask: bool,
    }

    impl MockProvider {
        pub fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                events,
                metamask: true,
            }
        }

        /// Queue a successful response for the given method.
        pub fn respond(&self, method: &str, value: Value) {
            self.responses
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(Ok(value));
        }

        /// Queue a provider error for the given method.
        pub fn fail(&self, method: &str, code: i64, message: &str) {
            self.responses
                .lock()
                .unwrap()
                .entry(method.to_string())
                .or_default()
                .push_back(Err((code, message.to_string())));
        }

        pub fn emit(&self, event: ProviderEvent) {
            let _ = self.events.send(event);
        }

        pub fn calls_for(&self, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == method)
                .count()
        }
    }

    #[async_trait]
    impl WalletProvider for MockProvider {
        async fn request(&self, method: &str, params: Value) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), params));
            let scripted = self
                .responses
                .lock()
                .unwrap()
                .get_mut(method)
                .and_then(|queue| queue.pop_front());
            match scripted {
                Some(Ok(value)) => Ok(value),
                Some(Err((code, message))) => Err(AppError::Rpc { code, message }),
                None => Err(AppError::Internal(format!("unscripted method {method}"))),
            }
        }

        fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
            self.events.subscribe()
        }

        fn is_metamask(&self) -> bool {
            self.metamask
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metamask_marked_not_installed_without_provider() {
        let options = wallet_options(None);
        let metamask = options
            .iter()
            .find(|o| o.kind == WalletKind::MetaMask)
            .unwrap();
        assert_eq!(metamask.availability, WalletAvailability::NotInstalled);
        assert!(metamask.install_url.is_some());
    }

    #[test]
    fn other_wallets_are_coming_soon() {
        for option in wallet_options(None) {
            if option.kind != WalletKind::MetaMask {
                assert_eq!(option.availability, WalletAvailability::ComingSoon);
            }
        }
    }
}
