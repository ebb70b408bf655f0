use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No wallet provider detected")]
    ProviderNotFound,

    #[error("Connection request rejected by user")]
    UserRejected,

    #[error("Connected to unsupported network (chain {0})")]
    WrongNetwork(u64),

    #[error("Chain {0} is not configured in the wallet")]
    ChainNotConfigured(u64),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid numeric format: {0}")]
    InvalidNumericFormat(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unsupported chain id {0}")]
    UnsupportedChain(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Informational failures surface as notices, not error states.
    pub fn is_informational(&self) -> bool {
        matches!(self, AppError::UserRejected)
    }

    /// Provider failures arrive as JSON-RPC error envelopes; map the
    /// EIP-1193 codes we act on to their own variants.
    pub fn from_provider_code(code: i64, message: String, chain_id: u64) -> Self {
        match code {
            crate::constants::PROVIDER_ERR_USER_REJECTED => AppError::UserRejected,
            crate::constants::PROVIDER_ERR_CHAIN_NOT_ADDED => {
                AppError::ChainNotConfigured(chain_id)
            }
            _ => AppError::Rpc { code, message },
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
