use chain_btc::error::BtcError;
use chain_eth::error::EthError;
use thiserror::Error;

use crate::rpc::RpcError;
use crate::types::AmountError;

/// What went wrong, independent of where.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("coin is not initialized")]
    NotInitialized,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("insufficient funds: {0}")]
    Funds(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("operation not supported")]
    OperationNotSupported,
}

/// Error returned to callers of the coin API.
///
/// Carries the coin and the step that failed, plus the hint callers use to
/// decide between re-queueing and reporting upward.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{coin} {step}: {kind}")]
pub struct CoinError {
    pub coin: String,
    pub step: &'static str,
    pub kind: ErrorKind,
    pub retryable: bool,
}

impl CoinError {
    pub fn new(coin: impl Into<String>, step: &'static str, kind: ErrorKind) -> Self {
        Self {
            coin: coin.into(),
            step,
            kind,
            retryable: false,
        }
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<BtcError> for ErrorKind {
    fn from(e: BtcError) -> Self {
        match e {
            BtcError::InsufficientFunds { .. } => ErrorKind::Funds(e.to_string()),
            BtcError::InvalidPrivateKey(_) => ErrorKind::Validation(e.to_string()),
            BtcError::InvalidFee(_) | BtcError::Identity(_) => {
                ErrorKind::Configuration(e.to_string())
            }
            BtcError::SigningError(msg) => ErrorKind::Signing(msg),
            BtcError::TransactionBuildError(msg) => ErrorKind::Protocol(msg),
        }
    }
}

impl From<EthError> for ErrorKind {
    fn from(e: EthError) -> Self {
        match e {
            EthError::InvalidPrivateKey(_) | EthError::InvalidAddress(_) => {
                ErrorKind::Validation(e.to_string())
            }
            EthError::InvalidQuantity(_) | EthError::TransactionBuildError(_) => {
                ErrorKind::Protocol(e.to_string())
            }
            EthError::SigningError(msg) => ErrorKind::Signing(msg),
        }
    }
}

impl From<RpcError> for ErrorKind {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Decode(_) => ErrorKind::Protocol(e.to_string()),
            RpcError::Node(_) | RpcError::Transport(_) => ErrorKind::Transport(e.to_string()),
        }
    }
}

impl From<AmountError> for ErrorKind {
    fn from(e: AmountError) -> Self {
        ErrorKind::Validation(e.to_string())
    }
}

/// Attaches coin and step to a lower-level error.
pub(crate) trait ResultExt<T> {
    fn at(self, coin: &str, step: &'static str) -> Result<T, CoinError>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<ErrorKind>,
{
    fn at(self, coin: &str, step: &'static str) -> Result<T, CoinError> {
        self.map_err(|e| CoinError::new(coin, step, e.into()))
    }
}
