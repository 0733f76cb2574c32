use bitcoin::Amount;
use thiserror::Error;

/// Bitcoin-family chain operation errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid fee rate: {0}")]
    InvalidFee(String),

    #[error("not enough unspent funds ({available} < {required})")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("signer identity error: {0}")]
    Identity(String),
}
