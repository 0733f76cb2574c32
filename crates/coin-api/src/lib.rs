//! Transaction construction, signing and settlement checks for a
//! multi-coin payment backend.
//!
//! Bitcoin-family coins go through the UTXO pipeline ([`BitcoinApi`]) and
//! Ethereum-family coins through the account pipeline ([`EthereumApi`]).
//! Both are reached through the [`CoinApi`] trait, handed out by a
//! [`Registry`] once the coin has been initialized.

pub mod btc;
mod context;
pub mod config;
pub mod error;
pub mod eth;
pub mod logging;
pub mod nonce;
pub mod registry;
pub mod rpc;
pub mod settings;
pub mod types;

use secrecy::SecretString;

pub use btc::BitcoinApi;
pub use error::{CoinError, ErrorKind};
pub use eth::EthereumApi;
pub use registry::{CoinBackends, Registry};
pub use settings::{load_settings, NodeConfig, RegistryOptions, Settings};
pub use types::{
    Account, Amount, ApiType, CoinTag, Family, SendReceipt, Settlement, SettlementStatus,
    SpendReceipt, SpendRequest, Transfer,
};

/// Operations every coin pipeline supports.
///
/// Calls block for the full duration of their node round trips and signer
/// invocations. Errors carry a retry hint; nothing is retried internally.
pub trait CoinApi: Send + Sync {
    fn coin(&self) -> CoinTag;

    /// UTXO coins ask the node; account coins check the hex form locally.
    fn is_valid_address(&self, address: &str) -> Result<bool, CoinError>;

    fn service_address(&self) -> String;

    /// Confirmed value held by `address`, in base units.
    fn balance(&self, address: &str) -> Result<Amount, CoinError>;

    /// Pays `amount` from the service address to `address_to`.
    fn send(&self, amount: Amount, address_to: &str) -> Result<SendReceipt, CoinError>;

    /// Spends caller-supplied inputs or nonce with a caller-held key.
    fn spend(&self, request: &SpendRequest) -> Result<SpendReceipt, CoinError>;

    /// Pays every transfer in one transaction and writes the fee back onto
    /// the first transfer.
    fn send_many(&self, batch: &mut [Transfer]) -> Result<SendReceipt, CoinError>;

    /// Probes settlement once without waiting.
    fn check(&self, tx_hash: &str, fee_estimate: Amount) -> Result<Settlement, CoinError>;

    /// Imports `private_key`, or generates a new key when `None`.
    fn create_account(&self, private_key: Option<&SecretString>) -> Result<Account, CoinError>;

    fn set_service_account(&self, account: Account) -> Result<(), CoinError>;

    /// Hex P2SH-P2WPKH redeem script for the key. UTXO coins only.
    fn redeem_script(&self, private_key: &SecretString) -> Result<String, CoinError>;

    fn api_type(&self) -> ApiType;
}
