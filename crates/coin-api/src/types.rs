use std::fmt;
use std::str::FromStr;

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::U256;
use chain_btc::utxo::Utxo;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::config::{self, CoinParams};

/// Supported coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoinTag {
    Eth,
    Etc,
    Zec,
    Btc,
    Bch,
    Rvn,
    Dash,
    Mona,
}

impl CoinTag {
    pub const ALL: [CoinTag; 8] = [
        CoinTag::Eth,
        CoinTag::Etc,
        CoinTag::Zec,
        CoinTag::Btc,
        CoinTag::Bch,
        CoinTag::Rvn,
        CoinTag::Dash,
        CoinTag::Mona,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoinTag::Eth => "ETH",
            CoinTag::Etc => "ETC",
            CoinTag::Zec => "ZEC",
            CoinTag::Btc => "BTC",
            CoinTag::Bch => "BCH",
            CoinTag::Rvn => "RVN",
            CoinTag::Dash => "DASH",
            CoinTag::Mona => "MONA",
        }
    }

    /// Compiled-in parameters for this coin.
    pub fn params(&self) -> &'static CoinParams {
        config::params(*self)
    }

    pub fn family(&self) -> Family {
        self.params().family()
    }

    /// Decimal places between the base unit and one whole coin.
    pub fn decimals(&self) -> u8 {
        self.params().decimals
    }
}

impl fmt::Display for CoinTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown coin [{0}]")]
pub struct UnknownCoin(pub String);

impl FromStr for CoinTag {
    type Err = UnknownCoin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoinTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownCoin(s.to_string()))
    }
}

/// Ledger model of a coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Unspent-output chains (Bitcoin-family).
    Utxo,
    /// Account/nonce chains (Ethereum-family).
    Account,
}

/// Pipeline reported by [`crate::CoinApi::api_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiType {
    BitcoinApi,
    EthereumApi,
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiType::BitcoinApi => f.write_str("BitcoinAPI"),
            ApiType::EthereumApi => f.write_str("EthereumAPI"),
        }
    }
}

/// Value in a coin's smallest unit (satoshi-like or wei).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("amount [{input}] is invalid: {reason}")]
pub struct AmountError {
    pub input: String,
    pub reason: String,
}

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: u128) -> Self {
        Amount(units)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u128) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }

    /// Parses a non-negative decimal such as `"0.5"` with `decimals` places.
    pub fn from_decimal_str(s: &str, decimals: u8) -> Result<Self, AmountError> {
        let fail = |reason: String| AmountError {
            input: s.to_string(),
            reason,
        };
        let trimmed = s.trim();
        if trimmed.starts_with('-') {
            return Err(fail("negative".into()));
        }
        let parsed = parse_units(trimmed, decimals).map_err(|e| fail(e.to_string()))?;
        let units = u128::try_from(parsed.get_absolute()).map_err(|_| fail("too large".into()))?;
        Ok(Amount(units))
    }

    /// Formats as a decimal without trailing zeros, e.g. `"0.49999"`.
    pub fn to_decimal_string(self, decimals: u8) -> String {
        let Ok(text) = format_units(U256::from(self.0), decimals) else {
            return self.0.to_string();
        };
        match text.split_once('.') {
            Some((whole, frac)) => {
                let frac = frac.trim_end_matches('0');
                if frac.is_empty() {
                    whole.to_string()
                } else {
                    format!("{whole}.{frac}")
                }
            }
            None => text,
        }
    }
}

impl From<bitcoin::Amount> for Amount {
    fn from(a: bitcoin::Amount) -> Self {
        Amount(u128::from(a.to_sat()))
    }
}

impl TryFrom<Amount> for bitcoin::Amount {
    type Error = AmountError;

    fn try_from(a: Amount) -> Result<Self, Self::Error> {
        u64::try_from(a.0)
            .map(bitcoin::Amount::from_sat)
            .map_err(|_| AmountError {
                input: a.0.to_string(),
                reason: "exceeds the UTXO value range".into(),
            })
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One destination of a batch send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Caller's correlation id.
    pub id: String,
    pub address: String,
    pub amount: Amount,
    /// Written back by `send_many`: the whole batch fee lands on the first
    /// transfer, every other transfer reads zero.
    pub fee_charged: Amount,
}

impl Transfer {
    pub fn new(id: impl Into<String>, address: impl Into<String>, amount: Amount) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            amount,
            fee_charged: Amount::ZERO,
        }
    }
}

/// Address and private key of a coin account.
///
/// The key is WIF for UTXO coins and 32-byte hex (no `0x`) for account coins.
pub struct Account {
    pub address: String,
    pub private_key: SecretString,
}

impl Account {
    pub fn new(address: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            private_key: SecretString::from(private_key.into()),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Result of `send` and `send_many`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub tx_hash: String,
    /// UTXO coins: the fee paid. Account coins: the gas price used.
    pub fee: Amount,
}

/// Externally coordinated spend from a caller-held key.
pub struct SpendRequest {
    pub address_from: String,
    pub address_to: String,
    /// Outputs to consume (UTXO coins only).
    pub inputs: Vec<Utxo>,
    pub private_key: SecretString,
    /// Nonce to sign with (account coins only).
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendReceipt {
    pub tx_hash: String,
    /// Value taken from the source: input sum or account balance.
    pub amount: Amount,
    pub fee: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    Settled,
    Failed,
    /// Not yet final; probe again later.
    Pending,
}

/// Outcome of one settlement probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub status: SettlementStatus,
    pub fee: Amount,
}

impl Settlement {
    pub fn is_settled(&self) -> bool {
        self.status == SettlementStatus::Settled
    }
}
