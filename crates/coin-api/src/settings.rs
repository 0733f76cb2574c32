//! TOML settings for the coin registry.
//!
//! ```toml
//! nonce_dir = "/var/lib/payserv"
//! signer_account = "nobody"
//! nonce_policy = "prefer-cached"
//! test_mode = false
//!
//! [coins.BTC]
//! url = "http://127.0.0.1:8332"
//! rpc_user = "payserv"
//! rpc_password = "..."
//! signer = "/usr/local/bin/bitcoin-tx"
//!
//! [coins.ETH]
//! url = "http://127.0.0.1:8545"
//! rpc_version = "2.0"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chain_btc::identity::{DEFAULT_SIGNER_ACCOUNT, PASSWD_PATH};
use serde::Deserialize;
use thiserror::Error;

use crate::nonce::NoncePolicy;
use crate::rpc::RpcVersion;
use crate::types::{CoinTag, Family};

pub const DEFAULT_NONCE_DIR: &str = "/var/lib/payserv";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_nonce_dir")]
    pub nonce_dir: PathBuf,
    /// OS account the external signer runs as.
    #[serde(default = "default_signer_account")]
    pub signer_account: String,
    #[serde(default)]
    pub nonce_policy: NoncePolicy,
    /// Replace broadcasts with each coin's `test_transaction`.
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub coins: BTreeMap<String, NodeConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nonce_dir: default_nonce_dir(),
            signer_account: default_signer_account(),
            nonce_policy: NoncePolicy::default(),
            test_mode: false,
            coins: BTreeMap::new(),
        }
    }
}

/// How to reach one coin's node and signer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub url: String,
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    /// External signer executable (UTXO coins).
    #[serde(default)]
    pub signer: Option<PathBuf>,
    /// Transaction id returned instead of broadcasting in test mode.
    #[serde(default)]
    pub test_transaction: Option<String>,
    /// Defaults to the dialect of the coin's family.
    #[serde(default)]
    pub rpc_version: Option<RpcVersion>,
}

impl NodeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn rpc_version_for(&self, family: Family) -> RpcVersion {
        self.rpc_version.unwrap_or(match family {
            Family::Utxo => RpcVersion::V1,
            Family::Account => RpcVersion::V2,
        })
    }
}

fn default_nonce_dir() -> PathBuf {
    PathBuf::from(DEFAULT_NONCE_DIR)
}

fn default_signer_account() -> String {
    DEFAULT_SIGNER_ACCOUNT.to_string()
}

/// Registry-wide options derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub nonce_dir: PathBuf,
    pub signer_account: String,
    pub nonce_policy: NoncePolicy,
    /// Account database the signer identity is looked up in.
    pub passwd_path: PathBuf,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for RegistryOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            nonce_dir: settings.nonce_dir.clone(),
            signer_account: settings.signer_account.clone(),
            nonce_policy: settings.nonce_policy,
            passwd_path: PathBuf::from(PASSWD_PATH),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

/// Reads, parses and validates a settings file.
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = std::fs::read_to_string(path)?;
    parse_settings(&content)
}

pub fn parse_settings(content: &str) -> Result<Settings, SettingsError> {
    let settings: Settings = toml::from_str(content)?;
    validate(&settings).map_err(SettingsError::Validation)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if settings.signer_account.trim().is_empty() {
        errors.push("signer_account is empty".to_string());
    }

    for (key, node) in &settings.coins {
        let tag = match key.parse::<CoinTag>() {
            Ok(tag) => tag,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            }
        };
        if node.url.trim().is_empty() {
            errors.push(format!("{tag}: url is empty"));
        }
        if tag.family() == Family::Utxo && node.signer.is_none() {
            errors.push(format!("{tag}: signer is required"));
        }
        if settings.test_mode && node.test_transaction.is_none() {
            errors.push(format!("{tag}: test_transaction is required in test mode"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
