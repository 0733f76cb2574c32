//! Coin initialization and pipeline lookup.

use std::sync::{Arc, OnceLock};

use chain_btc::identity::SignerIdentity;
use chain_btc::signer::{ExternalSigner, Signer};
use parking_lot::RwLock;

use crate::btc::{BitcoinApi, UtxoCoin};
use crate::config::FamilyParams;
use crate::context::CoinContext;
use crate::error::{CoinError, ErrorKind, ResultExt};
use crate::eth::{AccountCoin, EthereumApi};
use crate::nonce::NonceStore;
use crate::rpc::{HttpTransport, RpcTransport};
use crate::settings::{NodeConfig, RegistryOptions};
use crate::types::{Account, CoinTag};
use crate::CoinApi;

/// Collaborators a coin is initialized with.
pub struct CoinBackends {
    pub transport: Arc<dyn RpcTransport>,
    /// Signer for UTXO coins. `None` runs the configured executable under
    /// the registry's signer account.
    pub signer: Option<Arc<dyn Signer>>,
}

enum Pipeline {
    Utxo(Arc<UtxoCoin>),
    Account(Arc<AccountCoin>),
}

/// Owns every initialized coin and hands out bound pipelines.
pub struct Registry {
    options: RegistryOptions,
    /// Resolved once, on the first UTXO coin that needs it.
    identity: OnceLock<SignerIdentity>,
    coins: RwLock<Vec<(CoinTag, Pipeline)>>,
}

fn parse_tag(tag: &str, step: &'static str) -> Result<CoinTag, CoinError> {
    tag.parse::<CoinTag>()
        .map_err(|e| CoinError::new(tag, step, ErrorKind::Configuration(e.to_string())))
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            options,
            identity: OnceLock::new(),
            coins: RwLock::new(Vec::new()),
        }
    }

    /// Initializes `tag` against the node at `node.url` over HTTP.
    pub fn initialize(
        &self,
        tag: &str,
        node: &NodeConfig,
        account: Account,
        test_mode: bool,
    ) -> Result<(), CoinError> {
        let coin = parse_tag(tag, "initialize")?;
        let mut transport = HttpTransport::new(node.url.as_str(), node.rpc_version_for(coin.family()))
            .at(tag, "initialize")?;
        if let Some(user) = &node.rpc_user {
            transport = transport.with_basic_auth(user, node.rpc_password.clone().unwrap_or_default());
        }

        self.initialize_with(
            tag,
            node,
            account,
            test_mode,
            CoinBackends {
                transport: Arc::new(transport),
                signer: None,
            },
        )
    }

    /// Initializes `tag` with explicit collaborators.
    ///
    /// The coin becomes available only if every step succeeds. Initializing
    /// a coin again replaces its pipeline in place.
    pub fn initialize_with(
        &self,
        tag: &str,
        node: &NodeConfig,
        account: Account,
        test_mode: bool,
        backends: CoinBackends,
    ) -> Result<(), CoinError> {
        let coin = parse_tag(tag, "initialize")?;
        let _span = tracing::info_span!("initialize", coin = %coin).entered();

        if test_mode && node.test_transaction.is_none() {
            return Err(CoinError::new(
                tag,
                "initialize",
                ErrorKind::Configuration("test mode requires a test transaction".into()),
            ));
        }

        let ctx = CoinContext {
            tag: coin,
            transport: backends.transport,
            account: RwLock::new(account),
            test_mode,
            test_transaction: node.test_transaction.clone(),
        };

        let pipeline = match coin.params().family {
            FamilyParams::Utxo(params) => {
                let injected = backends.signer;
                let utxo = UtxoCoin::initialize(ctx, params, || match injected {
                    Some(signer) => Ok(signer),
                    None => self.external_signer(coin, node),
                })?;
                Pipeline::Utxo(Arc::new(utxo))
            }
            FamilyParams::Account(params) => {
                let store = NonceStore::for_coin(&self.options.nonce_dir, coin);
                let account =
                    AccountCoin::initialize(ctx, params, store, self.options.nonce_policy)?;
                Pipeline::Account(Arc::new(account))
            }
        };

        let mut coins = self.coins.write();
        match coins.iter_mut().find(|(t, _)| *t == coin) {
            Some(entry) => entry.1 = pipeline,
            None => coins.push((coin, pipeline)),
        }
        tracing::info!(test_mode, "coin initialized");
        Ok(())
    }

    fn external_signer(&self, coin: CoinTag, node: &NodeConfig) -> Result<Arc<dyn Signer>, CoinError> {
        let configuration = |msg: String| {
            CoinError::new(coin.as_str(), "initialize", ErrorKind::Configuration(msg))
        };

        let program = node
            .signer
            .as_ref()
            .ok_or_else(|| configuration("no signer configured".into()))?;
        let signer = ExternalSigner::new(program, None);
        signer.check_available().map_err(|e| configuration(e.to_string()))?;

        let identity = self.signer_identity(coin)?;
        tracing::debug!(
            signer = %program.display(),
            uid = identity.uid,
            gid = identity.gid,
            "external signer ready"
        );
        Ok(Arc::new(ExternalSigner::new(program, Some(identity))))
    }

    /// Looks up the signer account once; failures are not cached.
    fn signer_identity(&self, coin: CoinTag) -> Result<SignerIdentity, CoinError> {
        if let Some(identity) = self.identity.get() {
            return Ok(*identity);
        }
        let identity = SignerIdentity::lookup_in(&self.options.passwd_path, &self.options.signer_account)
            .at(coin.as_str(), "initialize")?;
        Ok(*self.identity.get_or_init(|| identity))
    }

    /// A pipeline for `tag` whose log lines carry `correlation_id`.
    pub fn api(&self, tag: &str, correlation_id: &str) -> Result<Box<dyn CoinApi>, CoinError> {
        let coin = parse_tag(tag, "api")?;
        let coins = self.coins.read();
        let Some((_, pipeline)) = coins.iter().find(|(t, _)| *t == coin) else {
            return Err(CoinError::new(tag, "api", ErrorKind::NotInitialized));
        };
        Ok(match pipeline {
            Pipeline::Utxo(c) => Box::new(BitcoinApi::new(c.clone(), correlation_id)),
            Pipeline::Account(c) => Box::new(EthereumApi::new(c.clone(), correlation_id)),
        })
    }

    /// Initialized coins, in initialization order.
    pub fn available(&self) -> Vec<CoinTag> {
        self.coins.read().iter().map(|(tag, _)| *tag).collect()
    }

    /// Next nonce an account coin will send with.
    pub fn next_nonce(&self, tag: CoinTag) -> Option<u64> {
        self.coins.read().iter().find_map(|(t, pipeline)| match pipeline {
            Pipeline::Account(c) if *t == tag => Some(c.sequencer().current()),
            _ => None,
        })
    }
}
