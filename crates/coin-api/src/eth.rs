//! Account pipeline for Ethereum-family coins.
//!
//! Transactions are legacy EIP-155 value transfers signed in-process. `send`
//! draws its nonce from the coin's [`NonceSequencer`]; `spend` signs with the
//! nonce its caller supplies and never touches the sequencer.

use std::collections::BTreeMap;
use std::sync::Arc;

use chain_eth::address::{
    address_from_key, generate_key, is_hex_address, key_to_hex, parse_address,
    signing_key_from_hex,
};
use chain_eth::chains::EvmChain;
use chain_eth::gas::{
    cap_gas_price, parse_quantity, wei_to_gwei_string, GasPrice, GAS_LIMIT_STRICT,
    GAS_LIMIT_TRANSFER,
};
use chain_eth::receipt::{ReceiptOutcome, TransactionReceipt};
use chain_eth::retry::is_retryable;
use chain_eth::transaction::{LegacyTransaction, SignedEthTransaction};
use secrecy::SecretString;
use serde_json::{json, Value};

use crate::config::AccountParams;
use crate::context::CoinContext;
use crate::error::{CoinError, ErrorKind, ResultExt};
use crate::nonce::{reconcile, NoncePolicy, NonceSequencer, NonceStore};
use crate::rpc::call_typed;
use crate::types::{
    Account, Amount, ApiType, CoinTag, Settlement, SettlementStatus, SendReceipt, SpendReceipt,
    SpendRequest, Transfer,
};
use crate::CoinApi;

/// An initialized account coin.
pub(crate) struct AccountCoin {
    ctx: CoinContext,
    chain: &'static EvmChain,
    sequencer: NonceSequencer,
}

impl AccountCoin {
    /// Seeds the nonce from the node's pending count and the nonce file.
    pub(crate) fn initialize(
        ctx: CoinContext,
        params: AccountParams,
        store: NonceStore,
        policy: NoncePolicy,
    ) -> Result<Self, CoinError> {
        let address = ctx.service_address();
        let node_nonce = pending_nonce(&ctx, &address)?;

        let cached = match store.load() {
            Ok(nonce) => Some(nonce),
            Err(e) => {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    node_nonce,
                    "nonce file unusable, using node nonce"
                );
                None
            }
        };
        let nonce = reconcile(ctx.tag, node_nonce, cached, policy);
        tracing::info!(address = %address, nonce, "nonce initialized");

        Ok(Self {
            sequencer: NonceSequencer::new(ctx.tag, nonce, store),
            chain: params.chain,
            ctx,
        })
    }

    pub(crate) fn sequencer(&self) -> &NonceSequencer {
        &self.sequencer
    }
}

fn pending_nonce(ctx: &CoinContext, address: &str) -> Result<u64, CoinError> {
    let count: String = ctx.call("eth_getTransactionCount", json!([address, "pending"]))?;
    let count = parse_quantity(&count).at(ctx.tag.as_str(), "eth_getTransactionCount")?;
    u64::try_from(count).map_err(|_| {
        ctx.error(
            "eth_getTransactionCount",
            ErrorKind::Protocol(format!("nonce {count} out of range")),
        )
    })
}

/// Ethereum-family implementation of [`CoinApi`].
pub struct EthereumApi {
    coin: Arc<AccountCoin>,
    id: String,
}

impl EthereumApi {
    pub(crate) fn new(coin: Arc<AccountCoin>, id: impl Into<String>) -> Self {
        Self {
            coin,
            id: id.into(),
        }
    }

    fn span(&self, id: &str) -> tracing::Span {
        tracing::info_span!("coin", coin = %self.coin.ctx.tag, id = %id)
    }

    fn ctx(&self) -> &CoinContext {
        &self.coin.ctx
    }

    fn tag(&self) -> &'static str {
        self.coin.ctx.tag.as_str()
    }

    /// Node quote capped to the chain's ceiling.
    fn gas_price(&self) -> Result<GasPrice, CoinError> {
        let quoted: String = self.ctx().call("eth_gasPrice", json!([]))?;
        let quoted = parse_quantity(&quoted).at(self.tag(), "eth_gasPrice")?;
        let gas = cap_gas_price(quoted, self.coin.chain.gas_price_ceiling);
        if gas.is_capped() {
            tracing::warn!(
                quoted_gwei = %wei_to_gwei_string(gas.quoted),
                ceiling_gwei = %wei_to_gwei_string(gas.price),
                "gas price capped"
            );
        }
        Ok(gas)
    }

    fn balance_of(&self, address: &str) -> Result<Amount, CoinError> {
        let balance: String = self.ctx().call("eth_getBalance", json!([address, "latest"]))?;
        let wei = parse_quantity(&balance).at(self.tag(), "eth_getBalance")?;
        Ok(Amount::from_base_units(wei))
    }

    /// Sends the signed transaction, classifying node errors for retry.
    fn broadcast(&self, signed: &SignedEthTransaction) -> Result<String, CoinError> {
        match call_typed::<String>(
            self.ctx().transport.as_ref(),
            "eth_sendRawTransaction",
            json!([signed.raw_hex()]),
        ) {
            Ok(tx_hash) => Ok(tx_hash),
            Err(e) => {
                let retryable = e.payload().is_some_and(is_retryable);
                tracing::warn!(error = %e, retryable, "broadcast rejected");
                Err(self
                    .ctx()
                    .error("eth_sendRawTransaction", e.into())
                    .with_retryable(retryable))
            }
        }
    }

    /// Build, sign, broadcast and persist under the coin's nonce lock.
    ///
    /// In test mode the pinned transaction id is returned and the nonce is
    /// neither advanced nor written to the nonce file.
    fn send_from_service(&self, amount: Amount, address_to: &str) -> Result<SendReceipt, CoinError> {
        if amount.is_zero() {
            return Err(self
                .ctx()
                .error("send", ErrorKind::Validation("amount must be positive".into())));
        }
        let to = parse_address(address_to).at(self.tag(), "send")?;

        let account = self.ctx().account.read();
        let key = signing_key_from_hex(&account.private_key).map_err(|e| {
            self.ctx()
                .error("send", ErrorKind::Configuration(format!("service key: {e}")))
        })?;
        let gas = self.gas_price()?;

        let reservation = self.coin.sequencer.reserve();
        let nonce = reservation.nonce();
        let tx = LegacyTransaction::transfer(
            self.coin.chain.chain_id,
            nonce,
            to,
            amount.base_units(),
            gas.price,
            GAS_LIMIT_TRANSFER,
        );
        let signed = tx.sign(&key).at(self.tag(), "sign")?;
        tracing::debug!(nonce, tx_hash = %signed.tx_hash, raw = %signed.raw_hex(), "signed transaction");

        let tx_hash = if self.ctx().test_mode {
            self.ctx().pinned_transaction()?
        } else {
            let tx_hash = self.broadcast(&signed)?;
            reservation.commit();
            tx_hash
        };
        tracing::info!(
            tx_hash = %tx_hash,
            nonce,
            amount = %amount,
            gas_price_gwei = %wei_to_gwei_string(gas.price),
            "sent"
        );

        Ok(SendReceipt {
            tx_hash,
            fee: Amount::from_base_units(gas.price),
        })
    }
}

impl CoinApi for EthereumApi {
    fn coin(&self) -> CoinTag {
        self.coin.ctx.tag
    }

    fn is_valid_address(&self, address: &str) -> Result<bool, CoinError> {
        Ok(is_hex_address(address))
    }

    fn service_address(&self) -> String {
        self.ctx().service_address()
    }

    fn balance(&self, address: &str) -> Result<Amount, CoinError> {
        let _span = self.span(&self.id).entered();
        self.balance_of(address)
    }

    fn send(&self, amount: Amount, address_to: &str) -> Result<SendReceipt, CoinError> {
        let _span = self.span(&self.id).entered();
        self.send_from_service(amount, address_to)
    }

    fn spend(&self, request: &SpendRequest) -> Result<SpendReceipt, CoinError> {
        let _span = self.span(&self.id).entered();
        let to = parse_address(&request.address_to).at(self.tag(), "spend")?;
        parse_address(&request.address_from).at(self.tag(), "spend")?;
        let key = signing_key_from_hex(&request.private_key).at(self.tag(), "spend")?;

        let balance = self.balance_of(&request.address_from)?;
        if balance.is_zero() {
            return Err(self.ctx().error(
                "spend",
                ErrorKind::Validation(format!("address [{}] has no balance", request.address_from)),
            ));
        }

        let gas = self.gas_price()?;
        let fee = Amount::from_base_units(gas.fee(GAS_LIMIT_STRICT).at(self.tag(), "spend")?);
        let value = match balance.checked_sub(fee) {
            Some(value) if !value.is_zero() => value,
            _ => {
                return Err(self.ctx().error(
                    "spend",
                    ErrorKind::Funds(format!("balance {balance} does not cover fee {fee}")),
                ))
            }
        };

        let tx = LegacyTransaction::transfer(
            self.coin.chain.chain_id,
            request.nonce,
            to,
            value.base_units(),
            gas.price,
            GAS_LIMIT_STRICT,
        );
        let signed = tx.sign(&key).at(self.tag(), "sign")?;
        tracing::debug!(nonce = request.nonce, tx_hash = %signed.tx_hash, "signed transaction");

        let tx_hash = if self.ctx().test_mode {
            self.ctx().pinned_transaction()?
        } else {
            self.broadcast(&signed)?
        };
        tracing::info!(
            tx_hash = %tx_hash,
            from = %request.address_from,
            nonce = request.nonce,
            value = %value,
            "spent"
        );

        Ok(SpendReceipt {
            tx_hash,
            amount: balance,
            fee: Amount::from_base_units(gas.price),
        })
    }

    fn send_many(&self, batch: &mut [Transfer]) -> Result<SendReceipt, CoinError> {
        let Some(first) = batch.first() else {
            let _span = self.span(&self.id).entered();
            return Err(self
                .ctx()
                .error("sendmany", ErrorKind::Validation("empty batch".into())));
        };
        let _span = self.span(&first.id).entered();

        let mut destinations: BTreeMap<&str, Amount> = BTreeMap::new();
        for transfer in batch.iter() {
            let entry = destinations.entry(transfer.address.as_str()).or_default();
            *entry = entry.checked_add(transfer.amount).ok_or_else(|| {
                self.ctx()
                    .error("sendmany", ErrorKind::Validation("amount overflow".into()))
            })?;
        }
        let out_limit = self.ctx().tag.params().out_limit;
        if destinations.len() > out_limit {
            return Err(self.ctx().error(
                "sendmany",
                ErrorKind::Validation(format!(
                    "{} destinations, at most {out_limit} per transaction",
                    destinations.len()
                )),
            ));
        }

        let (address, amount) = destinations
            .into_iter()
            .next()
            .map(|(address, amount)| (address.to_string(), amount))
            .ok_or_else(|| {
                self.ctx()
                    .error("sendmany", ErrorKind::Validation("empty batch".into()))
            })?;
        let receipt = self.send_from_service(amount, &address)?;

        for (i, transfer) in batch.iter_mut().enumerate() {
            transfer.fee_charged = if i == 0 { receipt.fee } else { Amount::ZERO };
        }
        Ok(receipt)
    }

    fn check(&self, tx_hash: &str, fee_estimate: Amount) -> Result<Settlement, CoinError> {
        let _span = self.span(&self.id).entered();
        let reply: Value = self
            .ctx()
            .call("eth_getTransactionReceipt", json!([tx_hash]))?;
        if reply.is_null() {
            tracing::debug!(tx_hash, "no receipt yet");
            return Ok(Settlement {
                status: SettlementStatus::Pending,
                fee: fee_estimate,
            });
        }

        let receipt: TransactionReceipt = serde_json::from_value(reply).map_err(|e| {
            self.ctx()
                .error("eth_getTransactionReceipt", ErrorKind::Protocol(e.to_string()))
        })?;
        match receipt.outcome().at(self.tag(), "eth_getTransactionReceipt")? {
            ReceiptOutcome::Pending => Ok(Settlement {
                status: SettlementStatus::Pending,
                fee: fee_estimate,
            }),
            ReceiptOutcome::Mined { success, gas_used } => {
                let fee = fee_estimate.checked_mul(gas_used).ok_or_else(|| {
                    self.ctx()
                        .error("check", ErrorKind::Protocol("fee overflow".into()))
                })?;
                tracing::debug!(
                    tx_hash,
                    success,
                    gas_used = %gas_used,
                    fee = %fee.to_decimal_string(self.coin.chain.decimals),
                    "receipt"
                );
                Ok(Settlement {
                    status: if success {
                        SettlementStatus::Settled
                    } else {
                        SettlementStatus::Failed
                    },
                    fee,
                })
            }
        }
    }

    fn create_account(&self, private_key: Option<&SecretString>) -> Result<Account, CoinError> {
        let key = match private_key {
            Some(hex_key) => signing_key_from_hex(hex_key).at(self.tag(), "createaccount")?,
            None => generate_key(),
        };
        Ok(Account {
            address: address_from_key(&key),
            private_key: key_to_hex(&key),
        })
    }

    /// Switches the service account and re-reads its nonce from the node.
    ///
    /// The account is only replaced when the nonce could be re-synchronized.
    fn set_service_account(&self, account: Account) -> Result<(), CoinError> {
        let _span = self.span(&self.id).entered();
        let mut current = self.ctx().account.write();
        let nonce = match pending_nonce(self.ctx(), &account.address) {
            Ok(nonce) => nonce,
            Err(e) => {
                tracing::error!(address = %account.address, error = %e, "nonce re-sync failed");
                return Err(e);
            }
        };
        self.coin.sequencer.reset(nonce);
        tracing::info!(address = %account.address, nonce, "service account replaced");
        *current = account;
        Ok(())
    }

    fn redeem_script(&self, _private_key: &SecretString) -> Result<String, CoinError> {
        Err(self
            .ctx()
            .error("redeemscript", ErrorKind::OperationNotSupported))
    }

    fn api_type(&self) -> ApiType {
        ApiType::EthereumApi
    }
}
