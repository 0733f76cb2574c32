//! UTXO pipeline for Bitcoin-family coins.
//!
//! Inputs are selected from the node's `listunspent` in node order, the raw
//! transaction is assembled by the node and signed through the coin's
//! [`Signer`], normally a privilege-dropped subprocess.

use std::sync::Arc;

use bitcoin::Amount as BtcAmount;
use chain_btc::address::{p2pkh_address, p2sh_p2wpkh_address, redeem_script_hex};
use chain_btc::error::BtcError;
use chain_btc::keys::WifKey;
use chain_btc::signer::{SignRequest, Signer};
use chain_btc::transaction::{
    add_change, aggregate_destinations, batch_fee, create_raw_params, output_total,
    parse_fee_rate, prev_txs, OutputMap,
};
use chain_btc::utxo::{confirmed_balance, select_utxos, Utxo};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;

use crate::config::UtxoParams;
use crate::context::CoinContext;
use crate::error::{CoinError, ErrorKind, ResultExt};
use crate::types::{
    Account, Amount, ApiType, CoinTag, Settlement, SettlementStatus, SendReceipt, SpendReceipt,
    SpendRequest, Transfer,
};
use crate::CoinApi;

/// Upper confirmation bound passed to `listunspent`.
const MAX_CONFIRMATIONS: u32 = 9_999_999;

#[derive(Debug, Default, Deserialize)]
struct AddressInfo {
    #[serde(default)]
    isvalid: bool,
    #[serde(default)]
    ismine: bool,
    #[serde(default)]
    iswatchonly: bool,
}

#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    blocks: u64,
}

#[derive(Debug, Deserialize)]
struct WalletTransaction {
    confirmations: i64,
}

/// An initialized UTXO coin.
pub(crate) struct UtxoCoin {
    ctx: CoinContext,
    params: UtxoParams,
    fee_rate: BtcAmount,
    signer: Arc<dyn Signer>,
}

impl UtxoCoin {
    /// Validates the fee rate, probes the node, then obtains the signer.
    pub(crate) fn initialize<F>(
        ctx: CoinContext,
        params: UtxoParams,
        signer: F,
    ) -> Result<Self, CoinError>
    where
        F: FnOnce() -> Result<Arc<dyn Signer>, CoinError>,
    {
        let fee_rate = parse_fee_rate(params.fee).at(ctx.tag.as_str(), "initialize")?;

        let address = ctx.service_address();
        let _: AddressInfo = ctx.call("validateaddress", json!([address]))?;

        let signer = signer()?;
        Ok(Self {
            ctx,
            params,
            fee_rate,
            signer,
        })
    }
}

/// Bitcoin-family implementation of [`CoinApi`].
pub struct BitcoinApi {
    coin: Arc<UtxoCoin>,
    id: String,
}

impl BitcoinApi {
    pub(crate) fn new(coin: Arc<UtxoCoin>, id: impl Into<String>) -> Self {
        Self {
            coin,
            id: id.into(),
        }
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!("coin", coin = %self.coin.ctx.tag, id = %self.id)
    }

    fn ctx(&self) -> &CoinContext {
        &self.coin.ctx
    }

    fn tag(&self) -> &'static str {
        self.coin.ctx.tag.as_str()
    }

    fn validate_destination(&self, address: &str) -> Result<(), CoinError> {
        if !self.is_valid_address(address)? {
            return Err(self.ctx().error(
                "validateaddress",
                ErrorKind::Validation(format!("address [{address}] is not valid")),
            ));
        }
        Ok(())
    }

    /// The node should watch the service address without holding its key.
    fn probe_ownership(&self, address: &str) -> Result<(), CoinError> {
        let method = self.coin.params.probe.method();
        let info: AddressInfo = self.ctx().call(method, json!([address]))?;
        if info.ismine {
            tracing::warn!(address, "service address key is held by the node");
        } else if !info.iswatchonly {
            return Err(self.ctx().error(
                method,
                ErrorKind::Configuration(format!(
                    "address [{address}] is unknown to the node, run importaddress"
                )),
            ));
        }
        Ok(())
    }

    fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, CoinError> {
        self.ctx().call(
            "listunspent",
            json!([self.coin.params.confirmations, MAX_CONFIRMATIONS, [address]]),
        )
    }

    fn service_key(&self, key: &SecretString) -> Result<WifKey, CoinError> {
        WifKey::decode_secret(key).map_err(|e| {
            self.ctx()
                .error("decodekey", ErrorKind::Configuration(format!("service key: {e}")))
        })
    }

    /// Selects inputs covering `required`; a shortfall is retryable since
    /// pending outputs may confirm later.
    fn select(
        &self,
        address: &str,
        required: BtcAmount,
        redeem_script: &str,
    ) -> Result<(Vec<Utxo>, BtcAmount), CoinError> {
        let candidates = self.list_unspent(address)?;
        match select_utxos(candidates, required, self.coin.params.confirmations, redeem_script) {
            Ok(selection) => Ok((selection.selected, selection.total)),
            Err(e @ BtcError::InsufficientFunds { .. }) => {
                Err(self.ctx().error("selectinputs", e.into()).with_retryable(true))
            }
            Err(e) => Err(self.ctx().error("selectinputs", e.into())),
        }
    }

    /// Assembles, signs and broadcasts a transaction spending `inputs`.
    fn assemble_sign_broadcast(
        &self,
        inputs: &[Utxo],
        outputs: &OutputMap,
        key: &SecretString,
    ) -> Result<String, CoinError> {
        let params = create_raw_params(inputs, outputs).at(self.tag(), "createrawtransaction")?;
        let unsigned: String = self.ctx().call("createrawtransaction", params)?;
        tracing::debug!(unsigned = %unsigned, "unsigned transaction");

        // Fetched right before signing: the height selects the sighash branch.
        let chain: BlockchainInfo = self.ctx().call("getblockchaininfo", json!([]))?;

        let prev = prev_txs(inputs);
        let signed = self
            .coin
            .signer
            .sign(&SignRequest {
                unsigned_tx: &unsigned,
                inputs: &prev,
                scheme: self.coin.params.network.sighash,
                height: chain.blocks,
                private_key: key,
            })
            .at(self.tag(), "sign")?;
        tracing::debug!(signed = %signed, height = chain.blocks, "signed transaction");

        if self.ctx().test_mode {
            return self.ctx().pinned_transaction();
        }
        let tx_hash: String = self.ctx().call("sendrawtransaction", json!([signed]))?;
        Ok(tx_hash)
    }

    fn btc_amount(&self, amount: Amount, step: &'static str) -> Result<BtcAmount, CoinError> {
        BtcAmount::try_from(amount).at(self.tag(), step)
    }

    fn overflow(&self, step: &'static str) -> CoinError {
        self.ctx()
            .error(step, ErrorKind::Validation("amount overflow".into()))
    }
}

impl CoinApi for BitcoinApi {
    fn coin(&self) -> CoinTag {
        self.coin.ctx.tag
    }

    fn is_valid_address(&self, address: &str) -> Result<bool, CoinError> {
        let info: AddressInfo = self.ctx().call("validateaddress", json!([address]))?;
        Ok(info.isvalid)
    }

    fn service_address(&self) -> String {
        self.ctx().service_address()
    }

    fn balance(&self, address: &str) -> Result<Amount, CoinError> {
        let _span = self.span().entered();
        let utxos = self.list_unspent(address)?;
        Ok(confirmed_balance(&utxos, self.coin.params.confirmations).into())
    }

    fn send(&self, amount: Amount, address_to: &str) -> Result<SendReceipt, CoinError> {
        let _span = self.span().entered();
        let value = self.btc_amount(amount, "send")?;
        if value == BtcAmount::ZERO {
            return Err(self
                .ctx()
                .error("send", ErrorKind::Validation("amount must be positive".into())));
        }
        self.validate_destination(address_to)?;

        let account = self.ctx().account.read();
        self.probe_ownership(&account.address)?;

        let fee = self.coin.fee_rate;
        let required = value.checked_add(fee).ok_or_else(|| self.overflow("send"))?;
        let key = self.service_key(&account.private_key)?;
        let (inputs, input_total) = self.select(&account.address, required, &redeem_script_hex(&key))?;

        let mut outputs = OutputMap::new();
        outputs.insert(address_to.to_string(), value);
        tracing::debug!(address = address_to, amount = %value, "+output");
        add_change(&mut outputs, input_total, required, &account.address).at(self.tag(), "change")?;

        let tx_hash = self.assemble_sign_broadcast(&inputs, &outputs, &account.private_key)?;
        tracing::info!(tx_hash = %tx_hash, amount = %value, fee = %fee, "sent");

        Ok(SendReceipt {
            tx_hash,
            fee: fee.into(),
        })
    }

    fn spend(&self, request: &SpendRequest) -> Result<SpendReceipt, CoinError> {
        let _span = self.span().entered();
        self.validate_destination(&request.address_to)?;
        if request.inputs.is_empty() {
            return Err(self
                .ctx()
                .error("spend", ErrorKind::Validation("no inputs to spend".into())));
        }

        let key = WifKey::decode_secret(&request.private_key).at(self.tag(), "decodekey")?;
        let script = redeem_script_hex(&key);
        let inputs: Vec<Utxo> = request
            .inputs
            .iter()
            .cloned()
            .map(|mut utxo| {
                if utxo.redeem_script.is_empty() {
                    utxo.redeem_script = script.clone();
                }
                utxo
            })
            .collect();

        let total = inputs
            .iter()
            .try_fold(BtcAmount::ZERO, |sum, u| sum.checked_add(u.amount))
            .ok_or_else(|| self.overflow("spend"))?;
        let fee = self.coin.fee_rate;
        if total <= fee {
            return Err(self.ctx().error(
                "spend",
                ErrorKind::Funds(format!("inputs ({total}) do not cover the fee ({fee})")),
            ));
        }

        let mut outputs = OutputMap::new();
        outputs.insert(request.address_to.clone(), total - fee);

        let tx_hash = self.assemble_sign_broadcast(&inputs, &outputs, &request.private_key)?;
        tracing::info!(
            tx_hash = %tx_hash,
            from = %request.address_from,
            amount = %total,
            fee = %fee,
            "spent"
        );

        Ok(SpendReceipt {
            tx_hash,
            amount: total.into(),
            fee: fee.into(),
        })
    }

    fn send_many(&self, batch: &mut [Transfer]) -> Result<SendReceipt, CoinError> {
        let _span = self.span().entered();
        if batch.is_empty() {
            return Err(self
                .ctx()
                .error("sendmany", ErrorKind::Validation("empty batch".into())));
        }

        let transfers = batch
            .iter()
            .map(|t| Ok((t.address.as_str(), self.btc_amount(t.amount, "sendmany")?)))
            .collect::<Result<Vec<_>, CoinError>>()?;
        let mut outputs = aggregate_destinations(transfers).at(self.tag(), "sendmany")?;
        let out_limit = self.ctx().tag.params().out_limit;
        if outputs.len() > out_limit {
            return Err(self.ctx().error(
                "sendmany",
                ErrorKind::Validation(format!(
                    "{} destinations exceed the limit of {out_limit}",
                    outputs.len()
                )),
            ));
        }

        let account = self.ctx().account.read();
        self.probe_ownership(&account.address)?;

        let fee = batch_fee(self.coin.fee_rate, outputs.len()).at(self.tag(), "sendmany")?;
        let required = output_total(&outputs)
            .checked_add(fee)
            .ok_or_else(|| self.overflow("sendmany"))?;
        let key = self.service_key(&account.private_key)?;
        let (inputs, input_total) = self.select(&account.address, required, &redeem_script_hex(&key))?;
        add_change(&mut outputs, input_total, required, &account.address).at(self.tag(), "change")?;

        let tx_hash = self.assemble_sign_broadcast(&inputs, &outputs, &account.private_key)?;
        tracing::info!(tx_hash = %tx_hash, outputs = outputs.len(), fee = %fee, "sent batch");

        for (i, transfer) in batch.iter_mut().enumerate() {
            transfer.fee_charged = if i == 0 { fee.into() } else { Amount::ZERO };
        }

        Ok(SendReceipt {
            tx_hash,
            fee: fee.into(),
        })
    }

    fn check(&self, tx_hash: &str, fee_estimate: Amount) -> Result<Settlement, CoinError> {
        let _span = self.span().entered();
        let tx: WalletTransaction = self.ctx().call("gettransaction", json!([tx_hash]))?;

        let status = if tx.confirmations < 0 {
            SettlementStatus::Failed
        } else if tx.confirmations >= i64::from(self.coin.params.confirmations) {
            SettlementStatus::Settled
        } else {
            SettlementStatus::Pending
        };
        tracing::debug!(tx_hash, confirmations = tx.confirmations, ?status, "checked");

        Ok(Settlement {
            status,
            fee: fee_estimate,
        })
    }

    fn create_account(&self, private_key: Option<&SecretString>) -> Result<Account, CoinError> {
        let _span = self.span().entered();
        let versions = self.coin.params.network;
        let key = match private_key {
            Some(wif) => WifKey::decode_secret(wif).at(self.tag(), "createaccount")?,
            None => WifKey::generate(versions.wif),
        };

        let pubkey = key.public_key_compressed();
        let p2pkh = p2pkh_address(&pubkey, versions);
        let p2sh = p2sh_p2wpkh_address(&pubkey, versions);
        tracing::debug!(p2pkh = %p2pkh, p2sh = %p2sh, "account addresses");

        Ok(Account {
            address: p2sh,
            private_key: key.encode(),
        })
    }

    fn set_service_account(&self, account: Account) -> Result<(), CoinError> {
        let _span = self.span().entered();
        tracing::info!(address = %account.address, "service account replaced");
        *self.ctx().account.write() = account;
        Ok(())
    }

    fn redeem_script(&self, private_key: &SecretString) -> Result<String, CoinError> {
        let key = WifKey::decode_secret(private_key).at(self.tag(), "redeemscript")?;
        Ok(redeem_script_hex(&key))
    }

    fn api_type(&self) -> ApiType {
        ApiType::BitcoinApi
    }
}
