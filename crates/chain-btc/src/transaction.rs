use std::collections::BTreeMap;

use bitcoin::{Amount, Denomination};
use serde::Serialize;
use serde_json::Value;

use crate::error::BtcError;
use crate::utxo::Utxo;

/// Destination address to amount, one entry per distinct address.
pub type OutputMap = BTreeMap<String, Amount>;

/// Parses a per-output fee rate written in whole coins ("0.00001").
pub fn parse_fee_rate(fee: &str) -> Result<Amount, BtcError> {
    Amount::from_str_in(fee.trim(), Denomination::Bitcoin)
        .map_err(|e| BtcError::InvalidFee(format!("fee [{fee}] is invalid: {e}")))
}

/// Merges transfers to the same address into a single output.
pub fn aggregate_destinations<'a, I>(transfers: I) -> Result<OutputMap, BtcError>
where
    I: IntoIterator<Item = (&'a str, Amount)>,
{
    let mut outputs = OutputMap::new();
    for (address, amount) in transfers {
        let entry = outputs.entry(address.to_string()).or_insert(Amount::ZERO);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| BtcError::TransactionBuildError("output amount overflow".into()))?;
    }
    Ok(outputs)
}

/// Batch fee: the per-output rate times the number of distinct destinations.
pub fn batch_fee(fee_rate: Amount, distinct_outputs: usize) -> Result<Amount, BtcError> {
    fee_rate
        .checked_mul(distinct_outputs as u64)
        .ok_or_else(|| BtcError::TransactionBuildError("fee overflow".into()))
}

/// Adds a change output when the selected inputs exceed what is required.
///
/// Change is paid only when strictly positive. If the change address is also
/// a destination the two amounts are merged, since a raw transaction cannot
/// name the same address twice.
pub fn add_change(
    outputs: &mut OutputMap,
    input_total: Amount,
    required: Amount,
    change_address: &str,
) -> Result<Amount, BtcError> {
    let change = input_total.checked_sub(required).ok_or_else(|| {
        BtcError::InsufficientFunds {
            available: input_total,
            required,
        }
    })?;

    if change > Amount::ZERO {
        let entry = outputs.entry(change_address.to_string()).or_insert(Amount::ZERO);
        *entry += change;
        tracing::debug!(address = change_address, change = %change, "+output (change)");
    }

    Ok(change)
}

/// Outpoint reference passed to `createrawtransaction`.
#[derive(Debug, Clone, Serialize)]
pub struct RawInput<'a> {
    pub txid: &'a str,
    pub vout: u32,
}

/// Previous-output descriptor handed to the signer for each input.
#[derive(Debug, Clone, Serialize)]
pub struct PrevTx<'a> {
    pub txid: &'a str,
    pub vout: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: &'a str,
    #[serde(rename = "redeemScript")]
    pub redeem_script: &'a str,
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub amount: Amount,
}

#[derive(Serialize)]
struct BtcValue(#[serde(with = "bitcoin::amount::serde::as_btc")] Amount);

/// Parameters of `createrawtransaction [inputs, outputs]`.
pub fn create_raw_params(inputs: &[Utxo], outputs: &OutputMap) -> Result<Value, BtcError> {
    let raw_inputs: Vec<RawInput<'_>> = inputs
        .iter()
        .map(|u| RawInput {
            txid: &u.txid,
            vout: u.vout,
        })
        .collect();
    let raw_outputs: BTreeMap<&str, BtcValue> = outputs
        .iter()
        .map(|(addr, amount)| (addr.as_str(), BtcValue(*amount)))
        .collect();

    serde_json::to_value((raw_inputs, raw_outputs))
        .map_err(|e| BtcError::TransactionBuildError(format!("encode outputs: {e}")))
}

/// Previous-output descriptors for the given inputs.
pub fn prev_txs(inputs: &[Utxo]) -> Vec<PrevTx<'_>> {
    inputs
        .iter()
        .map(|u| PrevTx {
            txid: &u.txid,
            vout: u.vout,
            script_pubkey: &u.script_pubkey,
            redeem_script: &u.redeem_script,
            amount: u.amount,
        })
        .collect()
}

/// Sum of output values.
pub fn output_total(outputs: &OutputMap) -> Amount {
    outputs.values().copied().sum()
}
