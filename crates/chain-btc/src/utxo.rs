use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::error::BtcError;

/// An unspent output as reported by the node's `listunspent`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub address: String,
    #[serde(rename = "scriptPubKey", default)]
    pub script_pubkey: String,
    /// Computed locally from the spending key before the output is used.
    #[serde(rename = "redeemScript", default)]
    pub redeem_script: String,
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub amount: Amount,
    #[serde(default)]
    pub confirmations: u32,
    #[serde(default)]
    pub spendable: bool,
}

/// Result of UTXO selection: the chosen UTXOs and their aggregate value.
#[derive(Debug, Clone)]
pub struct UtxoSelection {
    pub selected: Vec<Utxo>,
    pub total: Amount,
}

/// Sum of every output that meets the confirmation threshold.
pub fn confirmed_balance(utxos: &[Utxo], min_confirmations: u32) -> Amount {
    utxos
        .iter()
        .filter(|u| u.confirmations >= min_confirmations)
        .map(|u| u.amount)
        .sum()
}

/// Accumulates outputs in node order until `required` is covered.
///
/// Outputs below `min_confirmations` are skipped. Each selected output gets
/// `redeem_script` attached so the signer can spend the P2SH wrapper. The
/// `spendable` flag is ignored: a watch-only node reports its outputs as not
/// spendable even though the offline key can sign for them.
pub fn select_utxos(
    candidates: Vec<Utxo>,
    required: Amount,
    min_confirmations: u32,
    redeem_script: &str,
) -> Result<UtxoSelection, BtcError> {
    let mut selected = Vec::new();
    let mut total = Amount::ZERO;

    for mut utxo in candidates {
        if utxo.confirmations < min_confirmations {
            continue;
        }

        utxo.redeem_script = redeem_script.to_string();
        total += utxo.amount;

        tracing::debug!(txid = %utxo.txid, vout = utxo.vout, amount = %utxo.amount, total = %total, "+input");
        selected.push(utxo);

        if total >= required {
            return Ok(UtxoSelection { selected, total });
        }
    }

    Err(BtcError::InsufficientFunds {
        available: total,
        required,
    })
}
