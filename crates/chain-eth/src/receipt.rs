use serde::Deserialize;

use crate::error::EthError;
use crate::gas::parse_quantity;

/// Fields of `eth_getTransactionReceipt` the settlement check reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Outcome of a mined or pending transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    /// Not yet in a block.
    Pending,
    Mined { success: bool, gas_used: u128 },
}

impl TransactionReceipt {
    /// Interprets the receipt. Any status other than `0x0` counts as success,
    /// which also covers pre-Byzantium receipts without a status field.
    pub fn outcome(&self) -> Result<ReceiptOutcome, EthError> {
        match self.block_number.as_deref() {
            None | Some("") => return Ok(ReceiptOutcome::Pending),
            Some(_) => {}
        }

        let gas_used = match self.gas_used.as_deref() {
            Some(value) => parse_quantity(value)?,
            None => return Err(EthError::InvalidQuantity("receipt without gasUsed".into())),
        };
        let success = self.status.as_deref() != Some("0x0");

        Ok(ReceiptOutcome::Mined { success, gas_used })
    }
}
