use alloy_primitives::{Address, Bytes, U256};
use alloy_rlp::{Encodable, RlpEncodable};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use sha3::{Digest, Keccak256};

use crate::error::EthError;

/// An unsigned legacy value transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    /// Price per gas unit in wei.
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    /// Transfer value in wei.
    pub value: u128,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub struct SignedEthTransaction {
    /// RLP-encoded signed transaction bytes.
    pub raw_tx: Vec<u8>,
    /// Transaction hash as a 0x-prefixed hex string.
    pub tx_hash: String,
}

impl SignedEthTransaction {
    /// Raw bytes as a 0x-prefixed hex string.
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw_tx))
    }
}

impl LegacyTransaction {
    /// Builds a plain value transfer.
    pub fn transfer(
        chain_id: u64,
        nonce: u64,
        to: Address,
        value: u128,
        gas_price: u128,
        gas_limit: u64,
    ) -> Self {
        Self {
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
        }
    }

    /// EIP-155 signing payload: `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let fields = SigningFields {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            data: Bytes::new(),
            chain_id: self.chain_id,
            empty_r: 0,
            empty_s: 0,
        };
        let mut buf = Vec::with_capacity(fields.length());
        fields.encode(&mut buf);
        buf
    }

    /// Signs the transaction with replay protection bound to `chain_id`.
    ///
    /// `v = chain_id * 2 + 35 + y_parity`.
    pub fn sign(&self, key: &SigningKey) -> Result<SignedEthTransaction, EthError> {
        let msg_hash = Keccak256::digest(self.signing_payload());

        let (signature, recovery_id): (Signature, RecoveryId) = key
            .sign_prehash(msg_hash.as_slice())
            .map_err(|e| EthError::SigningError(e.to_string()))?;

        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|x| x.checked_add(35 + u64::from(recovery_id.is_y_odd())))
            .ok_or_else(|| EthError::SigningError("chain id too large".into()))?;

        let signed = SignedFields {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: self.to,
            value: self.value,
            data: Bytes::new(),
            v,
            r: U256::from_be_slice(&signature.r().to_bytes()),
            s: U256::from_be_slice(&signature.s().to_bytes()),
        };

        let mut raw_tx = Vec::with_capacity(signed.length());
        signed.encode(&mut raw_tx);

        let tx_hash = format!("0x{}", hex::encode(Keccak256::digest(&raw_tx)));

        Ok(SignedEthTransaction { raw_tx, tx_hash })
    }
}

#[derive(RlpEncodable)]
struct SigningFields {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: Bytes,
    chain_id: u64,
    empty_r: u8,
    empty_s: u8,
}

#[derive(RlpEncodable)]
struct SignedFields {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: u128,
    data: Bytes,
    v: u64,
    r: U256,
    s: U256,
}
