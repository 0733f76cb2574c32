use std::sync::LazyLock;

use alloy_primitives::Address;
use k256::ecdsa::SigningKey;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Keccak256};
use zeroize::{Zeroize, Zeroizing};

use crate::error::EthError;

static HEX_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^0x[0-9a-fA-F]{40}$").expect("static pattern"));

/// Syntactic address check: `0x` followed by exactly 40 hex digits.
///
/// Mixed-case input is accepted without verifying the EIP-55 checksum.
pub fn is_hex_address(address: &str) -> bool {
    HEX_ADDRESS.is_match(address)
}

/// Parses a `0x`-prefixed hex address.
pub fn parse_address(address: &str) -> Result<Address, EthError> {
    if !is_hex_address(address) {
        return Err(EthError::InvalidAddress(format!(
            "address [{address}] is not valid for Ethereum"
        )));
    }
    address
        .parse()
        .map_err(|e| EthError::InvalidAddress(format!("{address}: {e}")))
}

/// Derives the EIP-55 checksummed address controlled by `key`.
///
/// The address is the last 20 bytes of the Keccak-256 hash of the 64-byte
/// uncompressed public key (without the 0x04 prefix).
pub fn address_from_key(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..]).to_checksum(None)
}

/// Parses a hex private key, with or without `0x`.
pub fn signing_key_from_hex(key: &SecretString) -> Result<SigningKey, EthError> {
    let text = key.expose_secret().trim();
    let hex_part = text.strip_prefix("0x").unwrap_or(text);

    let bytes = Zeroizing::new(
        hex::decode(hex_part)
            .map_err(|e| EthError::InvalidPrivateKey(format!("invalid hex: {e}")))?,
    );
    if bytes.len() != 32 {
        return Err(EthError::InvalidPrivateKey(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    SigningKey::from_slice(&bytes).map_err(|e| EthError::InvalidPrivateKey(e.to_string()))
}

/// Generates a fresh random key.
pub fn generate_key() -> SigningKey {
    SigningKey::random(&mut rand::rngs::OsRng)
}

/// Lowercase hex encoding of the key without `0x`.
pub fn key_to_hex(key: &SigningKey) -> SecretString {
    let mut bytes: [u8; 32] = key.to_bytes().into();
    let encoded = hex::encode(bytes);
    bytes.zeroize();
    SecretString::from(encoded)
}
