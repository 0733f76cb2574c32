use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::BtcError;

/// Marker byte appended to the WIF payload when the public key is compressed.
const COMPRESSED_MARKER: u8 = 0x01;

/// A private key decoded from Wallet Import Format.
pub struct WifKey {
    secret: SecretKey,
    /// Version byte the key was encoded with.
    pub version: u8,
    pub compressed: bool,
}

impl WifKey {
    /// Generates a fresh random key for the given WIF version.
    pub fn generate(version: u8) -> Self {
        let secret = SecretKey::new(&mut rand::thread_rng());
        Self {
            secret,
            version,
            compressed: true,
        }
    }

    /// Decodes a Base58Check WIF string.
    ///
    /// The version byte is recorded but not enforced, so a key exported by
    /// one bitcoind fork can be imported under another's parameters.
    pub fn decode(wif: &str) -> Result<Self, BtcError> {
        let payload = Zeroizing::new(
            bs58::decode(wif.trim())
                .with_check(None)
                .into_vec()
                .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid base58check: {e}")))?,
        );

        let compressed = match payload.len() {
            33 => false,
            34 if payload[33] == COMPRESSED_MARKER => true,
            34 => {
                return Err(BtcError::InvalidPrivateKey(
                    "invalid compression marker".into(),
                ))
            }
            n => {
                return Err(BtcError::InvalidPrivateKey(format!(
                    "expected 33 or 34 payload bytes, got {n}"
                )))
            }
        };

        let secret = SecretKey::from_slice(&payload[1..33])
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;

        Ok(Self {
            secret,
            version: payload[0],
            compressed,
        })
    }

    /// Decodes a WIF held in a secret string.
    pub fn decode_secret(wif: &SecretString) -> Result<Self, BtcError> {
        Self::decode(wif.expose_secret())
    }

    /// Encodes the key back to WIF with its version byte.
    pub fn encode(&self) -> SecretString {
        let mut payload = Zeroizing::new(Vec::with_capacity(34));
        payload.push(self.version);
        payload.extend_from_slice(&self.secret.secret_bytes());
        if self.compressed {
            payload.push(COMPRESSED_MARKER);
        }
        SecretString::from(bs58::encode(payload.as_slice()).with_check().into_string())
    }

    /// The 33-byte compressed public key.
    pub fn public_key_compressed(&self) -> [u8; 33] {
        let secp = Secp256k1::signing_only();
        PublicKey::from_secret_key(&secp, &self.secret).serialize()
    }
}

impl std::fmt::Debug for WifKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifKey")
            .field("version", &self.version)
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}
