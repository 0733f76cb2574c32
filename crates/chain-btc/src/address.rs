use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::keys::WifKey;
use crate::network::NetworkVersions;

/// OP_0, the witness version 0 opcode.
const OP_0: u8 = 0x00;

/// Push of a 20-byte hash.
const PUSH_20: u8 = 0x14;

/// Compute Hash160 (RIPEMD-160(SHA-256(data))).
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Builds the P2WPKH witness program `OP_0 <hash160(pubkey)>` that serves as
/// the redeem script of a P2SH-wrapped SegWit address.
pub fn redeem_script(pubkey_compressed: &[u8; 33]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(OP_0);
    script.push(PUSH_20);
    script.extend_from_slice(&hash160(pubkey_compressed));
    script
}

/// Hex-encoded redeem script for the key behind a WIF string.
pub fn redeem_script_hex(key: &WifKey) -> String {
    hex::encode(redeem_script(&key.public_key_compressed()))
}

/// Legacy pay-to-pubkey-hash address for the network's version prefix.
pub fn p2pkh_address(pubkey_compressed: &[u8; 33], versions: &NetworkVersions) -> String {
    base58check(versions.pubkey_hash, &hash160(pubkey_compressed))
}

/// Pay-to-script-hash address wrapping the key's P2WPKH redeem script.
pub fn p2sh_p2wpkh_address(pubkey_compressed: &[u8; 33], versions: &NetworkVersions) -> String {
    let script = redeem_script(pubkey_compressed);
    base58check(versions.script_hash, &hash160(&script))
}

fn base58check(prefix: &[u8], hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(prefix.len() + 20);
    payload.extend_from_slice(prefix);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{BITCOIN, DASH, ZCASH};

    /// Compressed public key of private key 1.
    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn g() -> [u8; 33] {
        hex::decode(G).unwrap().try_into().unwrap()
    }

    #[test]
    fn hash160_of_generator() {
        assert_eq!(
            hex::encode(hash160(&g())),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn redeem_script_is_witness_v0_program() {
        let script = redeem_script(&g());
        assert_eq!(script.len(), 22);
        assert_eq!(&script[..2], &[0x00, 0x14]);
        assert_eq!(
            hex::encode(&script),
            "0014751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn p2pkh_mainnet_test_vector() {
        assert_eq!(
            p2pkh_address(&g(), &BITCOIN),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
    }

    #[test]
    fn p2sh_p2wpkh_mainnet_test_vector() {
        assert_eq!(
            p2sh_p2wpkh_address(&g(), &BITCOIN),
            "3JvL6Ymt8MVWiCNHC7oWU6nLeHNJKLZGLN"
        );
    }

    #[test]
    fn zcash_transparent_prefixes() {
        assert!(p2pkh_address(&g(), &ZCASH).starts_with("t1"));
        assert!(p2sh_p2wpkh_address(&g(), &ZCASH).starts_with("t3"));
    }

    #[test]
    fn dash_p2pkh_starts_with_x() {
        assert!(p2pkh_address(&g(), &DASH).starts_with('X'));
    }

    #[test]
    fn redeem_script_hex_from_wif() {
        let key = WifKey::decode("KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn").unwrap();
        assert_eq!(
            redeem_script_hex(&key),
            "0014751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }
}
