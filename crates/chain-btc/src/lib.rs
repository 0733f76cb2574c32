//! Bitcoin-family chain support for the payment core.
//!
//! Provides WIF keys with per-coin version bytes, P2PKH and P2SH-wrapped
//! P2WPKH address derivation, unspent-output selection, output planning for
//! single and batched sends, and the signer port used to sign raw
//! transactions outside the network-facing process.

pub mod address;
pub mod error;
pub mod identity;
pub mod keys;
pub mod network;
pub mod signer;
pub mod transaction;
pub mod utxo;
