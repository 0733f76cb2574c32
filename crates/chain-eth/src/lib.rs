//! Ethereum-family chain support for the payment core.
//!
//! This crate provides:
//! - Address derivation from secp256k1 keys (EIP-55 checksums) and the
//!   fixed-length hex address check
//! - Legacy (EIP-155 replay-protected) value transfer building and signing
//! - Gas price ceiling and fee arithmetic
//! - Transaction receipt interpretation
//! - Classification of node errors into retryable and terminal

pub mod address;
pub mod chains;
pub mod error;
pub mod gas;
pub mod receipt;
pub mod retry;
pub mod transaction;
