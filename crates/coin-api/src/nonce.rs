//! Per-coin nonce sequencing for account-family coins.
//!
//! The counter lives in a [`NonceSequencer`] owned by the registry. A send
//! takes a [`NonceReservation`], which holds the coin's lock until it is
//! committed or dropped, so build, sign, broadcast and persist run as one
//! serialized sequence. Only a committed reservation advances the counter.

use std::io;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::types::CoinTag;

/// Which value wins when the cached nonce and the node disagree at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoncePolicy {
    /// Keep local continuity: the nonce file wins.
    #[default]
    PreferCached,
    /// Trust the node's pending transaction count.
    PreferNode,
}

/// Fixed-width nonce file: one little-endian `u64`.
#[derive(Debug, Clone)]
pub struct NonceStore {
    path: PathBuf,
}

impl NonceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<TAG>.nonce`
    pub fn for_coin(dir: &Path, coin: CoinTag) -> Self {
        Self::new(dir.join(format!("{coin}.nonce")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached nonce. Files shorter than eight bytes are an error.
    pub fn load(&self) -> io::Result<u64> {
        let bytes = std::fs::read(&self.path)?;
        let head: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("nonce file holds {} bytes", bytes.len()),
                )
            })?;
        Ok(u64::from_le_bytes(head))
    }

    pub fn store(&self, nonce: u64) -> io::Result<()> {
        std::fs::write(&self.path, nonce.to_le_bytes())
    }
}

/// Chooses the starting nonce from the node count and the cached value.
pub fn reconcile(coin: CoinTag, node: u64, cached: Option<u64>, policy: NoncePolicy) -> u64 {
    match cached {
        Some(cached) if cached != node => {
            let chosen = match policy {
                NoncePolicy::PreferCached => cached,
                NoncePolicy::PreferNode => node,
            };
            tracing::warn!(
                coin = %coin,
                node_nonce = node,
                cached_nonce = cached,
                chosen,
                "nonce desync between node and nonce file"
            );
            chosen
        }
        _ => node,
    }
}

/// Serializes nonce use for one coin.
#[derive(Debug)]
pub struct NonceSequencer {
    coin: CoinTag,
    next: Mutex<u64>,
    store: NonceStore,
}

impl NonceSequencer {
    pub fn new(coin: CoinTag, initial: u64, store: NonceStore) -> Self {
        Self {
            coin,
            next: Mutex::new(initial),
            store,
        }
    }

    /// The nonce the next send will use.
    pub fn current(&self) -> u64 {
        *self.next.lock()
    }

    /// Locks the counter for one send.
    pub fn reserve(&self) -> NonceReservation<'_> {
        NonceReservation {
            coin: self.coin,
            guard: self.next.lock(),
            store: &self.store,
        }
    }

    /// Replaces the counter, e.g. after switching the service account.
    pub fn reset(&self, nonce: u64) {
        *self.next.lock() = nonce;
    }

    pub fn store(&self) -> &NonceStore {
        &self.store
    }
}

/// Exclusive use of the next nonce until committed or dropped.
pub struct NonceReservation<'a> {
    coin: CoinTag,
    guard: MutexGuard<'a, u64>,
    store: &'a NonceStore,
}

impl NonceReservation<'_> {
    pub fn nonce(&self) -> u64 {
        *self.guard
    }

    /// Records an accepted broadcast: advances the counter and persists it.
    ///
    /// A failed write is logged and otherwise ignored; the transaction is
    /// already on the network and the next startup re-reads the node count.
    pub fn commit(mut self) -> u64 {
        *self.guard += 1;
        let next = *self.guard;
        if let Err(e) = self.store.store(next) {
            tracing::warn!(
                coin = %self.coin,
                path = %self.store.path().display(),
                nonce = next,
                error = %e,
                "failed to persist nonce"
            );
        }
        next
    }
}
