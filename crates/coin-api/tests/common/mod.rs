//! Shared fixtures: a scripted node, a recording signer and a log buffer.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

use chain_btc::error::BtcError;
use chain_btc::signer::{SignRequest, Signer};
use coin_api::rpc::{RpcError, RpcTransport};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;

/// Compressed key for secret exponent 1.
pub const BTC_KEY_ONE: &str = "KwDiBf89QgGbjEhKnhXJuH7LrciVrZi3qYjgd9M7rFU73sVHnoWn";
/// P2SH-P2WPKH address of [`BTC_KEY_ONE`].
pub const BTC_SERVICE_ADDRESS: &str = "3JvL6Ymt8MVWiCNHC7oWU6nLeHNJKLZGLN";
/// P2PKH address of [`BTC_KEY_ONE`].
pub const BTC_DESTINATION: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";

pub const ETH_KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";
pub const ETH_SERVICE_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
pub const ETH_DESTINATION: &str = "0x3535353535353535353535353535353535353535";

pub const SIGNED_TX: &str = "0200000001aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// In-memory node: canned replies per method, every call recorded.
///
/// Queued replies are consumed first; after that the sticky reply for the
/// method is returned. Unscripted methods fail with a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    sticky: Mutex<HashMap<String, Result<Value, RpcError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, method: &str, value: Value) {
        self.sticky.lock().insert(method.to_string(), Ok(value));
    }

    pub fn reply_once(&self, method: &str, value: Value) {
        self.queued
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(Ok(value));
    }

    pub fn fail(&self, method: &str, error: RpcError) {
        self.sticky.lock().insert(method.to_string(), Err(error));
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Parameters of every call to `method`, in order.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn called(&self, method: &str) -> bool {
        !self.calls_to(method).is_empty()
    }
}

impl RpcTransport for ScriptedTransport {
    fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls.lock().push((method.to_string(), params));
        if let Some(reply) = self.queued.lock().get_mut(method).and_then(|q| q.pop_front()) {
            return reply;
        }
        self.sticky
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Err(RpcError::Transport(format!("no reply scripted for {method}"))))
    }
}

/// What the pipeline handed to the signer.
#[derive(Debug, Clone)]
pub struct SignCall {
    pub unsigned_tx: String,
    pub mode: String,
    pub prevtxs: Value,
    pub private_key: String,
}

/// Records sign requests and answers with a fixed transaction or error.
pub struct FakeSigner {
    reply: Result<String, String>,
    calls: Mutex<Vec<SignCall>>,
}

impl FakeSigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(SIGNED_TX.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<SignCall> {
        self.calls.lock().clone()
    }
}

impl Signer for FakeSigner {
    fn sign(&self, request: &SignRequest<'_>) -> Result<String, BtcError> {
        self.calls.lock().push(SignCall {
            unsigned_tx: request.unsigned_tx.to_string(),
            mode: request.scheme.mode_argument(request.height),
            prevtxs: serde_json::to_value(request.inputs).map_err(|e| BtcError::SigningError(e.to_string()))?,
            private_key: request.private_key.expose_secret().to_string(),
        });
        self.reply.clone().map_err(BtcError::SigningError)
    }
}

/// Captures formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Runs `f` with a subscriber writing into this buffer.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
