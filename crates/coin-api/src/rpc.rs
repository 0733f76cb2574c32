//! Blocking JSON-RPC access to a coin node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chain_eth::retry::NodeErrorPayload;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The node answered with a JSON-RPC error object.
    #[error("node error {}: {}", .0.code, .0.message)]
    Node(NodeErrorPayload),

    /// The node could not be reached or replied with something other than JSON-RPC.
    #[error("{0}")]
    Transport(String),

    /// The reply did not have the expected shape.
    #[error("unexpected reply: {0}")]
    Decode(String),
}

impl RpcError {
    /// The node's structured error, if it sent one.
    pub fn payload(&self) -> Option<&NodeErrorPayload> {
        match self {
            RpcError::Node(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Synchronous `call(method, params) -> reply` channel to a node.
pub trait RpcTransport: Send + Sync {
    /// Returns the `result` member of the reply.
    fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

/// Calls `method` and decodes the result into `T`.
pub fn call_typed<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: Value,
) -> Result<T, RpcError> {
    let value = transport.call(method, params)?;
    serde_json::from_value(value).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
}

/// JSON-RPC dialect spoken by the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcVersion {
    /// bitcoind and its forks.
    #[default]
    #[serde(rename = "1.0")]
    V1,
    /// Ethereum clients.
    #[serde(rename = "2.0")]
    V2,
}

impl RpcVersion {
    fn as_str(self) -> &'static str {
        match self {
            RpcVersion::V1 => "1.0",
            RpcVersion::V2 => "2.0",
        }
    }
}

#[derive(Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<NodeErrorPayload>,
}

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    url: String,
    version: RpcVersion,
    auth: Option<(String, String)>,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, version: RpcVersion) -> Result<Self, RpcError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            version,
            auth: None,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((user.into(), password.into()));
        self
    }
}

impl RpcTransport for HttpTransport {
    fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": self.version.as_str(),
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request
            .send()
            .map_err(|e| RpcError::Transport(format!("{method}: {e}")))?;
        let status = response.status();
        // bitcoind reports RPC errors with HTTP 500 and a JSON body.
        let reply: Reply = response
            .json()
            .map_err(|e| RpcError::Transport(format!("{method}: HTTP {status}: {e}")))?;

        tracing::trace!(method, id, "rpc reply");
        decode_reply(reply)
    }
}

fn decode_reply(reply: Reply) -> Result<Value, RpcError> {
    match reply.error {
        Some(payload) => Err(RpcError::Node(payload)),
        None => Ok(reply.result),
    }
}
