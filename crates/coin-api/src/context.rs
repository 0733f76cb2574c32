use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoinError, ErrorKind, ResultExt};
use crate::rpc::{call_typed, RpcTransport};
use crate::types::{Account, CoinTag};

/// State one initialized coin shares across every pipeline instance.
pub(crate) struct CoinContext {
    pub tag: CoinTag,
    pub transport: Arc<dyn RpcTransport>,
    /// Service credential; replaced by `set_service_account`.
    pub account: RwLock<Account>,
    pub test_mode: bool,
    pub test_transaction: Option<String>,
}

impl CoinContext {
    pub fn error(&self, step: &'static str, kind: ErrorKind) -> CoinError {
        CoinError::new(self.tag.as_str(), step, kind)
    }

    /// Node call whose failures are reported under the method name.
    pub fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T, CoinError> {
        call_typed(self.transport.as_ref(), method, params).at(self.tag.as_str(), method)
    }

    /// The pinned transaction id used instead of a broadcast in test mode.
    pub fn pinned_transaction(&self) -> Result<String, CoinError> {
        let tx = self.test_transaction.clone().ok_or_else(|| {
            self.error(
                "broadcast",
                ErrorKind::Configuration("test mode without a test transaction".into()),
            )
        })?;
        tracing::info!(tx_hash = %tx, "test mode, broadcast skipped");
        Ok(tx)
    }

    pub fn service_address(&self) -> String {
        self.account.read().address.clone()
    }
}
