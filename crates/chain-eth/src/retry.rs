use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static RETRYABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^(insufficient funds)|(balance too low)").expect("static pattern")
});

/// Structured error object of a JSON-RPC reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeErrorPayload {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Whether a node error message describes a transient shortage of funds.
///
/// Such failures may succeed once the account is topped up; anything else
/// is terminal.
pub fn is_retryable_message(message: &str) -> bool {
    RETRYABLE.is_match(message)
}

/// Classifies a structured node error.
pub fn is_retryable(payload: &NodeErrorPayload) -> bool {
    is_retryable_message(&payload.message)
}
