//! Renders execution outcomes at the JSON-RPC boundary.
//!
//! The interpreter classifies every failure the same way regardless of
//! configuration. Only this layer looks at `strictErrorsOnResponse`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    common::{Hex, Word},
    outcome::ExecutionOutcome,
};

pub const MESSAGE_PREFIX: &str = "VM Exception while processing transaction";

/// Generic server error code used for execution failures.
pub const EXECUTION_ERROR: i64 = -32000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// `VM Exception while processing transaction: <kind>[ <reason>]`
pub fn message(outcome: &ExecutionOutcome) -> Option<String> {
    let kind = outcome.classification()?;
    Some(match outcome.reason() {
        Some(reason) => format!("{MESSAGE_PREFIX}: {kind} {reason}"),
        None => format!("{MESSAGE_PREFIX}: {kind}"),
    })
}

/// Response to `eth_sendTransaction`: the hash is always present.
#[derive(Clone, Debug, PartialEq)]
pub struct SendResponse {
    pub hash: Word,
    pub error: Option<RpcError>,
}

impl SendResponse {
    /// `0x` + 64 hex digits.
    pub fn hash_hex(&self) -> String {
        format!("0x{}", self.hash.to_hex())
    }
}

/// Result of `eth_call`: raw return data, or an error under strict policy.
pub type CallResponse = Result<Hex, RpcError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub strict: bool,
}

impl ErrorPolicy {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn render_send(&self, hash: Word, outcome: &ExecutionOutcome) -> SendResponse {
        let error = match (self.strict, outcome.detail(), message(outcome)) {
            (true, Some(detail), Some(message)) => {
                let key = format!("0x{}", hash.to_hex());
                let mut data = serde_json::Map::new();
                data.insert(key, json!(detail));
                data.insert("name".to_string(), json!("RuntimeError"));
                Some(RpcError::new(EXECUTION_ERROR, message).with_data(Value::Object(data)))
            }
            _ => None,
        };
        SendResponse { hash, error }
    }

    pub fn render_call(&self, outcome: &ExecutionOutcome) -> CallResponse {
        match outcome {
            ExecutionOutcome::Success(data) => Ok(Hex::from(data.as_slice())),
            _ if self.strict => {
                let message = message(outcome).unwrap_or_else(|| MESSAGE_PREFIX.to_string());
                let data = json!({
                    "name": "RuntimeError",
                    "program_counter": outcome.program_counter(),
                    "reason": outcome.reason(),
                });
                Err(RpcError::new(EXECUTION_ERROR, message).with_data(data))
            }
            // Raw `Error(string)` bytes pass through untouched; faults carry none.
            _ => Ok(Hex::from(outcome.return_data())),
        }
    }
}
