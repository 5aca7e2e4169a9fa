//! JSON-RPC 2.0 request dispatch over a [`Node`]. Transport is left to the caller.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
    common::{Word, address::Address, tx::TxRequest},
    node::Node,
    policy::{EXECUTION_ERROR, RpcError},
};

pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Vec<Value>) -> Self {
        Self {
            id: json!(id),
            method: method.to_string(),
            params,
        }
    }
}

/// A strict-mode send carries both `result` (the hash) and `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    fn new(id: Value, result: Option<Value>, error: Option<RpcError>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
            error,
        }
    }
}

pub async fn dispatch(node: &Node, request: Request) -> Response {
    tracing::debug!(method = %request.method, "rpc request");
    let id = request.id.clone();
    match handle(node, &request).await {
        Ok((result, error)) => Response::new(id, result, error),
        Err(error) => {
            tracing::warn!(method = %request.method, error = %error, "rpc failed");
            Response::new(id, None, Some(error))
        }
    }
}

type Handled = (Option<Value>, Option<RpcError>);

async fn handle(node: &Node, request: &Request) -> Result<Handled, RpcError> {
    let params = &request.params;
    let value = match request.method.as_str() {
        "eth_sendTransaction" => {
            let tx: TxRequest = param(params, 0)?;
            let response = node.send_transaction(tx).await.map_err(execution)?;
            return Ok((Some(json!(response.hash_hex())), response.error));
        }
        "eth_call" => {
            let tx: TxRequest = param(params, 0)?;
            let data = node.call(tx).await.map_err(execution)??;
            json!(data)
        }
        "debug_traceTransaction" => {
            let hash: Word = param(params, 0)?;
            json!(node.trace_transaction(hash).await.map_err(execution)?)
        }
        "eth_getTransactionReceipt" => {
            let hash: Word = param(params, 0)?;
            json!(node.receipt(hash).await)
        }
        "eth_getBalance" => {
            let address: Address = param(params, 0)?;
            json!(node.balance(address).await)
        }
        "eth_getCode" => {
            let address: Address = param(params, 0)?;
            json!(node.code(address).await)
        }
        "eth_getStorageAt" => {
            let address: Address = param(params, 0)?;
            let key: Word = param(params, 1)?;
            let value = node.storage_at(address, key).await;
            json!(format!("0x{}", value.to_hex()))
        }
        "eth_getTransactionCount" => {
            let address: Address = param(params, 0)?;
            json!(format!("{:#x}", node.nonce(address).await))
        }
        "eth_blockNumber" => json!(format!("{:#x}", node.block_number().await)),
        "eth_accounts" => json!(node.accounts().await),
        method => {
            return Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ));
        }
    };
    Ok((Some(value), None))
}

fn param<T: DeserializeOwned>(params: &[Value], index: usize) -> Result<T, RpcError> {
    let value = params.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| RpcError::new(INVALID_PARAMS, format!("invalid params[{index}]: {e}")))
}

fn execution(report: eyre::Report) -> RpcError {
    RpcError::new(EXECUTION_ERROR, report.to_string())
}
