//! JSON-RPC transport
//!
//! Thin HTTP client for the ledger node / wallet endpoint. It knows nothing
//! about elections; callers pass method names and parameters and get typed
//! results back.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// EIP-1193 "user rejected the request"
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[derive(Debug, Clone)]
pub struct RpcClient {
    endpoint: String,
    client: Client,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RpcError> {
        let endpoint = endpoint.into();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        log::info!("📡 RPC client initialized: {}", endpoint);
        Ok(Self {
            endpoint,
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one JSON-RPC call and decode its `result`
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        log::debug!("→ {} (id {})", method, id);

        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        if !response.status().is_success() {
            log::error!("❌ {} failed: HTTP {}", method, response.status());
            return Err(RpcError::Http(response.status().as_u16()));
        }

        let envelope: RpcResponse = response.json().await?;
        if let Some(error) = envelope.error {
            log::debug!("← {} error {}: {}", method, error.code, error.message);
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RpcError::InvalidResponse(format!("{}: {}", method, e)))
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, RpcError::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }

    pub fn is_method_not_found(&self) -> bool {
        matches!(self, RpcError::Rpc { code, .. } if *code == METHOD_NOT_FOUND_CODE)
    }

    /// True for failures of the transport itself (node unreachable, bad gateway)
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Request(_) | RpcError::Http(_))
    }

    /// Revert payload attached to an execution error, if any.
    ///
    /// Nodes disagree on where they put it: `data` may be the hex string
    /// itself or an object with a nested `data` field.
    pub fn revert_data(&self) -> Option<Vec<u8>> {
        let RpcError::Rpc {
            data: Some(data), ..
        } = self
        else {
            return None;
        };
        let raw = match data {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map.get("data")?.as_str()?,
            _ => return None,
        };
        decode_hex(raw).ok()
    }

    /// Message text of an RPC-level error
    pub fn message(&self) -> Option<&str> {
        match self {
            RpcError::Rpc { message, .. } => Some(message),
            _ => None,
        }
    }
}

// ============================================================================
// Hex helpers
// ============================================================================

/// `0x`-prefixed hex for byte payloads
pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>, RpcError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(body).map_err(|e| RpcError::InvalidResponse(format!("bad hex {:?}: {}", s, e)))
}

/// `0x`-prefixed quantity (no leading zeros)
pub fn encode_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

pub fn decode_quantity(s: &str) -> Result<u64, RpcError> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    if body.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(body, 16)
        .map_err(|e| RpcError::InvalidResponse(format!("bad quantity {:?}: {}", s, e)))
}
