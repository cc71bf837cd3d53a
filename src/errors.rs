// Bridge Error Types
use crate::embeddings::EmbeddingError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// JSON-RPC error codes emitted by the bridge.
pub mod codes {
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const TRANSPORT_ERROR: i32 = -32000;
    pub const TIMEOUT: i32 = -32001;
    pub const UPSTREAM_ERROR: i32 = -32002;
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Remote call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Remote server error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Remote error {}: {}", .0.code, .0.message)]
    Remote(JsonRpcError),

    #[error("Malformed response from remote: {0}")]
    MalformedResponse(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl BridgeError {
    /// Whether retrying the same call could change the outcome.
    ///
    /// Connection failures, timeouts and gateway statuses (502/503/504) are
    /// transient; every other failure is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Transport { .. } | BridgeError::Timeout { .. } => true,
            BridgeError::Upstream { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            BridgeError::Transport { .. } => JsonRpcError {
                code: codes::TRANSPORT_ERROR,
                message: self.to_string(),
                data: None,
            },
            BridgeError::Timeout { .. } => JsonRpcError {
                code: codes::TIMEOUT,
                message: self.to_string(),
                data: None,
            },
            BridgeError::Upstream { status, .. } => JsonRpcError {
                code: codes::UPSTREAM_ERROR,
                message: self.to_string(),
                data: Some(json!({ "status": status })),
            },
            BridgeError::Remote(error) => error.clone(),
            BridgeError::InvalidParams(msg) => JsonRpcError {
                code: codes::INVALID_PARAMS,
                message: msg.clone(),
                data: None,
            },
            _ => JsonRpcError {
                code: codes::INTERNAL_ERROR,
                message: self.to_string(),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_are_transient() {
        for status in [502, 503, 504] {
            let err = BridgeError::Upstream { status, message: String::new() };
            assert!(err.is_transient(), "{status} should be transient");
        }
        for status in [400, 401, 404, 500, 501] {
            let err = BridgeError::Upstream { status, message: String::new() };
            assert!(!err.is_transient(), "{status} should be terminal");
        }
    }

    #[test]
    fn malformed_body_is_terminal() {
        assert!(!BridgeError::MalformedResponse("eof".into()).is_transient());
        assert!(BridgeError::Timeout { timeout_secs: 1 }.is_transient());
    }

    #[test]
    fn upstream_error_carries_status() {
        let err = BridgeError::Upstream { status: 400, message: "bad collection".into() };
        let rpc = err.to_jsonrpc_error();
        assert_eq!(rpc.code, codes::UPSTREAM_ERROR);
        assert_eq!(rpc.data, Some(json!({ "status": 400 })));
        assert!(rpc.message.contains("bad collection"));
    }
}
