//! HTTP transport for JSON-RPC.
//!
//! Posts each request as a JSON body to the node URL:
//!
//! ```json
//! POST /
//! {"id": 7, "method": "eth_blockNumber", "params": [], "jsonrpc": "2.0"}
//!
//! Response:
//! {"jsonrpc": "2.0", "id": 7, "result": "0x10d4f"}
//! ```
//!
//! The body is decoded as JSON regardless of the HTTP status, since nodes
//! commonly report JSON-RPC errors with a non-2xx status and a normal
//! envelope. Only a body that is not JSON is a transport failure.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;

use super::{RpcError, RpcRequest, Transport};

/// Blocking HTTP transport.
///
/// This uses the blocking `reqwest` client, so it must not be constructed
/// or called from inside an async task; run it on a dedicated thread (or
/// `spawn_blocking`) instead.
pub struct HttpTransport {
    url: String,
    client: Client,
}

impl HttpTransport {
    /// Constructs a transport posting to `url`.
    ///
    /// `timeout` bounds each request; `None` lets a request wait forever.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, RpcError> {
        // The blocking client otherwise defaults to a 30 second timeout.
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport {
                method: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &RpcRequest<'_>) -> Result<Value, RpcError> {
        let transport_error = |reason: String| RpcError::Transport {
            method: request.method.to_string(),
            reason,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .map_err(|e| transport_error(format!("HTTP POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        resp.json::<Value>().map_err(|e| {
            transport_error(format!(
                "failed to parse JSON response (HTTP status {status}): {e}"
            ))
        })
    }
}
