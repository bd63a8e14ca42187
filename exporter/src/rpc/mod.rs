//! JSON-RPC client for the node being exported.
//!
//! The client is split in two layers:
//!
//! - a [`Transport`] that posts one JSON-RPC request and hands back the
//!   decoded JSON body (see [`http::HttpTransport`] for the real one),
//! - an [`RpcClient`] that builds requests, unwraps the `result` field and
//!   parses it into typed values for each node query the exporter needs.
//!
//! Failures are logged here at error level and returned as [`RpcError`];
//! deciding what a failed call means for the process is left to the
//! poll loop.

pub mod http;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PeerCounts, SyncStatus};

pub use http::HttpTransport;

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_BLOCK_NUMBER: &str = "eth_blockNumber";
pub const METHOD_NET_PEERS: &str = "parity_netPeers";
pub const METHOD_CLIENT_VERSION: &str = "web3_clientVersion";
pub const METHOD_CHAIN: &str = "parity_chain";
pub const METHOD_SYNCING: &str = "eth_syncing";
pub const METHOD_GAS_PRICE: &str = "eth_gasPrice";

/// Errors returned by RPC calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The HTTP exchange itself failed (connection refused, timeout,
    /// body that is not JSON, ...).
    Transport { method: String, reason: String },
    /// The node answered, but without a usable `result`.
    Result { method: String, reason: String },
}

impl RpcError {
    pub fn method(&self) -> &str {
        match self {
            RpcError::Transport { method, .. } | RpcError::Result { method, .. } => method,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Transport { method, reason } => {
                write!(f, "error calling {method}: transport failure: {reason}")
            }
            RpcError::Result { method, reason } => {
                write!(f, "error calling {method}: bad result: {reason}")
            }
        }
    }
}

impl std::error::Error for RpcError {}

/// A single JSON-RPC 2.0 request body.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
    pub jsonrpc: &'static str,
}

/// Sends JSON-RPC requests to a node.
///
/// Implementations only deal with getting a JSON document back; checking
/// the envelope is done by [`RpcClient`]. Errors should be
/// [`RpcError::Transport`].
pub trait Transport: Send + Sync {
    fn send(&self, request: &RpcRequest<'_>) -> Result<Value, RpcError>;
}

/// Typed JSON-RPC client over some [`Transport`].
pub struct RpcClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Calls `method` with `params` and returns the unwrapped `result`.
    ///
    /// A `null` result is returned as [`Value::Null`]; only a missing
    /// `result` field is an error.
    pub fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let request = RpcRequest {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
            jsonrpc: JSONRPC_VERSION,
        };

        let body = self.transport.send(&request).inspect_err(|e| {
            tracing::error!(method, error = %e, "error making JSON-RPC request");
        })?;

        unwrap_result(method, body).inspect_err(|e| {
            tracing::error!(method, error = %e, "error getting JSON-RPC result");
        })
    }

    /// Latest block height (`eth_blockNumber`).
    pub fn get_block_number(&self) -> Result<u64, RpcError> {
        let result = self.call(METHOD_BLOCK_NUMBER, &[])?;
        let n = quantity(METHOD_BLOCK_NUMBER, &result)?;
        u64::try_from(n).map_err(|_| {
            result_error(METHOD_BLOCK_NUMBER, format!("block number {n} out of range"))
        })
    }

    /// Peer counts (`parity_netPeers`); `total` is the length of the peer list.
    pub fn get_peers(&self) -> Result<PeerCounts, RpcError> {
        let result = self.call(METHOD_NET_PEERS, &[])?;
        let peers: NetPeers = decode(METHOD_NET_PEERS, result)?;
        Ok(PeerCounts {
            total: peers.peers.len() as u64,
            active: peers.active,
            connected: peers.connected,
        })
    }

    /// Client version string (`web3_clientVersion`), verbatim.
    pub fn get_client_version(&self) -> Result<String, RpcError> {
        let result = self.call(METHOD_CLIENT_VERSION, &[])?;
        decode(METHOD_CLIENT_VERSION, result)
    }

    /// Chain name (`parity_chain`), e.g. `"foundation"`.
    pub fn get_chain_name(&self) -> Result<String, RpcError> {
        let result = self.call(METHOD_CHAIN, &[])?;
        decode(METHOD_CHAIN, result)
    }

    /// Sync status (`eth_syncing`).
    pub fn is_syncing(&self) -> Result<SyncStatus, RpcError> {
        match self.call(METHOD_SYNCING, &[])? {
            Value::Bool(false) | Value::Null => Ok(SyncStatus::Synced),
            progress => Ok(SyncStatus::Syncing(progress)),
        }
    }

    /// Current gas price in wei (`eth_gasPrice`).
    pub fn get_gas_price(&self) -> Result<u128, RpcError> {
        let result = self.call(METHOD_GAS_PRICE, &[])?;
        quantity(METHOD_GAS_PRICE, &result)
    }
}

/// Result payload of `parity_netPeers`.
#[derive(Debug, Deserialize)]
struct NetPeers {
    active: u64,
    connected: u64,
    peers: Vec<Value>,
}

fn unwrap_result(method: &str, body: Value) -> Result<Value, RpcError> {
    let Value::Object(mut envelope) = body else {
        return Err(result_error(method, "response is not a JSON object"));
    };

    if let Some(result) = envelope.remove("result") {
        return Ok(result);
    }

    let reason = match envelope.get("error") {
        Some(err) => {
            let code = err.get("code").and_then(Value::as_i64);
            let message = err.get("message").and_then(Value::as_str).unwrap_or("");
            match code {
                Some(code) => format!("node returned error {code}: {message}"),
                None => format!("node returned error: {err}"),
            }
        }
        None => "response has no result field".to_string(),
    };
    Err(result_error(method, reason))
}

fn decode<R: serde::de::DeserializeOwned>(method: &str, result: Value) -> Result<R, RpcError> {
    serde_json::from_value(result)
        .map_err(|e| result_error(method, format!("unexpected result shape: {e}")))
}

fn quantity(method: &str, result: &Value) -> Result<u128, RpcError> {
    let raw = result
        .as_str()
        .ok_or_else(|| result_error(method, format!("expected quantity string, got {result}")))?;
    parse_quantity(raw).map_err(|reason| result_error(method, reason))
}

fn result_error(method: &str, reason: impl Into<String>) -> RpcError {
    RpcError::Result {
        method: method.to_string(),
        reason: reason.into(),
    }
}

/// Parses an integer string, detecting the base from its prefix.
///
/// `0x`/`0X` is hexadecimal, `0o` octal, `0b` binary and anything else
/// decimal, after an optional `+` sign. Surrounding whitespace, single `_`
/// separators between digits and one `_` right after a base prefix are
/// accepted. Decimal numbers other than zero may not have leading zeros.
pub fn parse_quantity(raw: &str) -> Result<u128, String> {
    let invalid = || format!("invalid quantity {raw:?}");

    let s = raw.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    let lower = s.get(..2).map(str::to_ascii_lowercase);
    let (digits, radix) = match lower.as_deref() {
        Some("0x") => (&s[2..], 16),
        Some("0o") => (&s[2..], 8),
        Some("0b") => (&s[2..], 2),
        _ => (s, 10),
    };
    let digits = match radix {
        10 => digits,
        _ => digits.strip_prefix('_').unwrap_or(digits),
    };

    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|c| c == '_' || c.is_digit(radix))
    {
        return Err(invalid());
    }

    let digits: String = digits.chars().filter(|c| *c != '_').collect();
    if radix == 10 && digits.starts_with('0') && digits.chars().any(|c| c != '0') {
        return Err(format!("{}: leading zeros in decimal", invalid()));
    }

    u128::from_str_radix(&digits, radix).map_err(|e| format!("{}: {e}", invalid()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays canned responses and records requests.
    struct Scripted {
        responses: Mutex<VecDeque<Result<Value, RpcError>>>,
        seen: Mutex<Vec<Value>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Value, RpcError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn ok(result: Value) -> Self {
            Self::new(vec![Ok(json!({"jsonrpc": "2.0", "id": 1, "result": result}))])
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: &RpcRequest<'_>) -> Result<Value, RpcError> {
            self.seen
                .lock()
                .unwrap()
                .push(serde_json::to_value(request).unwrap());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra request")
        }
    }

    #[test]
    fn parse_quantity_accepts_hex_and_decimal() {
        assert_eq!(parse_quantity("0x1a"), Ok(26));
        assert_eq!(parse_quantity("0X1A"), Ok(26));
        assert_eq!(parse_quantity("42"), Ok(42));
        assert_eq!(parse_quantity(" 0x0 "), Ok(0));
        assert_eq!(parse_quantity("0b101"), Ok(5));
        assert_eq!(parse_quantity("0o17"), Ok(15));
        assert_eq!(parse_quantity("1_000"), Ok(1000));
        assert_eq!(parse_quantity("0x4a817c800"), Ok(20_000_000_000));
        assert_eq!(parse_quantity("0x_1a"), Ok(26));
        assert_eq!(parse_quantity("+42"), Ok(42));
        assert_eq!(parse_quantity("+0x1a"), Ok(26));
        assert_eq!(parse_quantity("0"), Ok(0));
        assert_eq!(parse_quantity("000"), Ok(0));
        assert_eq!(parse_quantity("0_0"), Ok(0));
        assert_eq!(parse_quantity("0x001a"), Ok(26));
    }

    #[test]
    fn parse_quantity_rejects_garbage() {
        for bad in [
            "", "0x", "0x_", "0xzz", "abc", "-1", "0x-1", "1__0", "_1", "1_", "0x__1a", "010",
            "0_1", "++1", "+", "0b102", "0o8", "1 2",
        ] {
            assert!(parse_quantity(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn request_body_has_jsonrpc_envelope_and_increasing_ids() {
        let client = RpcClient::new(Scripted::new(vec![
            Ok(json!({"result": "0x1"})),
            Ok(json!({"result": "0x2"})),
        ]));
        client.get_block_number().unwrap();
        client.get_block_number().unwrap();

        let seen = client.transport().seen.lock().unwrap();
        assert_eq!(
            seen[0],
            json!({"id": 1, "method": "eth_blockNumber", "params": [], "jsonrpc": "2.0"})
        );
        assert_eq!(seen[1]["id"], json!(2));
    }

    #[test]
    fn block_number_and_gas_price_are_parsed() {
        let client = RpcClient::new(Scripted::ok(json!("0x10d4f")));
        assert_eq!(client.get_block_number(), Ok(68943));

        let client = RpcClient::new(Scripted::ok(json!("0x4a817c800")));
        assert_eq!(client.get_gas_price(), Ok(20_000_000_000));
    }

    #[test]
    fn peers_total_is_length_of_peer_list() {
        let client = RpcClient::new(Scripted::ok(json!({
            "peers": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "active": 2,
            "connected": 3,
            "max": 50
        })));
        assert_eq!(
            client.get_peers(),
            Ok(PeerCounts {
                total: 3,
                active: 2,
                connected: 3
            })
        );
    }

    #[test]
    fn version_and_chain_are_returned_verbatim() {
        let client = RpcClient::new(Scripted::ok(json!("Parity-Ethereum//v2.7.2-stable")));
        assert_eq!(
            client.get_client_version().as_deref(),
            Ok("Parity-Ethereum//v2.7.2-stable")
        );

        let client = RpcClient::new(Scripted::ok(json!("foundation")));
        assert_eq!(client.get_chain_name().as_deref(), Ok("foundation"));
    }

    #[test]
    fn syncing_false_means_synced() {
        let client = RpcClient::new(Scripted::ok(json!(false)));
        assert_eq!(client.is_syncing(), Ok(SyncStatus::Synced));

        let progress = json!({"currentBlock": "0x1", "highestBlock": "0x2"});
        let client = RpcClient::new(Scripted::ok(progress.clone()));
        assert_eq!(client.is_syncing(), Ok(SyncStatus::Syncing(progress)));
    }

    #[test]
    fn missing_result_is_a_result_error() {
        let client = RpcClient::new(Scripted::new(vec![Ok(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }))]));
        let err = client.get_block_number().unwrap_err();
        assert!(matches!(err, RpcError::Result { .. }));
        assert_eq!(err.method(), "eth_blockNumber");
        assert!(err.to_string().contains("-32601"));

        let client = RpcClient::new(Scripted::new(vec![Ok(json!({"id": 1}))]));
        assert!(matches!(
            client.call("eth_gasPrice", &[]),
            Err(RpcError::Result { .. })
        ));
    }

    #[test]
    fn null_result_is_not_an_error() {
        let client = RpcClient::new(Scripted::ok(Value::Null));
        assert_eq!(client.call("eth_getBlockByNumber", &[json!("0x0"), json!(false)]), Ok(Value::Null));
    }

    #[test]
    fn malformed_results_do_not_default() {
        let client = RpcClient::new(Scripted::ok(json!(12)));
        assert!(matches!(client.get_block_number(), Err(RpcError::Result { .. })));

        let client = RpcClient::new(Scripted::ok(json!({"active": 1})));
        assert!(matches!(client.get_peers(), Err(RpcError::Result { .. })));

        let client = RpcClient::new(Scripted::ok(json!("0x10000000000000000")));
        assert!(matches!(client.get_block_number(), Err(RpcError::Result { .. })));
    }

    #[test]
    fn transport_errors_pass_through() {
        let client = RpcClient::new(Scripted::new(vec![Err(RpcError::Transport {
            method: "parity_netPeers".into(),
            reason: "connection refused".into(),
        })]));
        assert!(matches!(client.get_peers(), Err(RpcError::Transport { .. })));
    }
}
