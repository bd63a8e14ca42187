//! Parity exporter library crate.
//!
//! This crate polls a Parity/OpenEthereum node over JSON-RPC and republishes
//! chain-state metrics for Prometheus:
//!
//! - typed values read from the node (`types`),
//! - the JSON-RPC client and its HTTP transport (`rpc`),
//! - Prometheus gauges and the `/metrics` exporter (`metrics`),
//! - the periodic poll loop (`poll`),
//! - and process configuration from the environment (`config`).
//!
//! The binary in `main.rs` wires these together.

pub mod config;
pub mod metrics;
pub mod poll;
pub mod rpc;
pub mod types;

// Re-export top-level configuration types.
pub use config::{ConfigError, ExporterConfig, MetricsConfig, PollConfig, RpcClientConfig};

// Re-export the RPC client and its transports.
pub use rpc::{HttpTransport, RpcClient, RpcError, RpcRequest, Transport, parse_quantity};

// Re-export metrics registry and node metrics.
pub use metrics::{MetricsRegistry, NodeMetrics, serve_metrics};

// Re-export the poll loop.
pub use poll::{FailurePolicy, Poller, collect_snapshot, poll_once};

pub use types::*;
