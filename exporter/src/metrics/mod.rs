//! Metrics exported for the polled node.
//!
//! This module defines the Prometheus gauges the poll loop writes into and
//! a small HTTP exporter that serves `/metrics` in Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::sync::Arc;
//! use parity_exporter::metrics::{MetricsRegistry, serve_metrics};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//!
//! // Spawn the HTTP exporter in the background:
//! tokio::spawn(serve_metrics(listener, registry.clone()));
//!
//! // After each poll cycle:
//! registry.node.record(&snapshot, elapsed);
//! ```

pub mod prometheus;

pub use self::prometheus::{MetricsRegistry, NodeMetrics, serve_metrics};
