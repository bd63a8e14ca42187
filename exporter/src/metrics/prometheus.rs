//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the node gauges, and an async HTTP exporter that serves
//! `/metrics` using `hyper`.

use std::{
    convert::Infallible,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Gauge, Histogram, HistogramOpts, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

use crate::types::NodeSnapshot;

/// Namespace prepended to every metric name.
pub const METRICS_NAMESPACE: &str = "parity";

/// Label values of the peers gauge.
pub const PEER_STATUSES: [&str; 3] = ["total", "active", "connected"];

/// Gauges describing the polled node.
///
/// Every gauge holds the value from the last successful poll cycle.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Most recent block number.
    pub block_number: IntGauge,
    /// Peer counts, labelled by `status`.
    pub peers: IntGaugeVec,
    /// Always 1, labelled by client `version` and `chain`.
    pub version: IntGaugeVec,
    /// Label values of the series currently set in `version`.
    version_labels: Arc<Mutex<Option<(String, String)>>>,
    /// 1 while the node is syncing, 0 once synced.
    pub syncing: IntGauge,
    /// Block the node has imported up to, while syncing.
    pub sync_current_block: IntGauge,
    /// Highest block the node knows of, while syncing.
    pub sync_highest_block: IntGauge,
    /// Gas price in wei.
    pub gas_price: Gauge,
    /// Duration of each successful poll cycle, in seconds.
    pub request_processing_seconds: Histogram,
}

impl NodeMetrics {
    /// Registers node metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block_number = IntGauge::with_opts(Opts::new(
            "eth_block_number",
            "The number of most recent block.",
        ))?;
        registry.register(Box::new(block_number.clone()))?;

        let peers = IntGaugeVec::new(
            Opts::new(
                "peers",
                "The number of peers currently connected to the client.",
            ),
            &["status"],
        )?;
        registry.register(Box::new(peers.clone()))?;

        let version = IntGaugeVec::new(
            Opts::new(
                "version",
                "Client version and chain reported by the node (value is always 1).",
            ),
            &["version", "chain"],
        )?;
        registry.register(Box::new(version.clone()))?;

        let syncing = IntGauge::with_opts(Opts::new(
            "syncing",
            "Whether the node is currently syncing (1) or fully synced (0).",
        ))?;
        registry.register(Box::new(syncing.clone()))?;

        let sync_current_block = IntGauge::with_opts(Opts::new(
            "sync_current_block",
            "Current block of an ongoing sync; the block number when synced.",
        ))?;
        registry.register(Box::new(sync_current_block.clone()))?;

        let sync_highest_block = IntGauge::with_opts(Opts::new(
            "sync_highest_block",
            "Highest known block of an ongoing sync; the block number when synced.",
        ))?;
        registry.register(Box::new(sync_highest_block.clone()))?;

        let gas_price = Gauge::with_opts(Opts::new("gas_price", "Current gas price in wei."))?;
        registry.register(Box::new(gas_price.clone()))?;

        let request_processing_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "request_processing_seconds",
                "Time spent polling the node for one metrics update, in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
        )?;
        registry.register(Box::new(request_processing_seconds.clone()))?;

        Ok(Self {
            block_number,
            peers,
            version,
            version_labels: Arc::new(Mutex::new(None)),
            syncing,
            sync_current_block,
            sync_highest_block,
            gas_price,
            request_processing_seconds,
        })
    }

    /// Writes a completed poll cycle into the gauges.
    ///
    /// Each gauge is set atomically on its own; a concurrent scrape may see
    /// a mix of this cycle and the previous one.
    pub fn record(&self, snapshot: &NodeSnapshot, elapsed: Duration) {
        let peers = snapshot.peers;
        for (status, value) in PEER_STATUSES
            .iter()
            .zip([peers.total, peers.active, peers.connected])
        {
            self.peers.with_label_values(&[*status]).set(saturating_i64(value));
        }

        self.set_version(&snapshot.client_version, &snapshot.chain_name);

        let block_number = saturating_i64(snapshot.block_number);
        let (current, highest) = snapshot
            .sync_status
            .progress()
            .map(|(current, highest)| (saturating_i64(current), saturating_i64(highest)))
            .unwrap_or((block_number, block_number));
        self.syncing.set(snapshot.sync_status.as_gauge_value());
        self.sync_current_block.set(current);
        self.sync_highest_block.set(highest);

        self.gas_price.set(snapshot.gas_price as f64);
        self.block_number.set(block_number);

        self.request_processing_seconds.observe(elapsed.as_secs_f64());
    }

    /// Sets the new version series, then drops the previous one if it
    /// differs, so a scrape always sees at least one series.
    fn set_version(&self, version: &str, chain: &str) {
        self.version.with_label_values(&[version, chain]).set(1);

        let mut current = self
            .version_labels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((old_version, old_chain)) = current.as_ref() {
            if old_version != version || old_chain != chain {
                let _ = self
                    .version
                    .remove_label_values(&[old_version.as_str(), old_chain.as_str()]);
            }
        }
        *current = Some((version.to_string(), chain.to_string()));
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Wrapper around a Prometheus registry and the node metrics.
///
/// This is the main handle passed between the poll loop and the HTTP
/// exporter. It can be wrapped in an [`Arc`] and shared across threads.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub node: NodeMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the node metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some(METRICS_NAMESPACE.to_string()), None)?;
        let node = NodeMetrics::register(&registry)?;
        Ok(Self { registry, node })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Serves Prometheus metrics on an already bound listener.
///
/// `GET /metrics` (and `GET /`) return the Prometheus text exposition
/// format. All other paths return 404. Each connection is handled on its
/// own task, so scrapes never wait on the poll loop.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: Arc<MetricsRegistry>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!(%peer, error = %err, "metrics connection error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") | (&Method::GET, "/") => {
            let mut response = Response::new(Full::new(Bytes::from(metrics.gather_text())));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(response)
        }
        _ => {
            let mut response = Response::new(Full::new(Bytes::from_static(b"not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            Ok(response)
        }
    }
}
