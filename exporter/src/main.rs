// src/main.rs
//
// Exporter binary:
//
// - configuration from RPC_ADDRESS / EXPORTER_PORT / RUN_INTERVAL
// - Prometheus metrics exporter on /metrics
// - blocking poll loop against the node's JSON-RPC endpoint
//
// The process exits non-zero when a poll cycle fails (unless
// ON_RPC_FAILURE=skip) and relies on its supervisor to restart it.

use std::sync::{Arc, mpsc};

use tokio::{net::TcpListener, signal, task::JoinError};

use parity_exporter::{
    ExporterConfig, HttpTransport, MetricsRegistry, Poller, RpcClient, RpcError, serve_metrics,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "parity_exporter=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg = ExporterConfig::from_env().map_err(|e| format!("invalid configuration: {e}"))?;

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    // Bind before spawning so a taken port fails startup.
    let addr = cfg.metrics.listen_addr;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind metrics listener on {addr}: {e}"))?;

    let exporter_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(listener, exporter_metrics).await {
            tracing::error!("metrics HTTP server error: {e}");
        }
    });
    tracing::info!("metrics exporter listening on http://{}/metrics", addr);

    // ---------------------------
    // Poll loop
    // ---------------------------

    tracing::info!(
        rpc_address = %cfg.rpc.url,
        interval_secs = cfg.poll.interval.as_secs(),
        "starting poll loop"
    );

    let (stop_tx, stop_rx) = mpsc::channel();
    let rpc_cfg = cfg.rpc.clone();
    let poll_cfg = cfg.poll.clone();
    let node_metrics = metrics.node.clone();

    // reqwest's blocking client must live outside the async runtime.
    let mut poll_loop = tokio::task::spawn_blocking(move || {
        let transport = HttpTransport::new(rpc_cfg.url, rpc_cfg.timeout)?;
        let poller = Poller::new(
            RpcClient::new(transport),
            node_metrics,
            poll_cfg.interval,
            poll_cfg.on_failure,
        );
        poller.run(&stop_rx)
    });

    tokio::select! {
        joined = &mut poll_loop => poll_loop_outcome(joined),
        _ = shutdown_signal() => {
            let _ = stop_tx.send(());
            poll_loop_outcome(poll_loop.await)
        }
    }
}

fn poll_loop_outcome(joined: Result<Result<(), RpcError>, JoinError>) -> Result<(), String> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("poll loop failed: {e}")),
        Err(e) => Err(format!("poll loop task failed: {e}")),
    }
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
