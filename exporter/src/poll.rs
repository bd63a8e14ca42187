//! The poll loop: query the node, then publish the results.
//!
//! Each cycle calls the node in a fixed order (peers, client version,
//! chain, sync status, gas price, block number). Gauges are only written
//! after every call of the cycle succeeded, so a failed cycle leaves all
//! of them at the values of the last good one.

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::metrics::NodeMetrics;
use crate::rpc::{RpcClient, RpcError, Transport};
use crate::types::NodeSnapshot;

/// What the poll loop does when a cycle fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the loop and return the error; the process exits and a
    /// supervisor is expected to restart it.
    #[default]
    Exit,
    /// Log the failure, keep the previous values and retry next interval.
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" => Ok(FailurePolicy::Exit),
            "skip" => Ok(FailurePolicy::Skip),
            other => Err(format!("unknown failure policy {other:?} (expected exit or skip)")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Exit => f.write_str("exit"),
            FailurePolicy::Skip => f.write_str("skip"),
        }
    }
}

/// Queries every value of one cycle from the node.
pub fn collect_snapshot<T: Transport>(client: &RpcClient<T>) -> Result<NodeSnapshot, RpcError> {
    let peers = client.get_peers()?;
    let client_version = client.get_client_version()?;
    let chain_name = client.get_chain_name()?;
    let sync_status = client.is_syncing()?;
    let gas_price = client.get_gas_price()?;
    let block_number = client.get_block_number()?;

    Ok(NodeSnapshot {
        peers,
        client_version,
        chain_name,
        sync_status,
        gas_price,
        block_number,
    })
}

/// Runs one full poll cycle and records it into `metrics`.
pub fn poll_once<T: Transport>(
    client: &RpcClient<T>,
    metrics: &NodeMetrics,
) -> Result<NodeSnapshot, RpcError> {
    let start = Instant::now();
    let snapshot = collect_snapshot(client)?;
    metrics.record(&snapshot, start.elapsed());

    tracing::info!(
        block_number = snapshot.block_number,
        peers_total = snapshot.peers.total,
        peers_active = snapshot.peers.active,
        peers_connected = snapshot.peers.connected,
        syncing = snapshot.sync_status.is_syncing(),
        "metrics updated"
    );
    Ok(snapshot)
}

/// Drives [`poll_once`] on a fixed interval.
///
/// Everything here blocks; run it on its own thread.
pub struct Poller<T> {
    client: RpcClient<T>,
    metrics: NodeMetrics,
    interval: Duration,
    on_failure: FailurePolicy,
}

impl<T: Transport> Poller<T> {
    pub fn new(
        client: RpcClient<T>,
        metrics: NodeMetrics,
        interval: Duration,
        on_failure: FailurePolicy,
    ) -> Self {
        Self {
            client,
            metrics,
            interval,
            on_failure,
        }
    }

    /// Polls until `shutdown` receives a message or its sender is dropped.
    ///
    /// The interval is slept after each cycle, so cycles never overlap.
    /// With [`FailurePolicy::Exit`] the first failed cycle ends the loop
    /// with that error.
    pub fn run(&self, shutdown: &Receiver<()>) -> Result<(), RpcError> {
        tracing::info!(
            interval_secs = self.interval.as_secs_f64(),
            on_failure = %self.on_failure,
            "poll loop running"
        );

        loop {
            if let Err(err) = poll_once(&self.client, &self.metrics) {
                match self.on_failure {
                    FailurePolicy::Exit => return Err(err),
                    FailurePolicy::Skip => {
                        tracing::warn!(error = %err, "poll cycle failed, keeping previous values");
                    }
                }
            }

            match shutdown.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("poll loop stopped");
                    return Ok(());
                }
            }
        }
    }
}
