use serde_json::Value;

/// Peer counts reported by `parity_netPeers`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerCounts {
    /// Number of entries in the node's peer list.
    pub total: u64,
    pub active: u64,
    pub connected: u64,
}

/// Sync status as reported by `eth_syncing`.
///
/// The node answers `false` once it is fully synced, and an object
/// describing the sync progress otherwise.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncStatus {
    Synced,
    Syncing(Value),
}

impl SyncStatus {
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncStatus::Syncing(_))
    }

    /// Numeric encoding used by the `syncing` gauge (0 synced, 1 syncing).
    pub fn as_gauge_value(&self) -> i64 {
        i64::from(self.is_syncing())
    }

    /// `currentBlock` / `highestBlock` from the progress object, when present.
    pub fn progress(&self) -> Option<(u64, u64)> {
        let SyncStatus::Syncing(progress) = self else {
            return None;
        };
        let field = |name: &str| {
            progress
                .get(name)
                .and_then(Value::as_str)
                .and_then(|s| crate::rpc::parse_quantity(s).ok())
                .and_then(|n| u64::try_from(n).ok())
        };
        Some((field("currentBlock")?, field("highestBlock")?))
    }
}

/// Everything gathered from the node during one poll cycle.
///
/// A snapshot only exists once every RPC call of the cycle has succeeded,
/// so applying it to the gauges never mixes values from a failed cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub peers: PeerCounts,
    pub client_version: String,
    pub chain_name: String,
    pub sync_status: SyncStatus,
    pub gas_price: u128,
    pub block_number: u64,
}
