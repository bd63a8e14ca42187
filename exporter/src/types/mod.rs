//! Domain types for the values read from the node.
//!
//! These are the parsed forms of the JSON-RPC results the exporter cares
//! about, plus [`NodeSnapshot`], which bundles one poll cycle's worth of
//! them so they can be published together.

pub mod node;

pub use node::{NodeSnapshot, PeerCounts, SyncStatus};
