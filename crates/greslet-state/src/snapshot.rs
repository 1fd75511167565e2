//! Point-in-time cluster views

use chrono::{DateTime, Utc};
use greslet_core::StorageKind;
use serde::{Deserialize, Serialize};

/// A storage volume with reservation-adjusted free space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    /// Mountpoint path
    pub path: String,
    /// Shared or node-local
    pub kind: StorageKind,
    /// Reported free space minus live reservations, in GB
    pub free_gb: f64,
    /// Measured read throughput in GB/s
    pub read_gbps: f64,
    /// Measured write throughput in GB/s
    pub write_gbps: f64,
}

/// One node's state inside a snapshot
///
/// A stale node keeps its last-known totals and volumes for diagnostics but
/// its `free_gpus` list is emptied so nothing can be allocated against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node identity
    pub node: String,
    /// True if the last report is older than the staleness threshold
    pub stale: bool,
    /// Age of the last report in seconds
    pub report_age_secs: i64,
    /// Total GPU slots on the node
    pub total_gpus: u32,
    /// GPU indices free for allocation (monitor-free and unreserved)
    pub free_gpus: Vec<u32>,
    /// Volumes visible from the node
    pub volumes: Vec<VolumeSnapshot>,
}

impl NodeSnapshot {
    /// Number of allocatable GPUs
    pub fn free_gpu_count(&self) -> u32 {
        self.free_gpus.len() as u32
    }

    /// Volume of the given kind with the most allocatable space
    pub fn best_volume(&self, kind: StorageKind, min_free_gb: f64) -> Option<&VolumeSnapshot> {
        self.volumes
            .iter()
            .filter(|v| v.kind == kind && v.free_gb >= min_free_gb)
            .max_by(|a, b| {
                a.free_gb
                    .total_cmp(&b.free_gb)
                    .then_with(|| b.path.cmp(&a.path))
            })
    }
}

/// An immutable, consistent view of the whole fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the view was taken
    pub taken_at: DateTime<Utc>,
    /// All known nodes, sorted by id
    pub nodes: Vec<NodeSnapshot>,
}

impl Snapshot {
    /// Nodes eligible for allocation
    pub fn fresh_nodes(&self) -> impl Iterator<Item = &NodeSnapshot> {
        self.nodes.iter().filter(|n| !n.stale)
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.node == id)
    }
}
