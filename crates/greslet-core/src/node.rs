//! Node report types fed by the external resource monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage volume kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Mounted on every node in the fleet
    Shared,
    /// Mounted only on the reporting node
    Local,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Shared => write!(f, "shared"),
            StorageKind::Local => write!(f, "local"),
        }
    }
}

/// A single GPU slot as observed by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuReport {
    /// Device index on the node
    pub index: u32,
    /// Owning user if a process currently occupies the device
    pub user: Option<String>,
}

impl GpuReport {
    /// True if the monitor saw no process on this device
    pub fn is_free(&self) -> bool {
        self.user.is_none()
    }
}

/// A storage volume measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport {
    /// Mountpoint path, e.g. "/scratch/network/ssd"
    pub path: String,
    /// Shared or node-local
    pub kind: StorageKind,
    /// Free space in GB
    pub free_gb: f64,
    /// Measured read throughput in GB/s
    pub read_gbps: f64,
    /// Measured write throughput in GB/s
    pub write_gbps: f64,
}

/// One monitor report for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node identity, e.g. "torrnode3"
    pub node: String,
    /// All GPU slots on the node
    pub gpus: Vec<GpuReport>,
    /// All volumes visible from the node
    pub volumes: Vec<VolumeReport>,
    /// When the monitor took the measurement
    pub reported_at: DateTime<Utc>,
}

impl NodeReport {
    /// Indices of GPUs the monitor observed as unoccupied
    pub fn free_gpu_indices(&self) -> Vec<u32> {
        self.gpus
            .iter()
            .filter(|g| g.is_free())
            .map(|g| g.index)
            .collect()
    }
}
