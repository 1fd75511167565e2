//! The resource snapshot store
//!
//! Holds the latest monitor report per node plus the scheduler's own
//! reservations layered on top. A GPU is allocatable only when the monitor
//! saw it free AND no live reservation covers it; a volume's allocatable
//! space is its reported free space minus live reservations against it.
//! All reservation mutation goes through one write lock.

use chrono::{DateTime, Utc};
use greslet_core::{Allocation, GresletError, GresletResult, NodeReport, StorageKind};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::snapshot::{NodeSnapshot, Snapshot, VolumeSnapshot};

/// One node's last report plus the ingestion stamp
#[derive(Debug, Clone)]
struct NodeEntry {
    report: NodeReport,
    ingested_at: DateTime<Utc>,
}

/// The scheduler's claim on resources, keyed by allocation id
#[derive(Debug, Clone)]
struct Reservation {
    node: String,
    gpu_indices: Vec<u32>,
    volume: String,
    kind: StorageKind,
    storage_gb: f64,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, NodeEntry>,
    reservations: HashMap<Uuid, Reservation>,
}

impl Inner {
    /// GPU indices on `node` covered by live reservations
    fn reserved_gpus(&self, node: &str) -> HashSet<u32> {
        self.reservations
            .values()
            .filter(|r| r.node == node)
            .flat_map(|r| r.gpu_indices.iter().copied())
            .collect()
    }

    /// GB reserved against a volume as seen from `node`
    ///
    /// Shared volumes are one underlying filesystem, so reservations against
    /// the same path count fleet-wide; local volumes count per node.
    fn reserved_gb(&self, node: &str, path: &str) -> f64 {
        self.reservations
            .values()
            .filter(|r| r.volume == path && (r.kind == StorageKind::Shared || r.node == node))
            .map(|r| r.storage_gb)
            .sum()
    }
}

/// Shared store of cluster resource state
pub struct SnapshotStore {
    staleness_threshold: chrono::Duration,
    inner: RwLock<Inner>,
}

impl SnapshotStore {
    /// Create a store with the given staleness cutoff
    pub fn new(staleness_threshold: chrono::Duration) -> Self {
        Self {
            staleness_threshold,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Ingest a monitor report, stamping freshness now
    pub async fn ingest(&self, report: NodeReport) {
        self.ingest_at(report, Utc::now()).await;
    }

    /// Ingest with an explicit clock
    pub async fn ingest_at(&self, report: NodeReport, now: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        let node = report.node.clone();
        let known = inner.nodes.contains_key(&node);
        inner.nodes.insert(
            node.clone(),
            NodeEntry {
                report,
                ingested_at: now,
            },
        );

        if known {
            debug!(node = %node, "Refreshed node report");
        } else {
            info!(node = %node, "Node joined the fleet");
        }
    }

    /// Take an immutable copy-on-read view of the fleet
    pub async fn query(&self) -> Snapshot {
        self.query_at(Utc::now()).await
    }

    /// Take a view with an explicit clock
    pub async fn query_at(&self, now: DateTime<Utc>) -> Snapshot {
        let inner = self.inner.read().await;

        let mut nodes: Vec<NodeSnapshot> = inner
            .nodes
            .values()
            .map(|entry| {
                let age = now - entry.ingested_at;
                let stale = age > self.staleness_threshold;
                let reserved = inner.reserved_gpus(&entry.report.node);

                let free_gpus = if stale {
                    Vec::new()
                } else {
                    entry
                        .report
                        .free_gpu_indices()
                        .into_iter()
                        .filter(|i| !reserved.contains(i))
                        .collect()
                };

                let volumes = entry
                    .report
                    .volumes
                    .iter()
                    .map(|v| VolumeSnapshot {
                        path: v.path.clone(),
                        kind: v.kind,
                        free_gb: (v.free_gb - inner.reserved_gb(&entry.report.node, &v.path))
                            .max(0.0),
                        read_gbps: v.read_gbps,
                        write_gbps: v.write_gbps,
                    })
                    .collect();

                NodeSnapshot {
                    node: entry.report.node.clone(),
                    stale,
                    report_age_secs: age.num_seconds(),
                    total_gpus: entry.report.gpus.len() as u32,
                    free_gpus,
                    volumes,
                }
            })
            .collect();

        nodes.sort_by(|a, b| a.node.cmp(&b.node));

        Snapshot {
            taken_at: now,
            nodes,
        }
    }

    /// Atomically claim an allocation's GPUs and storage
    ///
    /// Every targeted slot is re-validated against the current state under
    /// the write lock; on any mismatch nothing is recorded.
    pub async fn reserve(&self, allocation: &Allocation) -> GresletResult<()> {
        self.reserve_at(allocation, Utc::now()).await
    }

    /// Reserve with an explicit clock
    pub async fn reserve_at(&self, allocation: &Allocation, now: DateTime<Utc>) -> GresletResult<()> {
        let mut inner = self.inner.write().await;

        let entry = inner
            .nodes
            .get(&allocation.node)
            .ok_or_else(|| GresletError::NodeNotFound(allocation.node.clone()))?;

        if now - entry.ingested_at > self.staleness_threshold {
            return Err(GresletError::StaleNode(format!(
                "{} last reported {}s ago",
                allocation.node,
                (now - entry.ingested_at).num_seconds()
            )));
        }

        let monitor_free: HashSet<u32> = entry.report.free_gpu_indices().into_iter().collect();
        let volume = entry
            .report
            .volumes
            .iter()
            .find(|v| v.path == allocation.volume)
            .ok_or_else(|| {
                GresletError::Conflict(format!(
                    "volume {} is not reported by {}",
                    allocation.volume, allocation.node
                ))
            })?;
        let kind = volume.kind;
        let free_gb = volume.free_gb;

        let reserved = inner.reserved_gpus(&allocation.node);
        for index in &allocation.gpu_indices {
            if !monitor_free.contains(index) || reserved.contains(index) {
                return Err(GresletError::Conflict(format!(
                    "gpu {} on {} is no longer free",
                    index, allocation.node
                )));
            }
        }

        if free_gb - inner.reserved_gb(&allocation.node, &allocation.volume)
            < allocation.storage_gb
        {
            return Err(GresletError::Conflict(format!(
                "volume {} cannot hold {} GB more",
                allocation.volume, allocation.storage_gb
            )));
        }

        inner.reservations.insert(
            allocation.id,
            Reservation {
                node: allocation.node.clone(),
                gpu_indices: allocation.gpu_indices.clone(),
                volume: allocation.volume.clone(),
                kind,
                storage_gb: allocation.storage_gb,
            },
        );

        info!(
            allocation_id = %allocation.id,
            node = %allocation.node,
            gpus = ?allocation.gpu_indices,
            volume = %allocation.volume,
            "Reserved resources"
        );

        Ok(())
    }

    /// Return an allocation's resources to the free pool
    ///
    /// Releasing an unknown or already-released id is a no-op.
    pub async fn release(&self, allocation_id: Uuid) {
        let mut inner = self.inner.write().await;
        match inner.reservations.remove(&allocation_id) {
            Some(r) => {
                info!(
                    allocation_id = %allocation_id,
                    node = %r.node,
                    gpus = ?r.gpu_indices,
                    "Released resources"
                );
            }
            None => {
                debug!(allocation_id = %allocation_id, "Release of unknown allocation ignored");
            }
        }
    }

    /// Per-user GPU counts as the monitor currently observes them
    ///
    /// Only fresh nodes contribute; a stale report may describe processes
    /// that have long exited.
    pub async fn observed_gpu_usage(&self, now: DateTime<Utc>) -> HashMap<String, u32> {
        let inner = self.inner.read().await;
        let mut usage: HashMap<String, u32> = HashMap::new();

        for entry in inner.nodes.values() {
            if now - entry.ingested_at > self.staleness_threshold {
                warn!(
                    node = %entry.report.node,
                    age_secs = (now - entry.ingested_at).num_seconds(),
                    "Skipping stale node in usage accounting"
                );
                continue;
            }
            for gpu in &entry.report.gpus {
                if let Some(user) = &gpu.user {
                    *usage.entry(user.clone()).or_insert(0) += 1;
                }
            }
        }

        usage
    }

    /// Number of known nodes (fresh or stale)
    pub async fn node_count(&self) -> usize {
        self.inner.read().await.nodes.len()
    }
}
