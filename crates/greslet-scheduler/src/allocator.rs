//! Greedy best-fit resource matching
//!
//! Jobs are considered strictly in rank order against one snapshot per
//! pass. Each admission is re-validated by the store's `reserve`, so a
//! stale snapshot can cost a retry but never a double-allocation.

use chrono::{DateTime, Utc};
use greslet_core::{Allocation, GresletError, JobRequest};
use greslet_state::{Snapshot, SnapshotStore};
use tracing::{debug, warn};

/// Chosen resources for one job
#[derive(Debug, Clone)]
struct Placement {
    node: String,
    gpu_indices: Vec<u32>,
    volume: String,
}

/// Greedy first-fit-by-priority allocator
pub struct Allocator {
    /// Reservation retries against a refreshed snapshot before deferring
    conflict_retry: u32,
}

impl Allocator {
    /// Create an allocator with the given conflict retry budget
    pub fn new(conflict_retry: u32) -> Self {
        Self { conflict_retry }
    }

    /// Best-fit node for a job, or None if nothing qualifies
    ///
    /// Best fit minimizes leftover free GPUs on the chosen node; ties go to
    /// the lexicographically smallest node id for determinism.
    fn find_placement(snapshot: &Snapshot, job: &JobRequest) -> Option<Placement> {
        let gpu_count = job.resources.gpu_count as usize;

        let node = snapshot
            .fresh_nodes()
            .filter(|n| n.free_gpus.len() >= gpu_count)
            .filter(|n| {
                n.best_volume(job.resources.storage_kind, job.resources.storage_gb)
                    .is_some()
            })
            .min_by(|a, b| {
                (a.free_gpus.len() - gpu_count)
                    .cmp(&(b.free_gpus.len() - gpu_count))
                    .then_with(|| a.node.cmp(&b.node))
            })?;

        let volume = node
            .best_volume(job.resources.storage_kind, job.resources.storage_gb)?
            .path
            .clone();

        let mut gpu_indices = node.free_gpus.clone();
        gpu_indices.sort_unstable();
        gpu_indices.truncate(gpu_count);

        Some(Placement {
            node: node.node.clone(),
            gpu_indices,
            volume,
        })
    }

    /// Deduct an admitted allocation from the working snapshot
    ///
    /// Shared volumes are one filesystem, so the deduction applies to every
    /// node reporting that path.
    fn apply(snapshot: &mut Snapshot, allocation: &Allocation) {
        let shared_volume = snapshot
            .node(&allocation.node)
            .and_then(|n| n.volumes.iter().find(|v| v.path == allocation.volume))
            .map(|v| v.kind == greslet_core::StorageKind::Shared)
            .unwrap_or(false);

        for node in &mut snapshot.nodes {
            if node.node == allocation.node {
                node.free_gpus.retain(|i| !allocation.gpu_indices.contains(i));
            }
            for volume in &mut node.volumes {
                let applies = volume.path == allocation.volume
                    && (node.node == allocation.node || shared_volume);
                if applies {
                    volume.free_gb = (volume.free_gb - allocation.storage_gb).max(0.0);
                }
            }
        }
    }

    /// Match ranked jobs to resources, reserving each admission in the store
    ///
    /// Returns the admitted allocations and the jobs left pending for the
    /// next cycle. One job's failure never aborts the pass.
    pub async fn allocate(
        &self,
        ranked: Vec<JobRequest>,
        mut snapshot: Snapshot,
        store: &SnapshotStore,
        now: DateTime<Utc>,
    ) -> (Vec<Allocation>, Vec<JobRequest>) {
        let mut admitted = Vec::new();
        let mut unmet = Vec::new();

        'jobs: for job in ranked {
            for attempt in 0..=self.conflict_retry {
                let Some(placement) = Self::find_placement(&snapshot, &job) else {
                    debug!(
                        job_id = %job.id,
                        user = %job.user,
                        gpus = job.resources.gpu_count,
                        "Capacity unavailable, job stays pending"
                    );
                    unmet.push(job);
                    continue 'jobs;
                };

                let allocation = Allocation::new(
                    &job,
                    placement.node,
                    placement.gpu_indices,
                    placement.volume,
                    now,
                );

                match store.reserve_at(&allocation, now).await {
                    Ok(()) => {
                        Self::apply(&mut snapshot, &allocation);
                        admitted.push(allocation);
                        continue 'jobs;
                    }
                    Err(GresletError::Conflict(reason)) | Err(GresletError::StaleNode(reason)) => {
                        debug!(
                            job_id = %job.id,
                            attempt = attempt,
                            reason = %reason,
                            "Reservation raced, refreshing snapshot"
                        );
                        snapshot = store.query_at(now).await;
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Reservation failed, deferring job");
                        unmet.push(job);
                        continue 'jobs;
                    }
                }
            }
            unmet.push(job);
        }

        (admitted, unmet)
    }
}
