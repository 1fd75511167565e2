//! Allocation lifecycle tracking
//!
//! Walks every active allocation once per cycle: finished jobs release
//! their resources, overdue jobs get termination requests until one is
//! confirmed. Resources are never released while a termination is
//! unconfirmed, since a runaway process may still hold the GPUs.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use greslet_core::{Allocation, AllocationState, ExecStatus};
use greslet_exec::Launcher;
use greslet_state::SnapshotStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ranking::UsageLedger;

/// Counters for one lifecycle pass
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Allocations that finished on their own
    pub completed: usize,
    /// Allocations forcibly stopped after overrunning
    pub terminated: usize,
    /// Allocations still overdue with termination unconfirmed
    pub overdue: usize,
}

/// Tracks active allocations against their time limits
pub struct LifecycleMonitor {
    store: Arc<SnapshotStore>,
    launcher: Arc<dyn Launcher>,
    ledger: Arc<UsageLedger>,
    active: RwLock<HashMap<Uuid, Allocation>>,
}

impl LifecycleMonitor {
    /// Create a monitor over the given store, launcher and ledger
    pub fn new(
        store: Arc<SnapshotStore>,
        launcher: Arc<dyn Launcher>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            store,
            launcher,
            ledger,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Start tracking a freshly admitted allocation
    pub async fn register(&self, allocation: Allocation) {
        self.active.write().await.insert(allocation.id, allocation);
    }

    /// All tracked allocations, oldest first
    pub async fn active(&self) -> Vec<Allocation> {
        let mut allocations: Vec<Allocation> =
            self.active.read().await.values().cloned().collect();
        allocations.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        allocations
    }

    /// Retire an allocation: release resources and charge the ledger
    async fn finish(&self, mut allocation: Allocation, state: AllocationState, now: DateTime<Utc>) {
        allocation.state = state;
        self.store.release(allocation.id).await;
        self.ledger
            .charge(&allocation.user, allocation.gpu_seconds(now), now)
            .await;
        self.active.write().await.remove(&allocation.id);

        info!(
            allocation_id = %allocation.id,
            job_id = %allocation.job_id,
            user = %allocation.user,
            state = %state,
            elapsed_secs = allocation.elapsed_secs(now),
            "Allocation retired"
        );
    }

    async fn mark_overdue(&self, id: Uuid) {
        if let Some(alloc) = self.active.write().await.get_mut(&id) {
            alloc.state = AllocationState::Overdue;
        }
    }

    /// One lifecycle pass at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> TickSummary {
        let allocations = self.active().await;
        let statuses = join_all(allocations.iter().map(|a| self.launcher.status(a))).await;

        let mut summary = TickSummary::default();

        for (mut allocation, status) in allocations.into_iter().zip(statuses) {
            let status = status.unwrap_or_else(|e| {
                warn!(allocation_id = %allocation.id, error = %e, "Status poll failed");
                ExecStatus::Unknown
            });

            match status {
                ExecStatus::Completed | ExecStatus::Failed => {
                    // a process gone while overdue confirms the kill
                    if allocation.state == AllocationState::Overdue {
                        self.finish(allocation, AllocationState::Terminated, now).await;
                        summary.terminated += 1;
                    } else {
                        self.finish(allocation, AllocationState::Completed, now).await;
                        summary.completed += 1;
                    }
                }
                ExecStatus::Running | ExecStatus::Unknown => {
                    let overdue =
                        allocation.state == AllocationState::Overdue || allocation.is_overdue(now);
                    if !overdue {
                        continue;
                    }

                    if allocation.state != AllocationState::Overdue {
                        warn!(
                            allocation_id = %allocation.id,
                            user = %allocation.user,
                            elapsed_secs = allocation.elapsed_secs(now),
                            limit_secs = allocation.time_limit_secs,
                            "Allocation overran its limit"
                        );
                        self.mark_overdue(allocation.id).await;
                        allocation.state = AllocationState::Overdue;
                    }

                    match self.launcher.terminate(&allocation).await {
                        Ok(()) => {
                            self.finish(allocation, AllocationState::Terminated, now).await;
                            summary.terminated += 1;
                        }
                        Err(e) => {
                            // resources stay reserved until the kill is confirmed
                            warn!(
                                allocation_id = %allocation.id,
                                node = %allocation.node,
                                error = %e,
                                "Termination unconfirmed, will retry next cycle"
                            );
                            summary.overdue += 1;
                        }
                    }
                }
            }
        }

        summary
    }
}
