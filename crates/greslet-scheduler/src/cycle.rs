//! The scheduling loop
//!
//! One cycle runs poll, rank, allocate and lifecycle in a fixed order, so
//! every decision inside a cycle sees one consistent view. A job admission
//! only survives the cycle once its acknowledgment is durable; the dispatch
//! itself is reconciled by status polling, never awaited.

use chrono::{DateTime, Utc};
use greslet_core::SchedulerConfig;
use greslet_exec::Launcher;
use greslet_queue::QueueAdapter;
use greslet_state::SnapshotStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::allocator::Allocator;
use crate::lifecycle::{LifecycleMonitor, TickSummary};
use crate::ranking::{rank, UsageLedger};

/// Counters for one full cycle
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    /// Pending submissions seen this cycle
    pub polled: usize,
    /// Jobs admitted and acknowledged
    pub admitted: usize,
    /// Jobs left pending for the next cycle
    pub deferred: usize,
    /// Lifecycle pass counters
    pub lifecycle: TickSummary,
}

/// Top-level driver running scheduling cycles on a fixed cadence
pub struct SchedulingLoop {
    config: SchedulerConfig,
    store: Arc<SnapshotStore>,
    queue: Arc<QueueAdapter>,
    ledger: Arc<UsageLedger>,
    lifecycle: Arc<LifecycleMonitor>,
    launcher: Arc<dyn Launcher>,
    allocator: Allocator,
}

impl SchedulingLoop {
    /// Wire up a loop over the shared components
    pub fn new(
        config: SchedulerConfig,
        store: Arc<SnapshotStore>,
        queue: Arc<QueueAdapter>,
        ledger: Arc<UsageLedger>,
        lifecycle: Arc<LifecycleMonitor>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let allocator = Allocator::new(config.conflict_retry);
        Self {
            config,
            store,
            queue,
            ledger,
            lifecycle,
            launcher,
            allocator,
        }
    }

    /// Run cycles until the shutdown signal flips
    ///
    /// The in-flight cycle always finishes; no new cycle starts afterwards.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.cycle_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.cycle_interval_secs,
            "Scheduling loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_cycle(Utc::now()).await;
                    debug!(
                        polled = summary.polled,
                        admitted = summary.admitted,
                        deferred = summary.deferred,
                        completed = summary.lifecycle.completed,
                        terminated = summary.lifecycle.terminated,
                        overdue = summary.lifecycle.overdue,
                        "Cycle finished"
                    );
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        info!("Scheduling loop stopped");
    }

    /// One scheduling cycle at `now`
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleSummary {
        let mut summary = CycleSummary::default();

        // 1. new submissions; a queue hiccup skips admission, not lifecycle
        let pending = match self.queue.poll().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Queue poll failed, no admissions this cycle");
                Vec::new()
            }
        };
        summary.polled = pending.len();

        // 2. fairness order from ledger + monitor observations
        self.ledger.prune(now).await;
        let running = self.lifecycle.active().await;
        let usage = self.ledger.usage_within(now, &running).await;
        let observed = self.store.observed_gpu_usage(now).await;
        let ranked = rank(pending, &usage, &observed);

        // 3. match jobs to resources and make the admissions durable
        let snapshot = self.store.query_at(now).await;
        let (admitted, unmet) = self
            .allocator
            .allocate(ranked, snapshot, &self.store, now)
            .await;
        summary.deferred = unmet.len();

        for allocation in admitted {
            if let Err(e) = self.queue.acknowledge(allocation.job_id).await {
                // never dispatch past a non-durable acknowledgment
                warn!(
                    job_id = %allocation.job_id,
                    error = %e,
                    "Acknowledgment did not persist, deferring job"
                );
                self.store.release(allocation.id).await;
                summary.deferred += 1;
                continue;
            }

            if let Err(e) = self.launcher.start(&allocation).await {
                // keep the allocation; the status poll will observe the
                // failure and reclaim its resources next cycle
                warn!(
                    allocation_id = %allocation.id,
                    node = %allocation.node,
                    error = %e,
                    "Dispatch failed, reclaim via status polling"
                );
            }

            self.lifecycle.register(allocation).await;
            summary.admitted += 1;
        }

        // 4. time limits, completions, overdue kills
        summary.lifecycle = self.lifecycle.tick(now).await;

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedLauncher;
    use async_trait::async_trait;
    use chrono::Duration;
    use greslet_core::{
        ExecStatus, GpuReport, GresletError, GresletResult, JobRequest, NodeReport, ResourceSpec,
        StorageKind, VolumeReport,
    };
    use greslet_queue::{MemorySubmissionStore, SubmissionStore};
    use uuid::Uuid;

    fn report(node: &str, gpus: u32, free_gb: f64) -> NodeReport {
        NodeReport {
            node: node.to_string(),
            gpus: (0..gpus).map(|index| GpuReport { index, user: None }).collect(),
            volumes: vec![VolumeReport {
                path: "/storage".to_string(),
                kind: StorageKind::Shared,
                free_gb,
                read_gbps: 1.0,
                write_gbps: 1.0,
            }],
            reported_at: Utc::now(),
        }
    }

    fn job(user: &str, gpus: u32, storage_gb: f64, submitted_at: DateTime<Utc>) -> JobRequest {
        let mut job = JobRequest::new(
            user.to_string(),
            format!("/homes/53/{}/run.sh", user),
            ResourceSpec {
                gpu_count: gpus,
                storage_kind: StorageKind::Shared,
                storage_gb,
            },
            3600,
        );
        job.submitted_at = submitted_at;
        job
    }

    struct Harness {
        store: Arc<SnapshotStore>,
        submissions: Arc<MemorySubmissionStore>,
        queue: Arc<QueueAdapter>,
        launcher: Arc<ScriptedLauncher>,
        lifecycle: Arc<LifecycleMonitor>,
        scheduler: SchedulingLoop,
    }

    fn harness_with(submissions: Arc<dyn SubmissionStore>) -> (Arc<SnapshotStore>, Arc<QueueAdapter>, Arc<ScriptedLauncher>, Arc<LifecycleMonitor>, SchedulingLoop) {
        let config = SchedulerConfig::default();
        let store = Arc::new(SnapshotStore::new(config.staleness_threshold()));
        let queue = Arc::new(QueueAdapter::new(submissions));
        let ledger = Arc::new(UsageLedger::new(Duration::seconds(
            config.usage_window_secs as i64,
        )));
        let launcher = Arc::new(ScriptedLauncher::new());
        let lifecycle = Arc::new(LifecycleMonitor::new(
            store.clone(),
            launcher.clone(),
            ledger.clone(),
        ));
        let scheduler = SchedulingLoop::new(
            config,
            store.clone(),
            queue.clone(),
            ledger,
            lifecycle.clone(),
            launcher.clone(),
        );
        (store, queue, launcher, lifecycle, scheduler)
    }

    fn harness() -> Harness {
        let submissions = Arc::new(MemorySubmissionStore::new());
        let (store, queue, launcher, lifecycle, scheduler) = harness_with(submissions.clone());
        Harness {
            store,
            submissions,
            queue,
            launcher,
            lifecycle,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_cycle_admits_feasible_job() {
        let h = harness();
        let now = Utc::now();
        h.store.ingest_at(report("torrnode1", 4, 100.0), now).await;

        let j = job("alice", 2, 10.0, now);
        h.submissions.submit(&j).await.unwrap();

        let summary = h.scheduler.run_cycle(now).await;
        assert_eq!(summary.polled, 1);
        assert_eq!(summary.admitted, 1);

        // allocation live, script dispatched, submission consumed
        let active = h.lifecycle.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].job_id, j.id);
        assert_eq!(active[0].gpu_indices.len(), 2);
        assert_eq!(h.launcher.started().await.len(), 1);
        assert!(h.queue.poll().await.unwrap().is_empty());

        let snapshot = h.store.query_at(now).await;
        assert_eq!(snapshot.node("torrnode1").unwrap().free_gpu_count(), 2);
    }

    #[tokio::test]
    async fn test_earlier_submission_wins_equal_rank() {
        let h = harness();
        let now = Utc::now();
        h.store.ingest_at(report("torrnode1", 4, 100.0), now).await;

        let early = job("alice", 2, 0.0, now - Duration::seconds(120));
        let late = job("bob", 3, 0.0, now - Duration::seconds(60));
        // submission order must not matter, only timestamps
        h.submissions.submit(&late).await.unwrap();
        h.submissions.submit(&early).await.unwrap();

        let summary = h.scheduler.run_cycle(now).await;
        assert_eq!(summary.admitted, 1);
        assert_eq!(summary.deferred, 1);

        let active = h.lifecycle.active().await;
        assert_eq!(active[0].job_id, early.id);

        // the deferred job is admitted once capacity frees
        h.launcher.set_status(active[0].id, ExecStatus::Completed).await;
        let later = now + Duration::seconds(10);
        let summary = h.scheduler.run_cycle(later).await;
        assert_eq!(summary.lifecycle.completed, 1);

        let summary = h.scheduler.run_cycle(later + Duration::seconds(10)).await;
        assert_eq!(summary.admitted, 1);
        let active = h.lifecycle.active().await;
        assert_eq!(active[0].job_id, late.id);
    }

    #[tokio::test]
    async fn test_job_acknowledged_exactly_once() {
        let h = harness();
        let now = Utc::now();
        h.store.ingest_at(report("torrnode1", 4, 100.0), now).await;

        let j = job("alice", 1, 0.0, now);
        h.submissions.submit(&j).await.unwrap();

        h.scheduler.run_cycle(now).await;
        // a second cycle must not see or re-admit the job
        let summary = h.scheduler.run_cycle(now + Duration::seconds(10)).await;
        assert_eq!(summary.polled, 0);
        assert_eq!(summary.admitted, 0);
        assert_eq!(h.lifecycle.active().await.len(), 1);
    }

    /// A store whose acknowledgments always fail to persist.
    struct BrokenAckStore(MemorySubmissionStore);

    #[async_trait]
    impl SubmissionStore for BrokenAckStore {
        async fn submit(&self, job: &JobRequest) -> GresletResult<()> {
            self.0.submit(job).await
        }
        async fn fetch_pending(&self) -> GresletResult<Vec<JobRequest>> {
            self.0.fetch_pending().await
        }
        async fn acknowledge(&self, _job_id: Uuid) -> GresletResult<()> {
            Err(GresletError::DurableWrite("disk full".to_string()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_failed_acknowledgment_releases_reservation() {
        let submissions = Arc::new(BrokenAckStore(MemorySubmissionStore::new()));
        let (store, queue, launcher, lifecycle, scheduler) = harness_with(submissions.clone());

        let now = Utc::now();
        store.ingest_at(report("torrnode1", 4, 100.0), now).await;
        let j = job("alice", 2, 10.0, now);
        submissions.submit(&j).await.unwrap();

        let summary = scheduler.run_cycle(now).await;

        // nothing admitted, nothing dispatched, all resources back
        assert_eq!(summary.admitted, 0);
        assert_eq!(summary.deferred, 1);
        assert!(lifecycle.active().await.is_empty());
        assert!(launcher.started().await.is_empty());
        let snapshot = store.query_at(now).await;
        assert_eq!(snapshot.node("torrnode1").unwrap().free_gpu_count(), 4);

        // still pending for the next cycle
        assert_eq!(queue.poll().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_fleet_admits_nothing() {
        let h = harness();
        let t0 = Utc::now();
        h.store.ingest_at(report("torrnode1", 4, 100.0), t0).await;

        let later = t0 + Duration::seconds(600);
        let j = job("alice", 1, 0.0, later);
        h.submissions.submit(&j).await.unwrap();

        let summary = h.scheduler.run_cycle(later).await;
        assert_eq!(summary.admitted, 0);
        assert_eq!(summary.deferred, 1);

        // a fresh report revives the node
        h.store.ingest_at(report("torrnode1", 4, 100.0), later).await;
        let summary = h.scheduler.run_cycle(later + Duration::seconds(10)).await;
        assert_eq!(summary.admitted, 1);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_stops_loop() {
        let h = harness();
        let (tx, rx) = watch::channel(false);

        let scheduler = Arc::new(h.scheduler);
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run(rx).await }
        });

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop after shutdown signal")
            .unwrap();
    }
}
