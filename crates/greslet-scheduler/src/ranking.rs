//! Per-user fairness ranking
//!
//! Priority decreases with recent consumption: the ledger accumulates
//! GPU-seconds from finished allocations, running allocations are charged
//! their current elapsed time, and the monitor's externally observed GPU
//! counts rank ahead of both so a user hogging devices outside the
//! scheduler still queues behind everyone else.

use chrono::{DateTime, Utc};
use greslet_core::{Allocation, JobRequest};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// One charged consumption record
#[derive(Debug, Clone)]
struct UsageRecord {
    user: String,
    gpu_seconds: f64,
    recorded_at: DateTime<Utc>,
}

/// Rolling per-user GPU-seconds accounting
pub struct UsageLedger {
    window: chrono::Duration,
    records: RwLock<Vec<UsageRecord>>,
}

impl UsageLedger {
    /// Create a ledger with the given trailing window
    pub fn new(window: chrono::Duration) -> Self {
        Self {
            window,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Record consumption for a finished allocation
    pub async fn charge(&self, user: &str, gpu_seconds: f64, at: DateTime<Utc>) {
        debug!(user = user, gpu_seconds = gpu_seconds, "Charging usage");
        self.records.write().await.push(UsageRecord {
            user: user.to_string(),
            gpu_seconds,
            recorded_at: at,
        });
    }

    /// Drop records that have aged out of the window
    pub async fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        self.records.write().await.retain(|r| r.recorded_at >= cutoff);
    }

    /// Per-user GPU-seconds within the window, running allocations included
    pub async fn usage_within(
        &self,
        now: DateTime<Utc>,
        running: &[Allocation],
    ) -> HashMap<String, f64> {
        let cutoff = now - self.window;
        let window_secs = self.window.num_seconds().max(0) as f64;
        let mut usage: HashMap<String, f64> = HashMap::new();

        for record in self.records.read().await.iter() {
            if record.recorded_at >= cutoff {
                *usage.entry(record.user.clone()).or_insert(0.0) += record.gpu_seconds;
            }
        }

        for alloc in running {
            let charged = alloc
                .gpu_indices
                .len() as f64
                * (alloc.elapsed_secs(now) as f64).min(window_secs);
            *usage.entry(alloc.user.clone()).or_insert(0.0) += charged;
        }

        usage
    }
}

/// Order pending jobs into a strict, reproducible sequence
///
/// Sort keys, in order: externally observed GPU count ascending, windowed
/// GPU-seconds ascending, submission time ascending, job id ascending. The
/// final id key makes the order total, so identical inputs always produce
/// identical output.
pub fn rank(
    mut pending: Vec<JobRequest>,
    usage: &HashMap<String, f64>,
    observed: &HashMap<String, u32>,
) -> Vec<JobRequest> {
    pending.sort_by(|a, b| {
        let a_observed = observed.get(&a.user).copied().unwrap_or(0);
        let b_observed = observed.get(&b.user).copied().unwrap_or(0);
        let a_usage = usage.get(&a.user).copied().unwrap_or(0.0);
        let b_usage = usage.get(&b.user).copied().unwrap_or(0.0);

        a_observed
            .cmp(&b_observed)
            .then_with(|| a_usage.total_cmp(&b_usage))
            .then_with(|| a.submitted_at.cmp(&b.submitted_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use greslet_core::{ResourceSpec, StorageKind};
    use uuid::Uuid;

    fn job_at(user: &str, submitted_at: DateTime<Utc>) -> JobRequest {
        let mut job = JobRequest::new(
            user.to_string(),
            format!("/homes/53/{}/run.sh", user),
            ResourceSpec {
                gpu_count: 1,
                storage_kind: StorageKind::Shared,
                storage_gb: 1.0,
            },
            3600,
        );
        job.submitted_at = submitted_at;
        job
    }

    #[test]
    fn test_heavier_recent_user_ranks_lower() {
        let now = Utc::now();
        let heavy = job_at("heavy", now);
        let light = job_at("light", now);

        let mut usage = HashMap::new();
        usage.insert("heavy".to_string(), 50_000.0);
        usage.insert("light".to_string(), 10.0);

        let ranked = rank(vec![heavy.clone(), light.clone()], &usage, &HashMap::new());
        assert_eq!(ranked[0].id, light.id);
        assert_eq!(ranked[1].id, heavy.id);
    }

    #[test]
    fn test_observed_gpus_outrank_ledger() {
        let now = Utc::now();
        let hog = job_at("hog", now);
        let clean = job_at("clean", now);

        // the hog has no ledger history but four GPUs visibly occupied
        let mut usage = HashMap::new();
        usage.insert("clean".to_string(), 1_000_000.0);
        let mut observed = HashMap::new();
        observed.insert("hog".to_string(), 4);

        let ranked = rank(vec![hog.clone(), clean.clone()], &usage, &observed);
        assert_eq!(ranked[0].id, clean.id);
    }

    #[test]
    fn test_tie_breaks_by_submission_then_id() {
        let now = Utc::now();
        let early = job_at("alice", now - Duration::seconds(60));
        let late = job_at("alice", now);

        let ranked = rank(vec![late.clone(), early.clone()], &HashMap::new(), &HashMap::new());
        assert_eq!(ranked[0].id, early.id);

        let mut a = job_at("alice", now);
        let mut b = job_at("alice", now);
        a.id = Uuid::from_u128(1);
        b.id = Uuid::from_u128(2);
        let ranked = rank(vec![b.clone(), a.clone()], &HashMap::new(), &HashMap::new());
        assert_eq!(ranked[0].id, a.id);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let now = Utc::now();
        let jobs: Vec<JobRequest> = (0..8)
            .map(|i| job_at(&format!("user{}", i % 3), now - Duration::seconds(i)))
            .collect();
        let mut usage = HashMap::new();
        usage.insert("user0".to_string(), 300.0);
        usage.insert("user1".to_string(), 300.0);

        let first = rank(jobs.clone(), &usage, &HashMap::new());
        let second = rank(jobs, &usage, &HashMap::new());
        let first_ids: Vec<Uuid> = first.iter().map(|j| j.id).collect();
        let second_ids: Vec<Uuid> = second.iter().map(|j| j.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_ledger_window_pruning() {
        let ledger = UsageLedger::new(Duration::seconds(3600));
        let now = Utc::now();

        ledger.charge("alice", 100.0, now - Duration::seconds(7200)).await;
        ledger.charge("alice", 40.0, now - Duration::seconds(60)).await;
        ledger.prune(now).await;

        let usage = ledger.usage_within(now, &[]).await;
        assert!((usage["alice"] - 40.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_running_allocations_are_charged() {
        use greslet_core::Allocation;

        let ledger = UsageLedger::new(Duration::days(7));
        let now = Utc::now();
        let job = job_at("bob", now - Duration::seconds(500));
        let running = Allocation::new(
            &job,
            "torrnode1".to_string(),
            vec![0, 1],
            "/storage".to_string(),
            now - Duration::seconds(500),
        );

        let usage = ledger.usage_within(now, &[running]).await;
        assert!((usage["bob"] - 1000.0).abs() < f64::EPSILON);
    }
}
