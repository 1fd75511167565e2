//! Allocation lifecycle types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::JobRequest;

/// Lifecycle state of an allocation
///
/// Normal path: `Running -> Completed`.
/// Forced path: `Running -> Overdue -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationState {
    /// The job's script is (believed to be) running on the node
    Running,
    /// Elapsed time reached the limit; termination requested but unconfirmed
    Overdue,
    /// The job finished on its own before the limit
    Completed,
    /// The job was forcibly stopped after overrunning its limit
    Terminated,
}

impl std::fmt::Display for AllocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationState::Running => write!(f, "Running"),
            AllocationState::Overdue => write!(f, "Overdue"),
            AllocationState::Completed => write!(f, "Completed"),
            AllocationState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Process status reported by the node execution adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    /// Script process is alive
    Running,
    /// Script exited cleanly
    Completed,
    /// Script exited with an error
    Failed,
    /// Adapter cannot tell (e.g. node unreachable)
    Unknown,
}

/// A binding of one job to concrete resources on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Unique allocation identifier
    pub id: Uuid,
    /// Job this allocation satisfies
    pub job_id: Uuid,
    /// Owning user, copied from the request
    pub user: String,
    /// Script to run, copied from the request
    pub script: String,
    /// Assigned node
    pub node: String,
    /// Assigned GPU indices, exclusively owned
    pub gpu_indices: Vec<u32>,
    /// Mountpoint of the assigned volume
    pub volume: String,
    /// Storage reserved on the volume in GB
    pub storage_gb: f64,
    /// When resources were bound
    pub started_at: DateTime<Utc>,
    /// Wall-clock limit in seconds, copied from the request
    pub time_limit_secs: u64,
    /// Current lifecycle state
    pub state: AllocationState,
}

impl Allocation {
    /// Bind a job to concrete resources, starting the clock at `now`
    pub fn new(
        job: &JobRequest,
        node: String,
        gpu_indices: Vec<u32>,
        volume: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            user: job.user.clone(),
            script: job.script.clone(),
            node,
            gpu_indices,
            volume,
            storage_gb: job.resources.storage_gb,
            started_at: now,
            time_limit_secs: job.time_limit_secs,
            state: AllocationState::Running,
        }
    }

    /// Elapsed wall-clock seconds at `now`, never negative
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_seconds().max(0) as u64
    }

    /// True once elapsed time has reached the limit
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_secs(now) >= self.time_limit_secs
    }

    /// GPU-seconds consumed so far at `now`
    pub fn gpu_seconds(&self, now: DateTime<Utc>) -> f64 {
        self.gpu_indices.len() as f64 * self.elapsed_secs(now) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResourceSpec, StorageKind};
    use chrono::Duration;

    fn test_job() -> JobRequest {
        JobRequest::new(
            "csbotos".to_string(),
            "/homes/53/csbotos/train.sh".to_string(),
            ResourceSpec {
                gpu_count: 2,
                storage_kind: StorageKind::Shared,
                storage_gb: 10.0,
            },
            3600,
        )
    }

    #[test]
    fn test_allocation_from_job() {
        let job = test_job();
        let now = Utc::now();
        let alloc = Allocation::new(&job, "torrnode1".to_string(), vec![0, 1], "/storage".to_string(), now);

        assert_eq!(alloc.job_id, job.id);
        assert_eq!(alloc.gpu_indices, vec![0, 1]);
        assert_eq!(alloc.state, AllocationState::Running);
        assert_eq!(alloc.time_limit_secs, 3600);
    }

    #[test]
    fn test_overdue() {
        let job = test_job();
        let start = Utc::now();
        let alloc = Allocation::new(&job, "torrnode1".to_string(), vec![0, 1], "/storage".to_string(), start);

        assert!(!alloc.is_overdue(start + Duration::seconds(3599)));
        assert!(alloc.is_overdue(start + Duration::seconds(3600)));
        assert!(alloc.is_overdue(start + Duration::seconds(5000)));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let job = test_job();
        let start = Utc::now();
        let alloc = Allocation::new(&job, "torrnode1".to_string(), vec![0], "/storage".to_string(), start);

        // clock skew between producer and store must not underflow
        assert_eq!(alloc.elapsed_secs(start - Duration::seconds(30)), 0);
    }

    #[test]
    fn test_gpu_seconds() {
        let job = test_job();
        let start = Utc::now();
        let alloc = Allocation::new(&job, "torrnode1".to_string(), vec![0, 1], "/storage".to_string(), start);

        let used = alloc.gpu_seconds(start + Duration::seconds(100));
        assert!((used - 200.0).abs() < f64::EPSILON);
    }
}
