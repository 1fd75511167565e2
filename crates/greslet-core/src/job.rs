//! Job submission types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StorageKind;

/// Resources a job asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Number of GPUs required, all on one node
    pub gpu_count: u32,
    /// Kind of storage the job writes to
    pub storage_kind: StorageKind,
    /// Storage space required in GB
    pub storage_gb: f64,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            gpu_count: 1,
            storage_kind: StorageKind::Shared,
            storage_gb: 0.0,
        }
    }
}

/// A user-submitted job request
///
/// Immutable once created; consumed exactly once by the queue adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Unique identifier assigned at submission
    pub id: Uuid,
    /// Submitting user
    pub user: String,
    /// Path to the script to run, on the shared filesystem
    pub script: String,
    /// Requested resources
    pub resources: ResourceSpec,
    /// Wall-clock limit in seconds
    pub time_limit_secs: u64,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
}

impl JobRequest {
    /// Create a new request with a fresh id, stamped now
    pub fn new(user: String, script: String, resources: ResourceSpec, time_limit_secs: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            script,
            resources,
            time_limit_secs,
            submitted_at: Utc::now(),
        }
    }
}
