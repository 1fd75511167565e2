//! In-memory submission store
//!
//! Suitable for tests and single-process setups; acknowledgments do not
//! survive a restart, unlike the file-backed store.

use async_trait::async_trait;
use greslet_core::{GresletResult, JobRequest};
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::traits::SubmissionStore;

/// Submission store held entirely in memory
#[derive(Default)]
pub struct MemorySubmissionStore {
    jobs: RwLock<Vec<JobRequest>>,
    acked: RwLock<HashSet<Uuid>>,
}

impl MemorySubmissionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn submit(&self, job: &JobRequest) -> GresletResult<()> {
        self.jobs.write().await.push(job.clone());
        Ok(())
    }

    async fn fetch_pending(&self) -> GresletResult<Vec<JobRequest>> {
        let acked = self.acked.read().await;
        let mut pending: Vec<JobRequest> = self
            .jobs
            .read()
            .await
            .iter()
            .filter(|j| !acked.contains(&j.id))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn acknowledge(&self, job_id: Uuid) -> GresletResult<()> {
        self.acked.write().await.insert(job_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greslet_core::ResourceSpec;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySubmissionStore::new();
        let job = JobRequest::new(
            "alice".to_string(),
            "/homes/53/alice/run.sh".to_string(),
            ResourceSpec::default(),
            600,
        );

        store.submit(&job).await.unwrap();
        assert_eq!(store.fetch_pending().await.unwrap().len(), 1);

        store.acknowledge(job.id).await.unwrap();
        assert!(store.fetch_pending().await.unwrap().is_empty());
    }
}
