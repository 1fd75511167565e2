//! Queue adapter over a submission store
//!
//! Adds the scheduler-facing guarantees on top of whatever store backs the
//! queue: submission-time ordering within a poll, and a local cache of
//! acknowledged ids so a consumed job never reappears even if the store is
//! slow to reflect an acknowledgment.

use greslet_core::{GresletResult, JobRequest};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::traits::SubmissionStore;

/// Scheduler-facing view of the submission queue
pub struct QueueAdapter {
    store: Arc<dyn SubmissionStore>,
    acked: RwLock<HashSet<Uuid>>,
}

impl QueueAdapter {
    /// Wrap a submission store
    pub fn new(store: Arc<dyn SubmissionStore>) -> Self {
        Self {
            store,
            acked: RwLock::new(HashSet::new()),
        }
    }

    /// Newly visible submissions in submission-time order
    ///
    /// Returns an empty vector when nothing is pending; never blocks beyond
    /// the store call itself.
    pub async fn poll(&self) -> GresletResult<Vec<JobRequest>> {
        let mut pending = self.store.fetch_pending().await?;
        let acked = self.acked.read().await;
        pending.retain(|j| !acked.contains(&j.id));

        if !pending.is_empty() {
            debug!(count = pending.len(), "Polled pending submissions");
        }
        Ok(pending)
    }

    /// Durably mark a submission consumed
    ///
    /// The store acknowledgment happens first; only a persisted
    /// acknowledgment updates the local cache, so a failed write leaves the
    /// job pending for the next cycle.
    pub async fn acknowledge(&self, job_id: Uuid) -> GresletResult<()> {
        self.store.acknowledge(job_id).await?;
        self.acked.write().await.insert(job_id);
        Ok(())
    }
}
