//! Submission store trait definitions

use async_trait::async_trait;
use greslet_core::{GresletResult, JobRequest};
use uuid::Uuid;

/// Durable store of job submissions
///
/// The concrete transport is swappable; the scheduler only relies on the
/// exactly-once contract: a submission is visible until acknowledged, and an
/// acknowledgment survives a process restart.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Durably record a new submission
    async fn submit(&self, job: &JobRequest) -> GresletResult<()>;

    /// All submissions not yet acknowledged
    async fn fetch_pending(&self) -> GresletResult<Vec<JobRequest>>;

    /// Durably mark a submission consumed so it is never returned again
    async fn acknowledge(&self, job_id: Uuid) -> GresletResult<()>;

    /// Store implementation name
    fn name(&self) -> &'static str;
}
