//! File-backed submission store
//!
//! Submissions live as one JSON file each under `<spool>/jobs/`; the set of
//! acknowledged ids lives in `<spool>/acked.json`. Both are written to a
//! temporary file and renamed into place, so a crash leaves either the old
//! or the new content, never a torn file.

use async_trait::async_trait;
use greslet_core::{GresletError, GresletResult, JobRequest};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::traits::SubmissionStore;

/// Spool-directory submission store
pub struct FileSubmissionStore {
    jobs_dir: PathBuf,
    acked_path: PathBuf,
    acked: RwLock<HashSet<Uuid>>,
}

impl FileSubmissionStore {
    /// Open (or create) a spool directory and load the acknowledgment ledger
    pub async fn open(spool_dir: PathBuf) -> GresletResult<Self> {
        let jobs_dir = spool_dir.join("jobs");
        tokio::fs::create_dir_all(&jobs_dir).await?;

        let acked_path = spool_dir.join("acked.json");
        let acked = match tokio::fs::read(&acked_path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<Uuid>>(&bytes)?
                .into_iter()
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            spool = %spool_dir.display(),
            acked = acked.len(),
            "Opened submission spool"
        );

        Ok(Self {
            jobs_dir,
            acked_path,
            acked: RwLock::new(acked),
        })
    }

    fn job_path(&self, id: Uuid) -> PathBuf {
        self.jobs_dir.join(format!("{}.json", id))
    }

    /// Write bytes to `path` via a temporary sibling and rename
    async fn write_atomic(path: &PathBuf, bytes: &[u8]) -> GresletResult<()> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn persist_acked(&self, acked: &HashSet<Uuid>) -> GresletResult<()> {
        let mut ids: Vec<Uuid> = acked.iter().copied().collect();
        ids.sort();
        let bytes = serde_json::to_vec_pretty(&ids)?;
        Self::write_atomic(&self.acked_path, &bytes)
            .await
            .map_err(|e| GresletError::DurableWrite(format!("acknowledgment ledger: {}", e)))
    }
}

#[async_trait]
impl SubmissionStore for FileSubmissionStore {
    async fn submit(&self, job: &JobRequest) -> GresletResult<()> {
        let bytes = serde_json::to_vec_pretty(job)?;
        Self::write_atomic(&self.job_path(job.id), &bytes)
            .await
            .map_err(|e| GresletError::DurableWrite(format!("submission {}: {}", job.id, e)))?;

        info!(job_id = %job.id, user = %job.user, "Spooled submission");
        Ok(())
    }

    async fn fetch_pending(&self) -> GresletResult<Vec<JobRequest>> {
        let acked = self.acked.read().await.clone();
        let mut pending = Vec::new();

        let mut entries = tokio::fs::read_dir(&self.jobs_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<JobRequest>(&bytes) {
                Ok(job) => {
                    if !acked.contains(&job.id) {
                        pending.push(job);
                    }
                }
                Err(e) => {
                    // a torn or foreign file must not wedge the whole queue
                    warn!(path = %path.display(), error = %e, "Skipping unreadable submission");
                }
            }
        }

        pending.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn acknowledge(&self, job_id: Uuid) -> GresletResult<()> {
        let mut acked = self.acked.write().await;
        if acked.contains(&job_id) {
            debug!(job_id = %job_id, "Submission already acknowledged");
            return Ok(());
        }

        let mut next = acked.clone();
        next.insert(job_id);
        // persist before the in-memory set so a failed write leaves the job pending
        self.persist_acked(&next).await?;
        *acked = next;

        debug!(job_id = %job_id, "Acknowledged submission");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
