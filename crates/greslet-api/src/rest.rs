//! REST API handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use greslet_core::{GresletError, JobRequest, NodeReport, ResourceSpec, StorageKind};
use greslet_queue::SubmissionStore;
use greslet_scheduler::LifecycleMonitor;
use greslet_state::{Snapshot, SnapshotStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub snapshot: Arc<SnapshotStore>,
    pub submissions: Arc<dyn SubmissionStore>,
    pub lifecycle: Arc<LifecycleMonitor>,
}

/// Create the API router
pub fn create_router(
    snapshot: Arc<SnapshotStore>,
    submissions: Arc<dyn SubmissionStore>,
    lifecycle: Arc<LifecycleMonitor>,
) -> Router {
    let state = Arc::new(AppState {
        snapshot,
        submissions,
        lifecycle,
    });

    Router::new()
        .route("/api/v1/reports", post(ingest_report))
        .route("/api/v1/nodes", get(get_nodes))
        .route("/api/v1/jobs", post(submit_job))
        .route("/api/v1/jobs", get(list_jobs))
        .route("/api/v1/allocations", get(list_allocations))
        .route("/api/v1/status", get(get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn internal(e: GresletError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Ingest one monitor report
async fn ingest_report(
    State(state): State<Arc<AppState>>,
    Json(report): Json<NodeReport>,
) -> StatusCode {
    state.snapshot.ingest(report).await;
    StatusCode::NO_CONTENT
}

/// Current fleet snapshot, stale nodes included
async fn get_nodes(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.snapshot.query().await)
}

/// Request to submit a job
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// Submitting user
    pub user: String,
    /// Script path on the shared filesystem
    pub script: String,
    /// Number of GPUs requested
    #[serde(default = "default_gpu_count")]
    pub gpu_count: u32,
    /// Storage kind requested
    #[serde(default = "default_storage_kind")]
    pub storage_kind: StorageKind,
    /// Storage space requested in GB
    #[serde(default)]
    pub storage_gb: f64,
    /// Wall-clock limit in seconds
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,
}

fn default_gpu_count() -> u32 {
    1
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Shared
}

fn default_time_limit() -> u64 {
    24 * 3600
}

/// Response for a queued or pending job
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub user: String,
    pub script: String,
    pub gpu_count: u32,
    pub storage_kind: String,
    pub storage_gb: f64,
    pub time_limit_secs: u64,
    pub submitted_at: chrono::DateTime<Utc>,
}

impl From<JobRequest> for JobResponse {
    fn from(job: JobRequest) -> Self {
        Self {
            id: job.id,
            user: job.user,
            script: job.script,
            gpu_count: job.resources.gpu_count,
            storage_kind: job.resources.storage_kind.to_string(),
            storage_gb: job.resources.storage_gb,
            time_limit_secs: job.time_limit_secs,
            submitted_at: job.submitted_at,
        }
    }
}

/// Queue a new job
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    info!(
        user = %req.user,
        script = %req.script,
        gpus = req.gpu_count,
        "Queueing job"
    );

    let job = JobRequest::new(
        req.user,
        req.script,
        ResourceSpec {
            gpu_count: req.gpu_count,
            storage_kind: req.storage_kind,
            storage_gb: req.storage_gb,
        },
        req.time_limit_secs,
    );

    state.submissions.submit(&job).await.map_err(internal)?;

    Ok(Json(JobResponse::from(job)))
}

/// List pending jobs
async fn list_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<JobResponse>>, (StatusCode, String)> {
    let pending = state.submissions.fetch_pending().await.map_err(internal)?;
    Ok(Json(pending.into_iter().map(JobResponse::from).collect()))
}

/// Response for an active allocation
#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub user: String,
    pub node: String,
    pub gpu_indices: Vec<u32>,
    pub volume: String,
    pub state: String,
    pub elapsed_secs: u64,
    pub time_limit_secs: u64,
}

/// List active allocations
async fn list_allocations(State(state): State<Arc<AppState>>) -> Json<Vec<AllocationResponse>> {
    let now = Utc::now();
    let allocations = state
        .lifecycle
        .active()
        .await
        .into_iter()
        .map(|a| AllocationResponse {
            id: a.id,
            job_id: a.job_id,
            user: a.user.clone(),
            node: a.node.clone(),
            gpu_indices: a.gpu_indices.clone(),
            volume: a.volume.clone(),
            state: a.state.to_string(),
            elapsed_secs: a.elapsed_secs(now),
            time_limit_secs: a.time_limit_secs,
        })
        .collect();
    Json(allocations)
}

/// System status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub nodes: usize,
    pub pending_jobs: usize,
    pub active_allocations: usize,
}

/// Get system status
async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let pending = state.submissions.fetch_pending().await.map_err(internal)?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        nodes: state.snapshot.node_count().await,
        pending_jobs: pending.len(),
        active_allocations: state.lifecycle.active().await.len(),
    }))
}
