//! CLI commands implementation

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Job response from API
#[derive(Debug, Deserialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub user: String,
    pub script: String,
    pub gpu_count: u32,
    pub storage_kind: String,
    pub storage_gb: f64,
    pub time_limit_secs: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Volume entry from the nodes endpoint
#[derive(Debug, Deserialize)]
pub struct VolumeResponse {
    pub path: String,
    pub kind: String,
    pub free_gb: f64,
    pub read_gbps: f64,
    pub write_gbps: f64,
}

/// Node entry from the nodes endpoint
#[derive(Debug, Deserialize)]
pub struct NodeResponse {
    pub node: String,
    pub stale: bool,
    pub report_age_secs: i64,
    pub total_gpus: u32,
    pub free_gpus: Vec<u32>,
    pub volumes: Vec<VolumeResponse>,
}

/// Snapshot from the nodes endpoint
#[derive(Debug, Deserialize)]
pub struct SnapshotResponse {
    pub nodes: Vec<NodeResponse>,
}

/// Allocation response from API
#[derive(Debug, Deserialize)]
pub struct AllocationResponse {
    pub id: Uuid,
    #[allow(dead_code)]
    pub job_id: Uuid,
    pub user: String,
    pub node: String,
    pub gpu_indices: Vec<u32>,
    pub volume: String,
    pub state: String,
    pub elapsed_secs: u64,
    pub time_limit_secs: u64,
}

/// Status response
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub nodes: usize,
    pub pending_jobs: usize,
    pub active_allocations: usize,
}

/// Submit a job
pub async fn submit(
    client: &ApiClient,
    script: String,
    user: String,
    gres: u32,
    storage_kind: String,
    storage_gb: f64,
    time_limit_hours: u64,
) -> Result<()> {
    #[derive(Serialize)]
    struct SubmitRequest {
        user: String,
        script: String,
        gpu_count: u32,
        storage_kind: String,
        storage_gb: f64,
        time_limit_secs: u64,
    }

    let req = SubmitRequest {
        user,
        script,
        gpu_count: gres,
        storage_kind,
        storage_gb,
        time_limit_secs: time_limit_hours * 3600,
    };

    let response = client
        .client
        .post(client.url("/api/v1/jobs"))
        .json(&req)
        .send()
        .await?;

    if response.status().is_success() {
        let job: JobResponse = response.json().await?;
        println!("Queued job: {}", job.id);
        println!("  User: {}", job.user);
        println!("  Script: {}", job.script);
        println!("  GPUs: {}", job.gpu_count);
        println!("  Storage: {} GB ({})", job.storage_gb, job.storage_kind);
        println!("  Time limit: {}h", job.time_limit_secs / 3600);
    } else {
        let error = response.text().await?;
        eprintln!("Failed to submit job: {}", error);
    }

    Ok(())
}

/// List pending jobs
pub async fn queue(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/api/v1/jobs")).send().await?;

    if response.status().is_success() {
        let jobs: Vec<JobResponse> = response.json().await?;

        if jobs.is_empty() {
            println!("No pending jobs");
        } else {
            println!(
                "{:<36} {:<12} {:<6} {:<10} {:<20}",
                "ID", "USER", "GPUS", "LIMIT", "SUBMITTED"
            );
            println!("{}", "-".repeat(90));
            for job in jobs {
                println!(
                    "{:<36} {:<12} {:<6} {:<10} {:<20}",
                    job.id,
                    job.user,
                    job.gpu_count,
                    format!("{}h", job.time_limit_secs / 3600),
                    job.submitted_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list jobs: {}", error);
    }

    Ok(())
}

/// Show fleet state
pub async fn nodes(client: &ApiClient) -> Result<()> {
    let response = client.client.get(client.url("/api/v1/nodes")).send().await?;

    if response.status().is_success() {
        let snapshot: SnapshotResponse = response.json().await?;

        if snapshot.nodes.is_empty() {
            println!("No nodes reported yet");
            return Ok(());
        }

        for node in snapshot.nodes {
            let marker = if node.stale { " (stale)" } else { "" };
            println!(
                "{}{} - {}/{} GPUs free, last report {}s ago",
                node.node,
                marker,
                node.free_gpus.len(),
                node.total_gpus,
                node.report_age_secs
            );
            for volume in node.volumes {
                println!(
                    "  {} ({}) - {:.1} GB free, {:.1}/{:.1} GB/s r/w",
                    volume.path, volume.kind, volume.free_gb, volume.read_gbps, volume.write_gbps
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get nodes: {}", error);
    }

    Ok(())
}

/// List active allocations
pub async fn allocations(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/allocations"))
        .send()
        .await?;

    if response.status().is_success() {
        let allocations: Vec<AllocationResponse> = response.json().await?;

        if allocations.is_empty() {
            println!("No active allocations");
        } else {
            println!(
                "{:<36} {:<12} {:<12} {:<10} {:<12} {:<10}",
                "ID", "USER", "NODE", "GPUS", "ELAPSED", "STATE"
            );
            println!("{}", "-".repeat(96));
            for a in allocations {
                let gpus: Vec<String> = a.gpu_indices.iter().map(|i| i.to_string()).collect();
                println!(
                    "{:<36} {:<12} {:<12} {:<10} {:<12} {:<10}",
                    a.id,
                    a.user,
                    a.node,
                    gpus.join(","),
                    format!("{}/{}s", a.elapsed_secs, a.time_limit_secs),
                    a.state
                );
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to list allocations: {}", error);
    }

    Ok(())
}

/// Show system status
pub async fn top(client: &ApiClient) -> Result<()> {
    let response = client
        .client
        .get(client.url("/api/v1/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;

        println!("greslet v{}", status.version);
        println!();
        println!("Nodes: {}", status.nodes);
        println!("Pending jobs: {}", status.pending_jobs);
        println!("Active allocations: {}", status.active_allocations);
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get status: {}", error);
    }

    Ok(())
}
