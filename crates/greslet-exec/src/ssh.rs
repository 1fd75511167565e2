//! SSH-based launcher
//!
//! Runs the job's script on the assigned node over ssh, pinning the process
//! to the assigned GPUs via CUDA_VISIBLE_DEVICES. The local ssh child is
//! kept as the handle to the remote process: its exit mirrors the script's
//! exit.

use async_trait::async_trait;
use greslet_core::{Allocation, ExecConfig, ExecStatus, GresletError, GresletResult};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::traits::Launcher;

/// Launcher that reaches nodes over ssh
pub struct SshLauncher {
    config: ExecConfig,
    children: RwLock<HashMap<Uuid, Child>>,
}

impl SshLauncher {
    /// Create a launcher with the given ssh settings
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            children: RwLock::new(HashMap::new()),
        }
    }

    fn gpu_list(allocation: &Allocation) -> String {
        allocation
            .gpu_indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Arguments for the dispatch command
    fn start_args(&self, allocation: &Allocation) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            allocation.node.clone(),
            format!("CUDA_VISIBLE_DEVICES={}", Self::gpu_list(allocation)),
            "bash".to_string(),
            allocation.script.clone(),
        ]
    }

    /// Arguments for the remote kill command
    fn kill_args(&self, allocation: &Allocation) -> Vec<String> {
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            allocation.node.clone(),
            "pkill".to_string(),
            "-u".to_string(),
            allocation.user.clone(),
            "-f".to_string(),
            allocation.script.clone(),
        ]
    }
}

#[async_trait]
impl Launcher for SshLauncher {
    async fn start(&self, allocation: &Allocation) -> GresletResult<()> {
        info!(
            allocation_id = %allocation.id,
            node = %allocation.node,
            gpus = %Self::gpu_list(allocation),
            script = %allocation.script,
            "Dispatching job script"
        );

        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.args(self.start_args(allocation));
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);

        match cmd.spawn() {
            Ok(child) => {
                debug!(
                    allocation_id = %allocation.id,
                    pid = child.id().unwrap_or(0),
                    "ssh child spawned"
                );
                self.children.write().await.insert(allocation.id, child);
                Ok(())
            }
            Err(e) => {
                error!(
                    allocation_id = %allocation.id,
                    node = %allocation.node,
                    error = %e,
                    "Failed to spawn ssh child"
                );
                Err(GresletError::Launch(format!(
                    "dispatch to {}: {}",
                    allocation.node, e
                )))
            }
        }
    }

    async fn terminate(&self, allocation: &Allocation) -> GresletResult<()> {
        info!(
            allocation_id = %allocation.id,
            node = %allocation.node,
            "Requesting forced termination"
        );

        // kill the remote process first; the local ssh child then hangs up
        let mut cmd = Command::new(&self.config.ssh_binary);
        cmd.args(self.kill_args(allocation));
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let deadline = Duration::from_secs(self.config.terminate_timeout_secs);
        let output = tokio::time::timeout(deadline, cmd.output())
            .await
            .map_err(|_| {
                GresletError::TerminationFailed(format!(
                    "{} did not answer within {}s",
                    allocation.node, self.config.terminate_timeout_secs
                ))
            })?
            .map_err(|e| {
                GresletError::TerminationFailed(format!("reaching {}: {}", allocation.node, e))
            })?;

        // pkill exits 1 when nothing matched, which is confirmation too
        let code = output.status.code().unwrap_or(-1);
        if code != 0 && code != 1 {
            return Err(GresletError::TerminationFailed(format!(
                "pkill on {} exited with {}",
                allocation.node, code
            )));
        }

        if let Some(mut child) = self.children.write().await.remove(&allocation.id) {
            if let Err(e) = child.kill().await {
                warn!(
                    allocation_id = %allocation.id,
                    error = %e,
                    "ssh child already gone"
                );
            }
        }

        Ok(())
    }

    async fn status(&self, allocation: &Allocation) -> GresletResult<ExecStatus> {
        let mut children = self.children.write().await;
        let Some(child) = children.get_mut(&allocation.id) else {
            return Ok(ExecStatus::Unknown);
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                children.remove(&allocation.id);
                if status.success() {
                    Ok(ExecStatus::Completed)
                } else {
                    Ok(ExecStatus::Failed)
                }
            }
            Ok(None) => Ok(ExecStatus::Running),
            Err(e) => {
                warn!(allocation_id = %allocation.id, error = %e, "try_wait failed");
                Ok(ExecStatus::Unknown)
            }
        }
    }

    fn name(&self) -> &'static str {
        "ssh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use greslet_core::{JobRequest, ResourceSpec, StorageKind};

    fn test_allocation() -> Allocation {
        let job = JobRequest::new(
            "csbotos".to_string(),
            "/homes/53/csbotos/train.sh".to_string(),
            ResourceSpec {
                gpu_count: 2,
                storage_kind: StorageKind::Shared,
                storage_gb: 10.0,
            },
            3600,
        );
        Allocation::new(&job, "torrnode3".to_string(), vec![0, 2], "/storage".to_string(), Utc::now())
    }

    #[test]
    fn test_start_args_pin_gpus() {
        let launcher = SshLauncher::new(ExecConfig::default());
        let args = launcher.start_args(&test_allocation());

        assert!(args.contains(&"torrnode3".to_string()));
        assert!(args.contains(&"CUDA_VISIBLE_DEVICES=0,2".to_string()));
        assert_eq!(args.last().unwrap(), "/homes/53/csbotos/train.sh");
    }

    #[test]
    fn test_kill_args_scope_to_user_and_script() {
        let launcher = SshLauncher::new(ExecConfig::default());
        let args = launcher.kill_args(&test_allocation());

        let joined = args.join(" ");
        assert!(joined.contains("pkill -u csbotos -f /homes/53/csbotos/train.sh"));
    }

    #[tokio::test]
    async fn test_status_without_child_is_unknown() {
        let launcher = SshLauncher::new(ExecConfig::default());
        let status = launcher.status(&test_allocation()).await.unwrap();
        assert_eq!(status, ExecStatus::Unknown);
    }
}
