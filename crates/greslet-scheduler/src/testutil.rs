//! Shared test doubles for scheduler tests

use async_trait::async_trait;
use greslet_core::{Allocation, ExecStatus, GresletError, GresletResult};
use greslet_exec::Launcher;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Launcher whose answers are scripted by the test
pub(crate) struct ScriptedLauncher {
    statuses: RwLock<HashMap<Uuid, ExecStatus>>,
    fail_terminate: AtomicBool,
    started: RwLock<Vec<Uuid>>,
    terminated: RwLock<Vec<Uuid>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            fail_terminate: AtomicBool::new(false),
            started: RwLock::new(Vec::new()),
            terminated: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_status(&self, id: Uuid, status: ExecStatus) {
        self.statuses.write().await.insert(id, status);
    }

    pub fn set_fail_terminate(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    pub async fn started(&self) -> Vec<Uuid> {
        self.started.read().await.clone()
    }

    pub async fn terminated(&self) -> Vec<Uuid> {
        self.terminated.read().await.clone()
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn start(&self, allocation: &Allocation) -> GresletResult<()> {
        self.started.write().await.push(allocation.id);
        self.statuses
            .write()
            .await
            .entry(allocation.id)
            .or_insert(ExecStatus::Running);
        Ok(())
    }

    async fn terminate(&self, allocation: &Allocation) -> GresletResult<()> {
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(GresletError::TerminationFailed(format!(
                "{} unreachable",
                allocation.node
            )));
        }
        self.terminated.write().await.push(allocation.id);
        Ok(())
    }

    async fn status(&self, allocation: &Allocation) -> GresletResult<ExecStatus> {
        Ok(self
            .statuses
            .read()
            .await
            .get(&allocation.id)
            .copied()
            .unwrap_or(ExecStatus::Unknown))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
