//! Launcher trait definitions

use async_trait::async_trait;
use greslet_core::{Allocation, ExecStatus, GresletResult};

/// Node execution adapter
///
/// Dispatches an allocation's script on its assigned node and answers for
/// the process afterwards. `terminate` must be bounded in time; the caller
/// retries it across cycles until it is confirmed.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Dispatch the allocation's script on its node
    async fn start(&self, allocation: &Allocation) -> GresletResult<()>;

    /// Request forced termination of the allocation's process
    async fn terminate(&self, allocation: &Allocation) -> GresletResult<()>;

    /// Report the current process status
    async fn status(&self, allocation: &Allocation) -> GresletResult<ExecStatus>;

    /// Adapter name
    fn name(&self) -> &'static str;
}
