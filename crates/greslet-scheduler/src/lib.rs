//! greslet-scheduler: Scheduling logic for greslet
//!
//! This crate makes the admission and eviction decisions:
//! - Per-user fairness ranking over pending jobs
//! - Greedy best-fit matching of jobs to nodes
//! - Lifecycle tracking of allocations against their time limits
//! - The fixed-cadence scheduling loop driving it all

pub mod allocator;
pub mod cycle;
pub mod lifecycle;
pub mod ranking;

#[cfg(test)]
mod testutil;

pub use allocator::Allocator;
pub use cycle::{CycleSummary, SchedulingLoop};
pub use lifecycle::{LifecycleMonitor, TickSummary};
pub use ranking::{rank, UsageLedger};
