//! greslet-state: Cluster resource snapshot store
//!
//! This crate holds the scheduler's view of the fleet:
//! - Monitor report ingestion with freshness stamps
//! - Copy-on-read snapshots with staleness filtering
//! - Atomic reservation and idempotent release of GPU slots and storage

pub mod snapshot;
pub mod store;

pub use snapshot::{NodeSnapshot, Snapshot, VolumeSnapshot};
pub use store::SnapshotStore;
