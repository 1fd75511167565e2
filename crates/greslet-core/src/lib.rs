//! greslet-core: Core types for the greslet scheduler
//!
//! This crate provides the fundamental types used throughout the greslet system:
//! - Node reports fed by the resource monitor
//! - Job requests and resource specifications
//! - Allocations and their lifecycle states
//! - Configuration types
//! - Error handling

pub mod allocation;
pub mod config;
pub mod error;
pub mod job;
pub mod node;

pub use allocation::*;
pub use config::*;
pub use error::*;
pub use job::*;
pub use node::*;
