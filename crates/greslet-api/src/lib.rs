//! greslet-api: REST surface for the greslet daemon
//!
//! This crate exposes the daemon's HTTP endpoints:
//! - Monitor report ingestion
//! - Job submission
//! - Fleet, queue and allocation diagnostics

pub mod rest;

pub use rest::create_router;
