//! gpusched-api: REST API server for gpusched
//!
//! Exposes the scheduler over HTTP:
//! - Job submission and lookup
//! - Queue and device listings
//! - Daemon status and settings

pub mod rest;

pub use rest::create_router;
