//! gpusched-core: Core types for the gpusched scheduler
//!
//! This crate provides the fundamental types used throughout gpusched:
//! - Devices (opaque leasing tokens for GPU or CPU slots)
//! - Job specifications, states and read-only job views
//! - Configuration types
//! - Error handling

pub mod config;
pub mod device;
pub mod error;
pub mod job;

pub use config::*;
pub use device::*;
pub use error::*;
pub use job::*;
