//! gpusched-runtime: Runtime abstraction layer
//!
//! This crate launches job commands as child processes:
//! - Device selection through an environment variable
//! - Combined stdout/stderr capture into an output file
//! - Non-blocking exit status polling

pub mod process;
pub mod traits;

pub use process::{exit_code_of, ProcessHandle, ProcessRuntime, ProcessRuntimeConfig};
pub use traits::Runtime;
