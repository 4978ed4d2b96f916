//! Runtime trait definitions

use async_trait::async_trait;
use gpusched_core::{Device, GpuschedResult, JobSpec};

use crate::process::ProcessHandle;

/// Runtime trait for launching job processes on a leased device
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Start the job's command on `device`. Returns without waiting for the
    /// process to finish.
    async fn spawn(&self, spec: &JobSpec, device: &Device) -> GpuschedResult<ProcessHandle>;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}
