//! Process-based runtime implementation
//!
//! Jobs run as direct OS processes. The child inherits the daemon's
//! environment plus the device variable, and its combined output goes to the
//! job's output file when one is set.

use async_trait::async_trait;
use gpusched_core::{
    Device, GpuschedError, GpuschedResult, JobSpec, DEFAULT_DEVICE_ENV_VAR, SENTINEL_EXIT_CODE,
};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::process::{Child, Command};
use tracing::{debug, error};

use crate::traits::Runtime;

/// Process-based runtime configuration
#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    /// Environment variable set to the leased device id
    pub device_env_var: String,
}

impl Default for ProcessRuntimeConfig {
    fn default() -> Self {
        Self {
            device_env_var: DEFAULT_DEVICE_ENV_VAR.to_string(),
        }
    }
}

/// Shared handle to a spawned child process.
///
/// Cloning is shallow: every clone polls the same child, so a snapshot of the
/// running queue can be inspected without holding the queue's lock.
#[derive(Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    child: Arc<Mutex<Child>>,
}

impl ProcessHandle {
    /// Wrap a freshly spawned child
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
        }
    }

    /// OS process id, if the child had one when it was spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code if the process has terminated, `None` while it still runs.
    /// Never blocks.
    pub fn try_exit_code(&self) -> GpuschedResult<Option<i32>> {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        match child.try_wait() {
            Ok(Some(status)) => Ok(Some(exit_code_of(status))),
            Ok(None) => Ok(None),
            Err(e) => Err(GpuschedError::Runtime(format!(
                "Failed to poll process {:?}: {}",
                self.pid, e
            ))),
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid).finish()
    }
}

/// Map an exit status to a single code: the process's own code, `128 + n`
/// when killed by signal `n`, otherwise the sentinel.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    SENTINEL_EXIT_CODE
}

/// Process-based runtime for job commands
pub struct ProcessRuntime {
    config: ProcessRuntimeConfig,
}

impl ProcessRuntime {
    /// Create a new process runtime
    pub fn new(config: ProcessRuntimeConfig) -> Self {
        Self { config }
    }

    /// Build the command for a job on `device`
    fn build_command(&self, spec: &JobSpec, device: &Device) -> GpuschedResult<Command> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| GpuschedError::Runtime("Job command is empty".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.env(&self.config.device_env_var, device.as_str());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        Ok(cmd)
    }

    /// Open (truncating) the job's output file and point stdout and stderr at it
    async fn attach_output(&self, cmd: &mut Command, spec: &JobSpec) -> GpuschedResult<()> {
        let Some(path) = &spec.output_path else {
            return Ok(());
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| {
                GpuschedError::Runtime(format!(
                    "Failed to open output file {}: {}",
                    path.display(),
                    e
                ))
            })?
            .into_std()
            .await;
        let stderr = file.try_clone()?;

        cmd.stdout(Stdio::from(file));
        cmd.stderr(Stdio::from(stderr));
        Ok(())
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new(ProcessRuntimeConfig::default())
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn spawn(&self, spec: &JobSpec, device: &Device) -> GpuschedResult<ProcessHandle> {
        let mut cmd = self.build_command(spec, device)?;
        self.attach_output(&mut cmd, spec).await?;

        match cmd.spawn() {
            Ok(child) => {
                let handle = ProcessHandle::new(child);
                debug!(
                    name = %spec.name,
                    device = %device,
                    pid = ?handle.pid(),
                    "Job process spawned"
                );
                Ok(handle)
            }
            Err(e) => {
                error!(
                    name = %spec.name,
                    command = %spec.command_line(),
                    error = %e,
                    "Failed to spawn job process"
                );
                Err(GpuschedError::Runtime(format!(
                    "Failed to spawn '{}': {}",
                    spec.command_line(),
                    e
                )))
            }
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}
