//! Job records for each lifecycle stage
//!
//! A job is a different type in each queue, so "a device is set once
//! dispatched" and "an exit code is set once terminal" hold by construction.

use chrono::{DateTime, Utc};
use gpusched_core::{Device, JobId, JobSpec, JobState, JobView, SENTINEL_EXIT_CODE};
use gpusched_runtime::ProcessHandle;

/// A submitted job waiting for a free device
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub id: JobId,
    pub spec: JobSpec,
    pub submitted_at: DateTime<Utc>,
}

impl PendingJob {
    pub fn new(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            spec,
            submitted_at: Utc::now(),
        }
    }

    /// The job's process was spawned on `device`
    pub fn start(self, device: Device, process: ProcessHandle) -> RunningJob {
        RunningJob {
            id: self.id,
            spec: self.spec,
            device,
            process,
            submitted_at: self.submitted_at,
            started_at: Utc::now(),
        }
    }

    /// The job's process could not be spawned on `device`
    pub fn spawn_failed(self, device: Device, error: String) -> FinishedJob {
        FinishedJob {
            id: self.id,
            spec: self.spec,
            device,
            exit_code: SENTINEL_EXIT_CODE,
            spawn_error: Some(error),
            submitted_at: self.submitted_at,
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            name: self.spec.name.clone(),
            command: self.spec.command.clone(),
            output_path: self.spec.output_path.clone(),
            status: JobState::Pending,
            device: None,
            exit_code: None,
            spawn_error: None,
            submitted_at: self.submitted_at,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A job whose process holds a leased device
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub id: JobId,
    pub spec: JobSpec,
    pub device: Device,
    pub process: ProcessHandle,
    pub submitted_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

impl RunningJob {
    /// The process terminated with `exit_code`
    pub fn finish(self, exit_code: i32) -> FinishedJob {
        FinishedJob {
            id: self.id,
            spec: self.spec,
            device: self.device,
            exit_code,
            spawn_error: None,
            submitted_at: self.submitted_at,
            started_at: Some(self.started_at),
            finished_at: Utc::now(),
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            name: self.spec.name.clone(),
            command: self.spec.command.clone(),
            output_path: self.spec.output_path.clone(),
            status: JobState::Running,
            device: Some(self.device.clone()),
            exit_code: None,
            spawn_error: None,
            submitted_at: self.submitted_at,
            started_at: Some(self.started_at),
            finished_at: None,
        }
    }
}

/// A job that reached Succeeded or Failed. Never mutated again.
#[derive(Debug, Clone)]
pub struct FinishedJob {
    pub id: JobId,
    pub spec: JobSpec,
    /// Last device the job held, kept for reporting after release
    pub device: Device,
    pub exit_code: i32,
    pub spawn_error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl FinishedJob {
    pub fn state(&self) -> JobState {
        JobState::from_exit_code(self.exit_code)
    }

    pub fn view(&self) -> JobView {
        JobView {
            id: self.id,
            name: self.spec.name.clone(),
            command: self.spec.command.clone(),
            output_path: self.spec.output_path.clone(),
            status: self.state(),
            device: Some(self.device.clone()),
            exit_code: Some(self.exit_code),
            spawn_error: self.spawn_error.clone(),
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: Some(self.finished_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpusched_runtime::{ProcessRuntime, Runtime};

    fn pending(id: u64) -> PendingJob {
        PendingJob::new(JobId(id), JobSpec::new("job", ["true"]))
    }

    #[test]
    fn test_pending_view() {
        let view = pending(4).view();
        assert_eq!(view.id, JobId(4));
        assert_eq!(view.status, JobState::Pending);
        assert!(view.device.is_none());
        assert!(view.exit_code.is_none());
    }

    #[test]
    fn test_spawn_failed_is_terminal_with_sentinel() {
        let finished = pending(1).spawn_failed(Device::new("0"), "no such file".to_string());
        assert_eq!(finished.state(), JobState::Failed);

        let view = finished.view();
        assert_eq!(view.exit_code, Some(SENTINEL_EXIT_CODE));
        assert_eq!(view.device, Some(Device::new("0")));
        assert_eq!(view.spawn_error.as_deref(), Some("no such file"));
        assert!(view.started_at.is_none());
    }

    #[tokio::test]
    async fn test_running_to_finished() {
        let device = Device::new("1");
        let process = ProcessRuntime::default()
            .spawn(&JobSpec::new("job", ["true"]), &device)
            .await
            .unwrap();

        let running = pending(2).start(device.clone(), process);
        let view = running.view();
        assert_eq!(view.status, JobState::Running);
        assert_eq!(view.device, Some(device.clone()));
        assert!(view.exit_code.is_none());

        let succeeded = running.clone().finish(0);
        assert_eq!(succeeded.state(), JobState::Succeeded);
        assert_eq!(succeeded.view().device, Some(device));
        assert!(succeeded.view().started_at.is_some());

        let failed = running.finish(2);
        assert_eq!(failed.view().status, JobState::Failed);
        assert_eq!(failed.view().exit_code, Some(2));
    }
}
