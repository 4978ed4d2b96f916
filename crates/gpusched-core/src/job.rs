//! Job identifiers, specifications, states and views

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::Device;

/// Exit code recorded for a job whose process never ran, or whose exit
/// status could not be read.
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// Unique, monotonically assigned job identifier. The first job gets 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a caller submits: a label, a command line and where to put its output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Caller-supplied label, not unique
    pub name: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// File receiving combined stdout and stderr; `None` discards both
    #[serde(default)]
    pub output_path: Option<PathBuf>,
}

impl JobSpec {
    /// Create a job spec without output capture
    pub fn new<I, S>(name: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            output_path: None,
        }
    }

    /// Capture combined output into `path`
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// The command joined with spaces, for display
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

/// Lifecycle state of a job
///
/// `Pending -> Running -> {Succeeded, Failed}`, plus `Pending -> Failed` when
/// the process could not be spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "Scheduled")]
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    /// Status label reported to clients
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Pending => "Scheduled",
            JobState::Running => "Running",
            JobState::Succeeded => "Succeeded",
            JobState::Failed => "Failed",
        }
    }

    /// Whether the job will never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Terminal state for a process that exited with `exit_code`
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            JobState::Succeeded
        } else {
            JobState::Failed
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Point-in-time, read-only copy of a job as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub name: String,
    pub command: Vec<String>,
    pub output_path: Option<PathBuf>,
    pub status: JobState,
    /// Set once the job has been dispatched
    pub device: Option<Device>,
    /// Set once the job is Succeeded or Failed
    pub exit_code: Option<i32>,
    /// Set when the job failed before its process could start
    pub spawn_error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobView {
    /// The command joined with spaces, for display
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
