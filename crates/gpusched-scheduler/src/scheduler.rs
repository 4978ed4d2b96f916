//! Public scheduler operations

use gpusched_core::{
    Device, GpuschedError, GpuschedResult, JobId, JobSpec, JobView, SchedulerConfig,
    DEFAULT_PENDING_CAPACITY, DEFAULT_WAKE_INTERVAL_SECS,
};
use gpusched_runtime::{ProcessRuntime, ProcessRuntimeConfig, Runtime};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::daemon::{Daemon, Shared};
use crate::job::{FinishedJob, PendingJob, RunningJob};

/// Queue lengths and settings at one instant
#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub daemon_running: bool,
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub devices_total: usize,
    pub devices_free: usize,
    pub wake_interval_secs: u64,
    pub pending_capacity: usize,
}

#[derive(Default)]
struct DaemonHandle {
    task: Option<JoinHandle<()>>,
    started: bool,
}

/// Scheduler facade: submission, daemon lifecycle and queue queries.
///
/// Each queue is locked independently and the queries here compose several
/// of them without a cross-queue lock, so a job that is moving between
/// queues can briefly show up in none of them.
pub struct Scheduler {
    shared: Arc<Shared>,
    runtime: Arc<dyn Runtime>,
    daemon: Mutex<DaemonHandle>,
}

impl Scheduler {
    /// Create a scheduler that runs jobs as OS processes
    pub fn new(config: SchedulerConfig) -> GpuschedResult<Self> {
        let runtime = ProcessRuntime::new(ProcessRuntimeConfig {
            device_env_var: config.device_env_var.clone(),
        });
        Self::with_runtime(config, Arc::new(runtime))
    }

    /// Create a scheduler on a specific runtime
    pub fn with_runtime(config: SchedulerConfig, runtime: Arc<dyn Runtime>) -> GpuschedResult<Self> {
        config.validate()?;

        info!(devices = ?config.devices, "Scheduler core initializing");
        let scheduler = Self {
            shared: Arc::new(Shared::new(
                config.devices,
                DEFAULT_WAKE_INTERVAL_SECS,
                DEFAULT_PENDING_CAPACITY,
            )),
            runtime,
            daemon: Mutex::new(DaemonHandle::default()),
        };

        // Bad values are logged and the defaults kept
        let _ = scheduler
            .set_wake_interval_secs(i64::try_from(config.wake_interval_secs).unwrap_or(i64::MAX));
        let _ = scheduler
            .set_pending_capacity(i64::try_from(config.pending_capacity).unwrap_or(i64::MAX));

        info!("Scheduler core initialized");
        Ok(scheduler)
    }

    /// Queue a job. Fails without consuming an id when the daemon is not
    /// running or the pending queue is full.
    pub async fn submit(&self, spec: JobSpec) -> GpuschedResult<JobId> {
        if !self.is_running() {
            warn!(name = %spec.name, "Submission attempted while daemon not running");
            return Err(GpuschedError::DaemonNotRunning);
        }

        let capacity = self.pending_capacity();
        let name = spec.name.clone();
        let id = {
            let mut pending = self.shared.queues.pending.lock().await;
            if pending.len() >= capacity {
                error!(name = %name, capacity, "Adding new job failed: queue full");
                return Err(GpuschedError::QueueFull { capacity });
            }
            let id = JobId(self.shared.next_id.fetch_add(1, Ordering::SeqCst));
            pending.push_back(PendingJob::new(id, spec));
            id
        };

        self.shared.wakeup.notify_one();
        info!(job_id = %id, name = %name, "Job submitted");
        Ok(id)
    }

    /// Start the daemon and wait until its loop is live.
    ///
    /// A scheduler runs its daemon at most once: after [`Scheduler::stop`]
    /// the queues still hold the previous run's jobs.
    pub async fn start(&self) -> GpuschedResult<()> {
        let mut daemon = self.daemon.lock().await;
        if self.is_running() {
            error!("Daemon already running");
            return Err(GpuschedError::DaemonAlreadyRunning);
        }
        if daemon.started {
            error!("Daemon was already started once; create a new scheduler instead");
            return Err(GpuschedError::Scheduler(
                "scheduler cannot be restarted after stop".to_string(),
            ));
        }

        info!("Starting up scheduler daemon");
        daemon.started = true;
        self.shared.quit.store(false, Ordering::SeqCst);

        let (ready_tx, ready_rx) = oneshot::channel();
        let worker = Daemon::new(self.shared.clone(), self.runtime.clone());
        daemon.task = Some(tokio::spawn(worker.run(ready_tx)));

        ready_rx.await.map_err(|_| {
            GpuschedError::Internal("scheduler daemon exited before it was ready".to_string())
        })?;
        info!("Daemon started");
        Ok(())
    }

    /// Stop the daemon and wait for its loop to exit.
    ///
    /// Returns at once when the daemon was never started, so calling it
    /// twice is fine. Jobs still running keep their processes: they are
    /// neither killed nor awaited, and stay in the running queue.
    pub async fn stop(&self) {
        let task = self.daemon.lock().await.task.take();
        let Some(task) = task else {
            debug!("Stop requested but no daemon is running");
            return;
        };

        info!("Stop received");
        self.shared.quit.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_one();

        if let Err(e) = task.await {
            self.shared.running.store(false, Ordering::SeqCst);
            error!(error = %e, "Scheduler daemon terminated abnormally");
        }

        let detached = self.shared.queues.running.len().await;
        if detached > 0 {
            warn!(
                jobs = detached,
                "Daemon stopped with running jobs; their processes continue untracked"
            );
        }
        info!("Daemon exited");
    }

    /// Whether the daemon loop is live
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a device, oldest first
    pub async fn pending_jobs(&self) -> Vec<JobView> {
        let pending = self.shared.queues.pending.lock().await;
        pending.iter().map(PendingJob::view).collect()
    }

    /// Jobs whose processes are running
    pub async fn running_jobs(&self) -> Vec<JobView> {
        let running = self.shared.queues.running.lock().await;
        running.iter().map(RunningJob::view).collect()
    }

    /// Jobs that exited with code 0, in completion order
    pub async fn succeeded_jobs(&self) -> Vec<JobView> {
        let succeeded = self.shared.queues.succeeded.lock().await;
        succeeded.iter().map(FinishedJob::view).collect()
    }

    /// Jobs that exited non-zero or never started, in completion order
    pub async fn failed_jobs(&self) -> Vec<JobView> {
        let failed = self.shared.queues.failed.lock().await;
        failed.iter().map(FinishedJob::view).collect()
    }

    /// Look a job up by id.
    ///
    /// Scans Pending, Failed, Succeeded, then Running. A job the daemon is
    /// moving during the scan may be missed.
    pub async fn find_job(&self, id: JobId) -> Option<JobView> {
        let queues = &self.shared.queues;

        if let Some(job) = queues.pending.lock().await.iter().find(|j| j.id == id) {
            return Some(job.view());
        }
        if let Some(job) = queues.failed.lock().await.iter().find(|j| j.id == id) {
            return Some(job.view());
        }
        if let Some(job) = queues.succeeded.lock().await.iter().find(|j| j.id == id) {
            return Some(job.view());
        }
        queues
            .running
            .lock()
            .await
            .iter()
            .find(|j| j.id == id)
            .map(RunningJob::view)
    }

    /// The configured device slots, regardless of availability
    pub fn devices(&self) -> Vec<Device> {
        self.shared.devices.configured().to_vec()
    }

    /// Device slots not leased to a running job
    pub async fn free_devices(&self) -> Vec<Device> {
        self.shared.devices.available().await
    }

    pub fn wake_interval_secs(&self) -> u64 {
        self.shared.wake_interval_secs.load(Ordering::Relaxed)
    }

    /// Change the idle sleep. Non-positive values are rejected and logged;
    /// the previous value stays.
    pub fn set_wake_interval_secs(&self, secs: i64) -> GpuschedResult<()> {
        let secs = positive("wake_interval_secs", secs)?;
        self.shared.wake_interval_secs.store(secs, Ordering::Relaxed);
        info!(wake_interval_secs = secs, "Wake interval updated");
        Ok(())
    }

    pub fn pending_capacity(&self) -> usize {
        self.shared.pending_capacity.load(Ordering::Relaxed)
    }

    /// Change the pending queue ceiling. Same validation as the wake
    /// interval. Jobs already queued beyond a lowered ceiling stay queued.
    pub fn set_pending_capacity(&self, capacity: i64) -> GpuschedResult<()> {
        let capacity = positive("pending_capacity", capacity)?;
        let capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        self.shared.pending_capacity.store(capacity, Ordering::Relaxed);
        info!(pending_capacity = capacity, "Pending capacity updated");
        Ok(())
    }

    /// Queue lengths and settings
    pub async fn summary(&self) -> QueueSummary {
        let queues = &self.shared.queues;
        QueueSummary {
            daemon_running: self.is_running(),
            pending: queues.pending.len().await,
            running: queues.running.len().await,
            succeeded: queues.succeeded.len().await,
            failed: queues.failed.len().await,
            devices_total: self.shared.devices.total_count(),
            devices_free: self.shared.devices.available_count().await,
            wake_interval_secs: self.wake_interval_secs(),
            pending_capacity: self.pending_capacity(),
        }
    }
}

fn positive(setting: &str, value: i64) -> GpuschedResult<u64> {
    if value <= 0 {
        error!(
            setting,
            value, "Setting not updated: value must be a positive integer"
        );
        return Err(GpuschedError::Config(format!(
            "{} must be a positive integer, got {}",
            setting, value
        )));
    }
    Ok(value as u64)
}
