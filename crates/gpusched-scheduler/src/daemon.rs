//! Background reap/dispatch loop

use gpusched_core::{Device, JobState, SENTINEL_EXIT_CODE};
use gpusched_runtime::Runtime;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, warn};

use crate::device_pool::DevicePool;
use crate::job::{FinishedJob, PendingJob, RunningJob};
use crate::locked::LockedQueue;

/// The four job queues. Each has its own lock; nothing is atomic across them.
#[derive(Debug, Default)]
pub struct JobQueues {
    pub pending: LockedQueue<PendingJob>,
    pub running: LockedQueue<RunningJob>,
    pub succeeded: LockedQueue<FinishedJob>,
    pub failed: LockedQueue<FinishedJob>,
}

impl JobQueues {
    pub async fn all_empty(&self) -> bool {
        self.pending.is_empty().await
            && self.running.is_empty().await
            && self.succeeded.is_empty().await
            && self.failed.is_empty().await
    }
}

/// State shared by the facade and the daemon task
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) queues: JobQueues,
    pub(crate) devices: DevicePool,
    pub(crate) wake_interval_secs: AtomicU64,
    pub(crate) pending_capacity: AtomicUsize,
    pub(crate) next_id: AtomicU64,
    /// Set by the daemon while its loop is live
    pub(crate) running: AtomicBool,
    pub(crate) quit: AtomicBool,
    /// Cuts an idle sleep short on submission or stop
    pub(crate) wakeup: Notify,
}

impl Shared {
    pub(crate) fn new(devices: Vec<Device>, wake_interval_secs: u64, pending_capacity: usize) -> Self {
        Self {
            queues: JobQueues::default(),
            devices: DevicePool::new(devices),
            wake_interval_secs: AtomicU64::new(wake_interval_secs),
            pending_capacity: AtomicUsize::new(pending_capacity),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            wakeup: Notify::new(),
        }
    }
}

/// Clears the running flag when the loop exits, including by panic
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The scheduler's background worker.
///
/// Only this task moves jobs between queues and leases devices; callers only
/// append to Pending and read snapshots.
pub(crate) struct Daemon {
    shared: Arc<Shared>,
    runtime: Arc<dyn Runtime>,
}

impl Daemon {
    pub(crate) fn new(shared: Arc<Shared>, runtime: Arc<dyn Runtime>) -> Self {
        Self { shared, runtime }
    }

    /// Run until the quit flag is set. `ready` fires once the loop is live.
    ///
    /// Panics if any queue or the device pool is non-empty on entry, or if
    /// another loop is already running on the same state.
    pub(crate) async fn run(self, ready: oneshot::Sender<()>) {
        let shared = &self.shared;
        assert!(
            !shared.running.load(Ordering::SeqCst),
            "scheduler daemon entered while another loop is running"
        );
        assert!(
            shared.queues.all_empty().await,
            "scheduler daemon entered with non-empty job queues"
        );
        assert!(
            shared.devices.is_empty().await,
            "scheduler daemon entered with a non-empty device pool"
        );

        shared.devices.seed().await;
        shared.running.store(true, Ordering::SeqCst);
        let _running = RunningFlag(&shared.running);
        info!(
            devices = ?shared.devices.configured(),
            runtime = self.runtime.name(),
            wake_interval_secs = shared.wake_interval_secs.load(Ordering::Relaxed),
            "Scheduler daemon running"
        );
        let _ = ready.send(());

        while !shared.quit.load(Ordering::SeqCst) {
            self.reap().await;

            if !self.can_dispatch().await {
                self.idle().await;
                continue;
            }

            self.dispatch_next().await;
        }

        info!("Exiting scheduler daemon");
    }

    /// Route every exited Running job to Succeeded or Failed and free its
    /// device.
    ///
    /// Exit status is polled on a snapshot so the Running lock is not held
    /// while talking to the OS; finished jobs are then removed by id.
    pub(crate) async fn reap(&self) {
        let shared = &self.shared;
        let mut finished = Vec::new();

        for job in shared.queues.running.snapshot().await {
            let exit_code = match job.process.try_exit_code() {
                Ok(Some(code)) => code,
                Ok(None) => continue,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to poll job process");
                    SENTINEL_EXIT_CODE
                }
            };
            finished.push(job.finish(exit_code));
        }

        for job in finished {
            {
                let mut running = shared.queues.running.lock().await;
                if let Some(index) = running.position(|r| r.id == job.id) {
                    running.remove(index);
                }
            }

            let device = job.device.clone();
            if job.state() == JobState::Succeeded {
                info!(
                    job_id = %job.id,
                    name = %job.spec.name,
                    exit_code = job.exit_code,
                    "Job succeeded"
                );
                shared.queues.succeeded.push_back(job).await;
            } else {
                warn!(
                    job_id = %job.id,
                    name = %job.spec.name,
                    exit_code = job.exit_code,
                    "Job exited with non-zero code"
                );
                shared.queues.failed.push_back(job).await;
            }
            shared.devices.release(device).await;
        }
    }

    async fn can_dispatch(&self) -> bool {
        let shared = &self.shared;
        shared.devices.available_count().await > 0 && !shared.queues.pending.is_empty().await
    }

    /// Sleep for the wake interval, or less if woken
    async fn idle(&self) {
        let secs = self.shared.wake_interval_secs.load(Ordering::Relaxed);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = self.shared.wakeup.notified() => {
                debug!("Scheduler daemon woken early");
            }
        }
    }

    /// Lease a device, pop the oldest pending job and start it.
    ///
    /// Panics if called without a free device or a pending job.
    pub(crate) async fn dispatch_next(&self) {
        let shared = &self.shared;
        let Some(device) = shared.devices.lease().await else {
            error!("Dispatch attempted without a free device");
            panic!("scheduler dispatch without a free device");
        };
        let Some(job) = shared.queues.pending.pop_front().await else {
            error!("Dispatch attempted without a pending job");
            panic!("scheduler dispatch without a pending job");
        };

        info!(
            job_id = %job.id,
            name = %job.spec.name,
            device = %device,
            "Scheduling job"
        );

        match self.runtime.spawn(&job.spec, &device).await {
            Ok(process) => {
                debug!(job_id = %job.id, pid = ?process.pid(), "Job running");
                shared.queues.running.push_back(job.start(device, process)).await;
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    name = %job.spec.name,
                    device = %device,
                    error = %e,
                    "Scheduling failed"
                );
                shared
                    .queues
                    .failed
                    .push_back(job.spawn_failed(device.clone(), e.to_string()))
                    .await;
                shared.devices.release(device).await;
            }
        }
    }
}
