//! gpusched-scheduler: device-leasing job scheduler
//!
//! This crate provides the scheduler core:
//! - A mutex-protected FIFO container shared between tasks
//! - The device pool leased to running jobs
//! - Pending/Running/Succeeded/Failed job queues
//! - The background daemon that reaps finished jobs and dispatches new ones
//! - The `Scheduler` facade used by the API layer

mod daemon;
pub mod device_pool;
pub mod job;
pub mod locked;
pub mod scheduler;

pub use daemon::JobQueues;
pub use device_pool::DevicePool;
pub use job::{FinishedJob, PendingJob, RunningJob};
pub use locked::{LockedQueue, LockedQueueGuard};
pub use scheduler::{QueueSummary, Scheduler};
