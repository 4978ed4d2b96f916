//! Device pool for leasing device slots to running jobs

use gpusched_core::Device;
use tracing::debug;

use crate::locked::LockedQueue;

/// Free device slots, leased one at a time to running jobs.
///
/// The pool starts empty and is filled once from the configured multiset by
/// [`DevicePool::seed`] when the daemon starts. After that the only
/// mutations are lease/release pairs, so free slots plus leased slots always
/// equal the configured multiset.
#[derive(Debug)]
pub struct DevicePool {
    /// Configured device slots, in configuration order
    configured: Vec<Device>,
    /// Slots currently free
    available: LockedQueue<Device>,
}

impl DevicePool {
    /// Create an unseeded pool for the given slots
    pub fn new(configured: Vec<Device>) -> Self {
        Self {
            configured,
            available: LockedQueue::new(),
        }
    }

    /// Load every configured slot into the free list
    pub async fn seed(&self) {
        let mut available = self.available.lock().await;
        for device in &self.configured {
            available.push_back(device.clone());
        }
        debug!(devices = ?self.configured, "Device pool seeded");
    }

    /// Take the oldest free slot
    pub async fn lease(&self) -> Option<Device> {
        let device = self.available.pop_front().await;
        if let Some(device) = &device {
            debug!(device = %device, "Leased device");
        }
        device
    }

    /// Return a slot taken by [`DevicePool::lease`]
    pub async fn release(&self, device: Device) {
        debug!(device = %device, "Released device");
        self.available.push_back(device).await;
    }

    /// The configured slots, independent of current availability
    pub fn configured(&self) -> &[Device] {
        &self.configured
    }

    /// Total number of configured slots
    pub fn total_count(&self) -> usize {
        self.configured.len()
    }

    /// Currently free slots
    pub async fn available(&self) -> Vec<Device> {
        self.available.snapshot().await
    }

    /// Number of currently free slots
    pub async fn available_count(&self) -> usize {
        self.available.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.available.is_empty().await
    }
}
