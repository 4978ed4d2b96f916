//! Device identifiers

use serde::{Deserialize, Serialize};

/// Environment variable a child process receives with its leased device id
pub const DEFAULT_DEVICE_ENV_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// A schedulable slot on one physical device.
///
/// The identifier is handed to the child verbatim through the device
/// environment variable, so `"0"`, `"1,2"` and `""` are all valid. An empty
/// identifier is a CPU-only slot. Configuring the same identifier several
/// times gives that device several concurrent slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Device(String);

impl Device {
    /// Create a device from its identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A CPU-only slot
    pub fn cpu() -> Self {
        Self(String::new())
    }

    /// The raw identifier, as exported to the child
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this slot runs without any accelerator
    pub fn is_cpu(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_cpu() {
            write!(f, "cpu")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Device {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Device {
    fn from(id: String) -> Self {
        Self(id)
    }
}
