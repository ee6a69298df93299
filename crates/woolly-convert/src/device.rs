//! Execution device
//!
//! A device owns the worker pool that groups are scheduled on. Capability
//! checks happen once, when the device is built; launches never re-check.

use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use crate::config::DeviceConfig;
use crate::error::{Error, Result};

/// Narrowest warp every kernel's lane mapping assumes
pub const MIN_WARP_SIZE: usize = 32;

/// Largest group any kernel launches
pub const MIN_GROUP_THREADS: usize = 256;

static GLOBAL: OnceLock<std::result::Result<Device, String>> = OnceLock::new();

/// Capabilities reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub warp_size: usize,
    pub max_threads_per_group: usize,
    pub workers: usize,
}

struct DeviceInner {
    config: DeviceConfig,
    capabilities: Capabilities,
    pool: ThreadPool,
}

/// Handle to an execution device; cheap to clone
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("capabilities", &self.inner.capabilities)
            .finish()
    }
}

impl Device {
    /// Build a device, failing if it cannot run every kernel
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let capabilities = Capabilities {
            warp_size: config.warp_size,
            max_threads_per_group: config.max_threads_per_group,
            workers: config.worker_threads,
        };
        if capabilities.warp_size < MIN_WARP_SIZE {
            return Err(Error::UnsupportedDevice(format!(
                "warp size {} is below the required {}",
                capabilities.warp_size, MIN_WARP_SIZE
            )));
        }
        if capabilities.max_threads_per_group < MIN_GROUP_THREADS {
            return Err(Error::UnsupportedDevice(format!(
                "groups of {} threads are below the required {}",
                capabilities.max_threads_per_group, MIN_GROUP_THREADS
            )));
        }

        let prefix = config.thread_name_prefix.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()
            .map_err(|e| Error::UnsupportedDevice(format!("Failed to create thread pool: {}", e)))?;

        info!(
            workers = capabilities.workers,
            warp_size = capabilities.warp_size,
            "Conversion device ready"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner { config, capabilities, pool }),
        })
    }

    /// Process-wide device built from the default configuration.
    ///
    /// The first call builds it; a failure is logged once and returned to
    /// every caller.
    pub fn global() -> Result<&'static Device> {
        let slot = GLOBAL.get_or_init(|| {
            Device::new(DeviceConfig::default()).map_err(|e| {
                error!("Conversion device unavailable: {}", e);
                e.to_string()
            })
        });
        slot.as_ref().map_err(|msg| Error::UnsupportedDevice(msg.clone()))
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Run `op` with this device's pool as the current rayon pool
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.inner.pool.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_narrow_warp() {
        let config = DeviceConfig { warp_size: 16, ..Default::default() };
        assert!(matches!(Device::new(config), Err(Error::UnsupportedDevice(_))));
    }

    #[test]
    fn test_rejects_small_groups() {
        let config = DeviceConfig { max_threads_per_group: 128, ..Default::default() };
        assert!(matches!(Device::new(config), Err(Error::UnsupportedDevice(_))));
    }

    #[test]
    fn test_install_uses_device_pool() {
        let config = DeviceConfig { worker_threads: 2, ..Default::default() };
        let device = Device::new(config).unwrap();
        assert_eq!(device.install(rayon::current_num_threads), 2);
        assert_eq!(device.capabilities().workers, 2);
    }

    #[test]
    fn test_global_is_shared() {
        let a = Device::global().unwrap();
        let b = Device::global().unwrap();
        assert!(std::ptr::eq(a, b));
    }
}
