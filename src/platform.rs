//! Platform and device enumeration.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Largest work-group the host device accepts.
pub const HOST_MAX_WORK_GROUP_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Accelerator,
    Other,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Cpu => "CPU",
            DeviceKind::Gpu => "GPU",
            DeviceKind::Accelerator => "Accelerator",
            DeviceKind::Other => "Other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub kind: DeviceKind,
    pub compute_units: usize,
    pub max_work_group_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub index: usize,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub devices: Vec<DeviceInfo>,
}

/// Source of the platforms visible to this process.
pub trait PlatformProvider {
    fn platforms(&self) -> Result<Vec<Platform>>;
}

impl PlatformProvider for Vec<Platform> {
    fn platforms(&self) -> Result<Vec<Platform>> {
        Ok(self.clone())
    }
}

/// The emulated platform: one CPU device backed by the compute unit pool.
#[derive(Debug, Clone)]
pub struct HostProvider {
    compute_units: usize,
}

impl HostProvider {
    pub fn new(compute_units: usize) -> Self {
        Self {
            compute_units: compute_units.max(1),
        }
    }
}

impl Default for HostProvider {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl PlatformProvider for HostProvider {
    fn platforms(&self) -> Result<Vec<Platform>> {
        Ok(vec![Platform {
            index: 0,
            name: "Host Emulation".to_string(),
            vendor: "offload-rs".to_string(),
            version: format!("OpenCL 2.0 offload-rs {}", env!("CARGO_PKG_VERSION")),
            devices: vec![DeviceInfo {
                name: "Host CPU".to_string(),
                vendor: "offload-rs".to_string(),
                kind: DeviceKind::Cpu,
                compute_units: self.compute_units,
                max_work_group_size: HOST_MAX_WORK_GROUP_SIZE,
            }],
        }])
    }
}

/// A platform and the device picked on it.
#[derive(Debug, Clone)]
pub struct DeviceSelection {
    pub platform: Platform,
    pub device: DeviceInfo,
}

/// Enumerate platforms and pick the first device of platform `index`.
pub fn select_device<P: PlatformProvider + ?Sized>(provider: &P, index: usize) -> Result<DeviceSelection> {
    let mut platforms = provider.platforms()?;
    let available = platforms.len();
    if index >= available {
        return Err(Error::PlatformNotFound { index, available });
    }

    let platform = platforms.swap_remove(index);
    let device = platform
        .devices
        .first()
        .cloned()
        .ok_or_else(|| Error::NoDevice(platform.name.clone()))?;

    debug!(platform = %platform.name, device = %device.name, "selected device");
    Ok(DeviceSelection { platform, device })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_provider_has_one_cpu_device() {
        let platforms = HostProvider::new(3).platforms().unwrap();
        assert_eq!(platforms.len(), 1);
        assert_eq!(platforms[0].devices[0].kind, DeviceKind::Cpu);
        assert_eq!(platforms[0].devices[0].compute_units, 3);
    }

    #[test]
    fn test_select_out_of_range() {
        let err = select_device(&HostProvider::default(), 2).unwrap_err();
        assert!(matches!(
            err,
            Error::PlatformNotFound {
                index: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn test_select_platform_without_devices() {
        let platforms = vec![Platform {
            index: 0,
            name: "empty".into(),
            vendor: "none".into(),
            version: "0".into(),
            devices: vec![],
        }];
        assert!(matches!(select_device(&platforms, 0), Err(Error::NoDevice(_))));
    }

    #[test]
    fn test_select_no_platforms() {
        let none: Vec<Platform> = Vec::new();
        assert!(matches!(
            select_device(&none, 0),
            Err(Error::PlatformNotFound { available: 0, .. })
        ));
    }
}
