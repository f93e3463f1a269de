//! Placement of restored model state.

use crossing_core::DevicePreference;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a model's state lives after restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Accelerator { ordinal: usize },
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator { ordinal } => write!(f, "accelerator:{ordinal}"),
        }
    }
}

/// Reports whether an accelerator can be used right now.
pub trait DeviceProbe {
    fn accelerator_available(&self) -> bool;
}

/// Looks for an NVIDIA driver and honours `CUDA_VISIBLE_DEVICES`.
pub struct SystemProbe;

impl SystemProbe {
    /// An accelerator is usable when a driver is present and
    /// `CUDA_VISIBLE_DEVICES`, if set, does not hide every device.
    fn decide(visible_devices: Option<&str>, driver_present: bool) -> bool {
        if let Some(visible) = visible_devices.map(str::trim) {
            if visible.is_empty() || visible == "-1" {
                return false;
            }
        }
        driver_present
    }

    fn driver_present() -> bool {
        Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidiactl").exists()
    }
}

impl DeviceProbe for SystemProbe {
    fn accelerator_available(&self) -> bool {
        let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
        Self::decide(visible.as_deref(), Self::driver_present())
    }
}

/// Probe with a fixed answer.
pub struct StaticProbe(pub bool);

impl DeviceProbe for StaticProbe {
    fn accelerator_available(&self) -> bool {
        self.0
    }
}

impl Device {
    /// Pick a device for `preference`, falling back to the CPU when no accelerator is present.
    pub fn resolve(preference: DevicePreference, probe: &dyn DeviceProbe) -> Device {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Auto | DevicePreference::Accelerator => {
                if probe.accelerator_available() {
                    Device::Accelerator { ordinal: 0 }
                } else {
                    if preference == DevicePreference::Accelerator {
                        tracing::warn!("Accelerator requested but none available, using CPU");
                    }
                    Device::Cpu
                }
            }
        }
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator { .. })
    }
}
