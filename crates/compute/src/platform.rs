//! Platform and device discovery.

use crate::{ComputeBackend, ComputeError, CpuBackend};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Which kind of backend [`platforms`] should enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// GPU platforms first, then the host CPU.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl FromStr for BackendSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" | "host" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            other => Err(format!("unknown backend `{other}` (expected auto, cpu or gpu)")),
        }
    }
}

impl fmt::Display for BackendSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

enum DeviceKind {
    Host,
    #[cfg(feature = "gpu")]
    Wgpu {
        instance: Arc<wgpu::Instance>,
        adapter: wgpu::Adapter,
    },
}

/// A compute device that has not been opened yet.
pub struct Device {
    name: String,
    kind: DeviceKind,
}

impl Device {
    #[must_use]
    pub fn host() -> Self {
        Self {
            name: crate::cpu_backend::host_device_name(),
            kind: DeviceKind::Host,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creates the device context and its command queue.
    ///
    /// # Errors
    ///
    /// [`ComputeError::QueueCreation`] when the device refuses a queue.
    pub fn open(self) -> Result<Arc<dyn ComputeBackend>, ComputeError> {
        match self.kind {
            DeviceKind::Host => Ok(Arc::new(CpuBackend::new())),
            #[cfg(feature = "gpu")]
            DeviceKind::Wgpu { instance, adapter } => Ok(Arc::new(
                crate::WgpuBackend::from_adapter(instance, adapter)?,
            )),
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DeviceKind::Host => "host",
            #[cfg(feature = "gpu")]
            DeviceKind::Wgpu { .. } => "wgpu",
        };
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// A group of devices driven by the same implementation.
#[derive(Debug)]
pub struct Platform {
    pub name: String,
    pub devices: Vec<Device>,
}

impl Platform {
    fn host() -> Self {
        Self {
            name: "host".into(),
            devices: vec![Device::host()],
        }
    }
}

/// Lists the available platforms in preference order.
///
/// Without the `gpu` feature only the host platform exists, so
/// [`BackendSelection::Gpu`] yields an empty list.
#[must_use]
pub fn platforms(selection: BackendSelection) -> Vec<Platform> {
    let mut found = Vec::new();
    if selection != BackendSelection::Cpu {
        found.extend(gpu_platforms());
    }
    if selection != BackendSelection::Gpu {
        found.push(Platform::host());
    }
    tracing::debug!(
        %selection,
        platforms = ?found.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        "enumerated compute platforms"
    );
    found
}

#[cfg(feature = "gpu")]
fn gpu_platforms() -> Vec<Platform> {
    let instance = Arc::new(wgpu::Instance::default());
    let mut grouped: Vec<Platform> = Vec::new();
    for adapter in instance.enumerate_adapters(wgpu::Backends::all()) {
        let info = adapter.get_info();
        let platform_name = format!("wgpu/{:?}", info.backend);
        let device = Device {
            name: info.name.clone(),
            kind: DeviceKind::Wgpu {
                instance: Arc::clone(&instance),
                adapter,
            },
        };
        match grouped.iter_mut().find(|p| p.name == platform_name) {
            Some(platform) => platform.devices.push(device),
            None => grouped.push(Platform {
                name: platform_name,
                devices: vec![device],
            }),
        }
    }
    grouped
}

#[cfg(not(feature = "gpu"))]
fn gpu_platforms() -> Vec<Platform> {
    Vec::new()
}
