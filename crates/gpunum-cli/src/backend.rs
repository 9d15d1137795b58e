//! Compute backend detection and selection.

use anyhow::Result;
use gpunum_compute::{ComputeContext, HostDevice, HostDeviceConfig};
use gpunum_solver::kernels;

/// Backends the CLI can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Host reference device (always available).
    Host,
    /// wgpu compute pipelines.
    Wgpu,
    /// OpenCL command queue.
    OpenCl,
}

impl BackendKind {
    /// Parse from a string. `None` for `auto` or unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "host" | "cpu" => Some(Self::Host),
            "wgpu" | "webgpu" | "metal" => Some(Self::Wgpu),
            "opencl" | "cl" => Some(Self::OpenCl),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Wgpu => "wgpu",
            Self::OpenCl => "opencl",
        }
    }

    /// Whether this backend was compiled in and has a device.
    pub fn is_available(self) -> bool {
        match self {
            Self::Host => true,
            Self::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    gpunum_backend_wgpu::WgpuContext::is_available()
                }
                #[cfg(not(feature = "wgpu"))]
                {
                    false
                }
            }
            Self::OpenCl => {
                #[cfg(feature = "opencl")]
                {
                    gpunum_backend_opencl::OpenClContext::is_available()
                }
                #[cfg(not(feature = "opencl"))]
                {
                    false
                }
            }
        }
    }
}

/// An opened compute context.
pub enum Backend {
    Host(HostDevice),
    #[cfg(feature = "wgpu")]
    Wgpu(gpunum_backend_wgpu::WgpuContext),
    #[cfg(feature = "opencl")]
    OpenCl(gpunum_backend_opencl::OpenClContext),
}

impl Backend {
    pub fn context(&self) -> &dyn ComputeContext {
        match self {
            Backend::Host(device) => device,
            #[cfg(feature = "wgpu")]
            Backend::Wgpu(ctx) => ctx,
            #[cfg(feature = "opencl")]
            Backend::OpenCl(ctx) => ctx,
        }
    }
}

fn host(max_work_group_size: usize) -> Backend {
    Backend::Host(kernels::reference_device(
        HostDeviceConfig::default().with_max_work_group_size(max_work_group_size),
    ))
}

fn open(kind: BackendKind, max_work_group_size: usize) -> Result<Backend> {
    match kind {
        BackendKind::Host => Ok(host(max_work_group_size)),
        BackendKind::Wgpu => {
            #[cfg(feature = "wgpu")]
            {
                Ok(Backend::Wgpu(gpunum_backend_wgpu::WgpuContext::new()?))
            }
            #[cfg(not(feature = "wgpu"))]
            {
                anyhow::bail!("wgpu support not compiled in")
            }
        }
        BackendKind::OpenCl => {
            #[cfg(feature = "opencl")]
            {
                Ok(Backend::OpenCl(gpunum_backend_opencl::OpenClContext::new()?))
            }
            #[cfg(not(feature = "opencl"))]
            {
                anyhow::bail!("OpenCL support not compiled in")
            }
        }
    }
}

/// Open the backend named on the command line.
///
/// An explicit backend that cannot be opened falls back to the host device
/// with a warning. `auto` tries OpenCL, then wgpu, then the host device.
pub fn detect_backend(name: &str, max_work_group_size: usize) -> Backend {
    match BackendKind::from_name(name) {
        Some(kind) => open(kind, max_work_group_size).unwrap_or_else(|e| {
            eprintln!(
                "Warning: {} backend unavailable ({}), falling back to host",
                kind.name(),
                e
            );
            host(max_work_group_size)
        }),
        None => {
            if name.to_lowercase() != "auto" {
                eprintln!("Warning: unknown backend '{}', using auto-detection", name);
            }
            [BackendKind::OpenCl, BackendKind::Wgpu]
                .into_iter()
                .filter(|kind| kind.is_available())
                .find_map(|kind| open(kind, max_work_group_size).ok())
                .unwrap_or_else(|| host(max_work_group_size))
        }
    }
}
