//! # Execution Provider Selection
//!
//! Maps the recognizer's configured `provider` string onto a candle compute
//! device, falling back to the CPU when the requested accelerator is missing.

use candle_core::Device;
use std::fmt;
use tracing::{debug, info, warn};

/// Where the recognition engine runs its tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    /// Pick the best accelerator that is available, else CPU
    Auto,
    /// Always run on the CPU
    Cpu,
    /// NVIDIA GPU 0 (falls back to CPU if unavailable)
    Cuda,
    /// Apple GPU 0 (falls back to CPU if unavailable)
    Metal,
}

impl std::str::FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ExecutionProvider::Auto),
            "cpu" => Ok(ExecutionProvider::Cpu),
            "cuda" | "gpu" => Ok(ExecutionProvider::Cuda),
            "metal" => Ok(ExecutionProvider::Metal),
            _ => Err(format!("Unknown execution provider: {}", s)),
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionProvider::Auto => "auto",
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
            ExecutionProvider::Metal => "metal",
        };
        write!(f, "{}", name)
    }
}

/// Resolve a provider to a concrete device.
pub fn select_device(provider: ExecutionProvider) -> Device {
    match provider {
        ExecutionProvider::Cpu => Device::Cpu,
        ExecutionProvider::Cuda => cuda_device().unwrap_or_else(|| {
            warn!("CUDA requested but not available, using CPU");
            Device::Cpu
        }),
        ExecutionProvider::Metal => metal_device().unwrap_or_else(|| {
            warn!("Metal requested but not available, using CPU");
            Device::Cpu
        }),
        ExecutionProvider::Auto => {
            if let Some(device) = cuda_device() {
                info!("Selected CUDA GPU for recognition");
                device
            } else if let Some(device) = metal_device() {
                info!("Selected Metal GPU for recognition");
                device
            } else {
                info!("Using CPU for recognition (no GPU acceleration available)");
                Device::Cpu
            }
        }
    }
}

/// Short label for logs and the health endpoint.
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

/// Cap the CPU worker pool used by candle's matmul kernels.
///
/// Must run before the first tensor operation. An explicit `RAYON_NUM_THREADS`
/// in the environment wins over the configured value.
pub fn configure_cpu_threads(num_threads: usize) {
    if std::env::var_os("RAYON_NUM_THREADS").is_some() {
        debug!("RAYON_NUM_THREADS already set, ignoring configured num_threads");
        return;
    }
    std::env::set_var("RAYON_NUM_THREADS", num_threads.to_string());
    debug!("Recognition CPU threads set to {}", num_threads);
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("CUDA not available: {}", e);
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!("Metal not available: {}", e);
            None
        }
    }
}
