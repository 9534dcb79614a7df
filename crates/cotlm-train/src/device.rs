//! Compute device for fine-tuning and local inference.
//!
//! Runs default to the CPU.  A GPU request tries each accelerator backend
//! compiled into this build, in order, and settles on the CPU when none of
//! them opens.

use candle_core::{Device, DeviceLocation};
use tracing::{info, warn};

/// What a run asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    Cpu,
    /// Any compiled accelerator; `ordinal` picks the card where there are
    /// several.
    Gpu { ordinal: usize },
}

impl DeviceRequest {
    pub fn new(prefer_gpu: bool, ordinal: usize) -> Self {
        if prefer_gpu {
            Self::Gpu { ordinal }
        } else {
            Self::Cpu
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
    Cuda,
    Metal,
}

impl Accelerator {
    /// Backends this binary was built with, in the order they are tried.
    pub fn compiled() -> Vec<Accelerator> {
        let mut backends = Vec::new();
        if cfg!(feature = "cuda") {
            backends.push(Accelerator::Cuda);
        }
        if cfg!(feature = "metal") {
            backends.push(Accelerator::Metal);
        }
        backends
    }

    fn open(self, ordinal: usize) -> candle_core::Result<Device> {
        match self {
            Accelerator::Cuda => Device::new_cuda(ordinal),
            Accelerator::Metal => Device::new_metal(ordinal),
        }
    }
}

/// Open the device for `request`.  Never fails: an unusable GPU is logged
/// and the CPU is returned instead.
pub fn select_device(request: DeviceRequest) -> Device {
    let ordinal = match request {
        DeviceRequest::Cpu => return Device::Cpu,
        DeviceRequest::Gpu { ordinal } => ordinal,
    };

    let backends = Accelerator::compiled();
    if backends.is_empty() {
        warn!("GPU requested, but cotlm was built without the `cuda` or `metal` feature; using CPU");
        return Device::Cpu;
    }

    for backend in backends {
        match backend.open(ordinal) {
            Ok(device) => {
                info!(device = %describe(&device), "GPU selected");
                return device;
            }
            Err(e) => warn!(?backend, ordinal, error = %e, "Accelerator unavailable"),
        }
    }

    warn!("No accelerator could be opened, continuing on CPU");
    Device::Cpu
}

/// `CPU`, `CUDA:<n>` or `Metal:<n>`.
pub fn describe(device: &Device) -> String {
    match device.location() {
        DeviceLocation::Cpu => "CPU".to_string(),
        DeviceLocation::Cuda { gpu_id } => format!("CUDA:{gpu_id}"),
        DeviceLocation::Metal { gpu_id } => format!("Metal:{gpu_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_follows_preference() {
        assert_eq!(DeviceRequest::new(false, 3), DeviceRequest::Cpu);
        assert_eq!(DeviceRequest::new(true, 3), DeviceRequest::Gpu { ordinal: 3 });
    }

    #[test]
    fn cpu_request_opens_cpu() {
        let device = select_device(DeviceRequest::Cpu);
        assert!(device.is_cpu());
        assert_eq!(describe(&device), "CPU");
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn gpu_request_without_backends_uses_cpu() {
        assert!(Accelerator::compiled().is_empty());
        assert!(select_device(DeviceRequest::Gpu { ordinal: 0 }).is_cpu());
    }
}
