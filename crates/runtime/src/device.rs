//! Device selection.
//!
//! GPU backends are only available when the matching cargo feature
//! (`cuda` or `metal`) is enabled; `Auto` falls back to CPU.

use candle_core::Device;
use tracing::{info, warn};

use fftnet_core::{FftNetError, FftNetResult};

/// Device preference for model loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Best available device.
    #[default]
    Auto,
    /// Force CPU.
    Cpu,
    /// Force Metal (Apple Silicon).
    Metal,
    /// Force CUDA.
    Cuda,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "metal" | "mps" => Ok(Self::Metal),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(format!("unknown device: {s}")),
        }
    }
}

/// Select a device according to `preference`.
///
/// Forcing a GPU that is not compiled in or not present is a `Config` error.
pub fn select_device(preference: DevicePreference) -> FftNetResult<Device> {
    match preference {
        DevicePreference::Cpu => {
            info!("Using CPU device (forced)");
            Ok(Device::Cpu)
        }
        DevicePreference::Metal => gpu("Metal", "metal", cfg!(feature = "metal"), || {
            Device::new_metal(0)
        }),
        DevicePreference::Cuda => gpu("CUDA", "cuda", cfg!(feature = "cuda"), || {
            Device::new_cuda(0)
        }),
        DevicePreference::Auto => {
            let backends: [(&str, bool, fn(usize) -> candle_core::Result<Device>); 2] = [
                ("Metal", cfg!(feature = "metal"), Device::new_metal),
                ("CUDA", cfg!(feature = "cuda"), Device::new_cuda),
            ];
            for (name, enabled, open) in backends {
                if !enabled {
                    continue;
                }
                match open(0) {
                    Ok(device) => {
                        info!("Auto-selected {name} device");
                        return Ok(device);
                    }
                    Err(e) => warn!("{name} device not available: {e}"),
                }
            }
            info!("Using CPU device (no GPU available)");
            Ok(Device::Cpu)
        }
    }
}

fn gpu(
    name: &str,
    feature: &str,
    enabled: bool,
    open: impl FnOnce() -> candle_core::Result<Device>,
) -> FftNetResult<Device> {
    if !enabled {
        return Err(FftNetError::config(format!(
            "{name} requested but the `{feature}` feature is not enabled"
        )));
    }
    let device = open().map_err(|e| {
        FftNetError::config(format!("{name} requested but not available: {e}"))
    })?;
    info!("Using {name} device");
    Ok(device)
}

/// Short device name for logs.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "CPU",
        Device::Cuda(_) => "CUDA",
        Device::Metal(_) => "Metal",
    }
}
