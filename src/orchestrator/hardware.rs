//! Hardware compatibility probe.
//!
//! Runs once before the install wizard. An unsupported machine stops the
//! install; a supported one gets a suggested compute device.

use std::path::PathBuf;
use tracing::debug;

use crate::error::{InstallError, Result};
use crate::record::Device;
use crate::shell::{parse_system_path, resolve_tool_path, Platform};

/// What the probe found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareReport {
    /// Best guess at the compute device, offered as the wizard default.
    pub suggested_device: Option<Device>,
}

pub trait HardwareProbe: Send + Sync {
    /// Check the machine, failing with [`InstallError::HardwareUnsupported`].
    fn check(&self) -> Result<HardwareReport>;
}

/// Probe for the machine this process runs on.
#[derive(Debug, Clone)]
pub struct SystemHardware {
    platform: Platform,
    arch: String,
    path_entries: Vec<PathBuf>,
}

impl SystemHardware {
    /// Probe the current machine.
    pub fn detect(platform: Platform) -> Self {
        Self::new(platform, std::env::consts::ARCH, parse_system_path())
    }

    pub fn new(platform: Platform, arch: &str, path_entries: Vec<PathBuf>) -> Self {
        Self {
            platform,
            arch: arch.to_string(),
            path_entries,
        }
    }

    fn has_tool(&self, tool: &str) -> bool {
        resolve_tool_path(tool, &self.path_entries, self.platform).is_some()
    }
}

impl HardwareProbe for SystemHardware {
    fn check(&self) -> Result<HardwareReport> {
        debug!("Checking hardware: {:?} {}", self.platform, self.arch);

        let device = match self.platform {
            Platform::MacOs if self.arch == "aarch64" => Device::Mps,
            Platform::MacOs => {
                return Err(InstallError::HardwareUnsupported {
                    message: "Intel-based Macs are not supported; Apple Silicon is required"
                        .to_string(),
                })
            }
            _ if self.has_tool("nvidia-smi") => Device::Cuda,
            Platform::Linux if self.has_tool("rocminfo") => Device::Rocm,
            _ => Device::Cpu,
        };

        debug!("Suggested device: {}", device);
        Ok(HardwareReport {
            suggested_device: Some(device),
        })
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone)]
pub enum StaticHardware {
    Supported(Option<Device>),
    Unsupported(String),
}

impl HardwareProbe for StaticHardware {
    fn check(&self) -> Result<HardwareReport> {
        match self {
            Self::Supported(device) => Ok(HardwareReport {
                suggested_device: *device,
            }),
            Self::Unsupported(message) => Err(InstallError::HardwareUnsupported {
                message: message.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intel_mac_is_unsupported() {
        let probe = SystemHardware::new(Platform::MacOs, "x86_64", vec![]);
        assert!(matches!(
            probe.check(),
            Err(InstallError::HardwareUnsupported { .. })
        ));
    }

    #[test]
    fn apple_silicon_suggests_mps() {
        let probe = SystemHardware::new(Platform::MacOs, "aarch64", vec![]);
        assert_eq!(probe.check().unwrap().suggested_device, Some(Device::Mps));
    }

    #[test]
    fn no_gpu_tools_suggests_cpu() {
        let probe = SystemHardware::new(Platform::Linux, "x86_64", vec![]);
        assert_eq!(probe.check().unwrap().suggested_device, Some(Device::Cpu));
    }

    #[cfg(unix)]
    #[test]
    fn nvidia_smi_suggests_cuda() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let tool = temp.path().join("nvidia-smi");
        fs::write(&tool, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let probe = SystemHardware::new(Platform::Linux, "x86_64", vec![temp.path().into()]);
        assert_eq!(probe.check().unwrap().suggested_device, Some(Device::Cuda));
    }

    #[test]
    fn static_probe() {
        assert!(StaticHardware::Supported(None).check().is_ok());
        assert!(StaticHardware::Unsupported("no".into()).check().is_err());
    }
}
