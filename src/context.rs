//! Process-wide context.
//!
//! [`AppContext`] is built once by the host at startup and passed by
//! reference to the orchestrator and everything it creates. It replaces any
//! notion of global settings: directories, platform and toolchain choices
//! all live here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::document::{read_yaml, FileRead};
use crate::error::{InstallError, Result};
use crate::model_paths::ModelPathConfig;
use crate::record::{Device, RecordStore};
use crate::shell::Platform;

/// Modules that must import for an environment to count as complete.
pub const DEFAULT_REQUIRED_IMPORTS: &[&str] =
    &["yaml", "torch", "uv", "toml", "numpy", "PIL", "sqlalchemy"];

/// Python and package-manager settings.
///
/// Defaults are compiled in; `<resources>/toolchain.yml` may override any
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ToolchainConfig {
    /// Python version passed to `uv venv --python`.
    pub python_version: String,

    /// Modules checked by import verification.
    pub required_imports: Vec<String>,

    /// Requirements manifest, relative to the resources directory.
    pub requirements_file: String,

    /// PyTorch packages installed before the manifest.
    pub torch_packages: Vec<String>,

    /// Package index per device.
    pub torch_index: TorchIndex,

    /// Bootstrap `uv` used before the environment has its own copy.
    pub uv_path: Option<PathBuf>,
}

/// PyTorch wheel index per compute device. `mps` and unset use the default index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorchIndex {
    pub cuda: String,
    pub rocm: String,
    pub cpu: String,
}

impl Default for TorchIndex {
    fn default() -> Self {
        Self {
            cuda: "https://download.pytorch.org/whl/cu128".to_string(),
            rocm: "https://download.pytorch.org/whl/rocm6.3".to_string(),
            cpu: "https://download.pytorch.org/whl/cpu".to_string(),
        }
    }
}

impl TorchIndex {
    /// Index URL for a device, if it needs a non-default index.
    pub fn for_device(&self, device: Option<Device>) -> Option<&str> {
        match device {
            Some(Device::Cuda) => Some(&self.cuda),
            Some(Device::Rocm) => Some(&self.rocm),
            Some(Device::Cpu) => Some(&self.cpu),
            Some(Device::Mps) | None => None,
        }
    }
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python_version: "3.12".to_string(),
            required_imports: DEFAULT_REQUIRED_IMPORTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            requirements_file: "requirements.txt".to_string(),
            torch_packages: vec![
                "torch".to_string(),
                "torchvision".to_string(),
                "torchaudio".to_string(),
            ],
            torch_index: TorchIndex::default(),
            uv_path: None,
        }
    }
}

/// Explicit replacement for process-global state.
#[derive(Debug, Clone)]
pub struct AppContext {
    user_data_dir: PathBuf,
    resources_dir: PathBuf,
    platform: Platform,
    toolchain: ToolchainConfig,
}

impl AppContext {
    /// File name of the optional toolchain override in the resources directory.
    pub const TOOLCHAIN_FILE: &'static str = "toolchain.yml";

    /// Build the context, reading `toolchain.yml` from the resources directory if present.
    pub fn load(user_data_dir: &Path, resources_dir: &Path) -> Result<Self> {
        let toolchain_path = resources_dir.join(Self::TOOLCHAIN_FILE);
        let toolchain = match read_yaml::<ToolchainConfig>(&toolchain_path) {
            FileRead::Success(config) => {
                info!("Loaded toolchain overrides from {}", toolchain_path.display());
                config
            }
            FileRead::NotFound => ToolchainConfig::default(),
            FileRead::Invalid(message) => {
                return Err(InstallError::ConfigCorrupt {
                    path: toolchain_path,
                    message,
                })
            }
            FileRead::Error(message) => {
                return Err(anyhow::anyhow!(
                    "Failed to read {}: {}",
                    toolchain_path.display(),
                    message
                )
                .into())
            }
        };

        Ok(Self::new(user_data_dir, resources_dir, toolchain))
    }

    /// Build a context with an explicit toolchain.
    pub fn new(user_data_dir: &Path, resources_dir: &Path, toolchain: ToolchainConfig) -> Self {
        let ctx = Self {
            user_data_dir: user_data_dir.to_path_buf(),
            resources_dir: resources_dir.to_path_buf(),
            platform: Platform::current(),
            toolchain,
        };
        debug!("Context: {:?}", ctx);
        ctx
    }

    /// Override the detected platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn user_data_dir(&self) -> &Path {
        &self.user_data_dir
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn toolchain(&self) -> &ToolchainConfig {
        &self.toolchain
    }

    /// Where the installation record is persisted.
    pub fn record_store(&self) -> RecordStore {
        RecordStore::new(&self.user_data_dir)
    }

    /// Model-path configuration; its presence without a record marks a legacy install.
    pub fn model_config_file(&self) -> PathBuf {
        ModelPathConfig::file_path(&self.user_data_dir)
    }

    pub fn requirements_file(&self) -> PathBuf {
        self.resources_dir.join(&self.toolchain.requirements_file)
    }

    /// The `uv` used to create environments.
    pub fn bootstrap_uv(&self) -> PathBuf {
        self.toolchain.uv_path.clone().unwrap_or_else(|| {
            self.resources_dir
                .join("uv")
                .join(self.platform.executable_name("uv"))
        })
    }

    /// Suggested base path for a fresh install.
    pub fn default_base_path(&self) -> PathBuf {
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| self.user_data_dir.clone())
            .join("ComfyUI")
    }

    /// Default user-data directory for this platform.
    pub fn default_user_data_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ComfyUI")
    }
}
