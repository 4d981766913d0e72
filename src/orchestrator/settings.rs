//! Initial application settings written into the installation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::channel::InstallOptions;
use crate::document::{read_json, write_atomic, FileRead};
use crate::environment::MirrorSettings;
use crate::error::{InstallError, Result};

/// `<basePath>/user/default/comfy.settings.json`.
///
/// Only the keys the installer owns are typed; everything else in the file
/// is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(
        rename = "Comfy-Desktop.AutoUpdate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_update: Option<bool>,

    #[serde(
        rename = "Comfy-Desktop.SendStatistics",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub send_statistics: Option<bool>,

    #[serde(
        rename = "Comfy-Desktop.UV.PythonInstallMirror",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub python_install_mirror: Option<String>,

    #[serde(
        rename = "Comfy-Desktop.UV.PypiInstallMirror",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pypi_install_mirror: Option<String>,

    #[serde(
        rename = "Comfy-Desktop.UV.TorchInstallMirror",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub torch_install_mirror: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AppSettings {
    pub fn path(base_path: &Path) -> PathBuf {
        base_path
            .join("user")
            .join("default")
            .join("comfy.settings.json")
    }

    pub fn load(path: &Path) -> FileRead<Self> {
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| InstallError::Serialization {
                what: "application settings".to_string(),
                message: e.to_string(),
            })?;
        write_atomic(path, &content)
    }

    /// Record the wizard's answers.
    pub fn apply(&mut self, options: &InstallOptions) {
        let mirrors = &options.mirror_settings;
        self.auto_update = Some(options.auto_update);
        self.send_statistics = Some(options.allow_metrics);
        self.python_install_mirror = mirrors.python_mirror.clone();
        self.pypi_install_mirror = mirrors.pypi_mirror.clone();
        self.torch_install_mirror = mirrors.torch_mirror.clone();
    }

    /// Mirror preferences; blank entries count as unset.
    pub fn mirrors(&self) -> MirrorSettings {
        fn non_blank(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        }

        MirrorSettings {
            python_mirror: non_blank(&self.python_install_mirror),
            pypi_mirror: non_blank(&self.pypi_install_mirror),
            torch_mirror: non_blank(&self.torch_install_mirror),
        }
    }
}
