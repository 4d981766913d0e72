//! Model-path configuration document.
//!
//! ComfyUI reads extra model search roots from a YAML file with one section
//! per root:
//!
//! ```yaml
//! comfyui_desktop:
//!   base_path: /home/user/Documents/ComfyUI
//!   is_default: true
//!   checkpoints: models/checkpoints/
//!   loras: models/loras/
//! ```
//!
//! The installer writes the default section during install, adds a section
//! for a migration source, and reads the file back to find the base path of
//! a legacy installation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::document::{read_yaml, write_atomic, FileRead};
use crate::error::{InstallError, Result};

/// Section written for the installation's own base path.
pub const DEFAULT_SECTION: &str = "comfyui_desktop";

/// Section pointing at a legacy ComfyUI install the user migrated from.
pub const MIGRATION_SECTION: &str = "comfyui_migration";

/// Model folders mapped under every section, relative to `base_path`.
pub const MODEL_SUBDIRECTORIES: &[&str] = &[
    "checkpoints",
    "classifiers",
    "clip",
    "clip_vision",
    "configs",
    "controlnet",
    "diffusers",
    "diffusion_models",
    "embeddings",
    "gligen",
    "hypernetworks",
    "loras",
    "photomaker",
    "style_models",
    "text_encoders",
    "unet",
    "upscale_models",
    "vae",
    "vae_approx",
];

/// One model root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPathSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,

    /// Folder name → path(s) relative to `base_path`.
    #[serde(flatten)]
    pub folders: BTreeMap<String, serde_yaml::Value>,
}

impl ModelPathSection {
    /// A section mapping every standard model folder under `base_path`.
    pub fn standard(base_path: &Path) -> Self {
        let mut folders: BTreeMap<String, serde_yaml::Value> = MODEL_SUBDIRECTORIES
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    serde_yaml::Value::String(format!("models/{}/", name)),
                )
            })
            .collect();
        folders.insert(
            "custom_nodes".to_string(),
            serde_yaml::Value::String("custom_nodes/".to_string()),
        );

        Self {
            base_path: Some(base_path.to_path_buf()),
            is_default: None,
            folders,
        }
    }
}

/// The whole document, keyed by section name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelPathConfig {
    sections: BTreeMap<String, ModelPathSection>,
}

impl ModelPathConfig {
    /// File name inside the user-data directory.
    pub const FILE_NAME: &'static str = "extra_models_config.yaml";

    pub fn file_path(user_data_dir: &Path) -> PathBuf {
        user_data_dir.join(Self::FILE_NAME)
    }

    /// A document with only the default section for `base_path`.
    pub fn for_base_path(base_path: &Path) -> Self {
        let mut config = Self::default();
        config.set_base_path(base_path);
        config
    }

    pub fn load(path: &Path) -> FileRead<Self> {
        read_yaml(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).map_err(|e| InstallError::Serialization {
            what: "model path config".to_string(),
            message: e.to_string(),
        })?;
        write_atomic(path, &content)
    }

    pub fn section(&self, name: &str) -> Option<&ModelPathSection> {
        self.sections.get(name)
    }

    /// Point the default section at `base_path`, creating it if needed.
    pub fn set_base_path(&mut self, base_path: &Path) {
        let section = self
            .sections
            .entry(DEFAULT_SECTION.to_string())
            .or_insert_with(|| ModelPathSection::standard(base_path));
        section.base_path = Some(base_path.to_path_buf());
        section.is_default = Some(true);
    }

    /// Add or replace the section for a migration source.
    pub fn set_migration_source(&mut self, source: &Path) {
        self.sections.insert(
            MIGRATION_SECTION.to_string(),
            ModelPathSection::standard(source),
        );
    }

    /// Base path of the installation this document describes.
    ///
    /// Prefers a section flagged `is_default`, then the desktop section, then
    /// the first section that has a base path at all.
    pub fn legacy_base_path(&self) -> Option<PathBuf> {
        let flagged = self
            .sections
            .values()
            .find(|s| s.is_default == Some(true) && s.base_path.is_some());
        let desktop = self
            .sections
            .get(DEFAULT_SECTION)
            .filter(|s| s.base_path.is_some());
        let any = self.sections.values().find(|s| s.base_path.is_some());

        flagged
            .or(desktop)
            .or(any)
            .and_then(|s| s.base_path.clone())
    }
}
