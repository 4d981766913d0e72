//! The persisted installation record.
//!
//! An [`InstallationRecord`] describes how far installation got, where the
//! user's content lives and which compute device was chosen. It is loaded
//! once at startup by [`RecordStore`] and rewritten after every mutation.

pub mod store;

pub use store::RecordStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{InstallError, Result};

/// How far installation has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Nothing has been installed yet.
    #[default]
    NotInstalled,
    /// A fresh install began but never finished.
    Started,
    /// A legacy installation was found and needs its config migrated.
    Upgraded,
    /// Installation finished.
    Installed,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::Started => "started",
            Self::Upgraded => "upgraded",
            Self::Installed => "installed",
        }
    }

    /// Whether the record may move from `self` to `to`.
    ///
    /// `Started -> Started` is allowed because an interrupted install restarts
    /// from scratch.
    pub fn can_transition_to(&self, to: InstallState) -> bool {
        use InstallState::*;
        matches!(
            (self, to),
            (NotInstalled, Started)
                | (NotInstalled, Upgraded)
                | (Started, Started)
                | (Started, Installed)
                | (Upgraded, Installed)
        )
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute device PyTorch is installed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    Cuda,
    Rocm,
    Mps,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Rocm => "rocm",
            Self::Mps => "mps",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "nvidia" => Ok(Self::Cuda),
            "rocm" | "amd" => Ok(Self::Rocm),
            "mps" | "apple" => Ok(Self::Mps),
            other => Err(format!(
                "unknown device '{}' (expected cpu, cuda, rocm or mps)",
                other
            )),
        }
    }
}

/// Persisted installation state.
///
/// Keys the record does not know about are kept in `extra` so rewriting the
/// document never drops settings written by other parts of the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    install_state: Option<InstallState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_device: Option<Device>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    installed_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl InstallationRecord {
    /// A record for a machine that has never been set up.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; a record without a persisted state is `NotInstalled`.
    pub fn state(&self) -> InstallState {
        self.install_state.unwrap_or_default()
    }

    /// Whether the document carried an `installState` key.
    pub fn has_persisted_state(&self) -> bool {
        self.install_state.is_some()
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    pub fn selected_device(&self) -> Option<Device> {
        self.selected_device
    }

    pub fn installed_at(&self) -> Option<DateTime<Utc>> {
        self.installed_at
    }

    /// Move to a new state, refusing backwards transitions.
    pub(crate) fn transition(&mut self, to: InstallState) -> Result<()> {
        let from = self.state();
        if !from.can_transition_to(to) {
            return Err(InstallError::InvalidTransition { from, to });
        }
        if to == InstallState::Installed {
            self.installed_at = Some(Utc::now());
        }
        self.install_state = Some(to);
        Ok(())
    }

    pub(crate) fn set_base_path(&mut self, path: PathBuf) {
        self.base_path = Some(path);
    }

    pub(crate) fn set_selected_device(&mut self, device: Option<Device>) {
        self.selected_device = device;
    }
}
