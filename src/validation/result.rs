//! Validation snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::InstallError;
use crate::record::InstallState;

/// Outcome of one validation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "skipped")]
    Skipped,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Error => "error",
            Self::Skipped => "skipped",
        })
    }
}

/// The per-step fields of a [`ValidationResult`], in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckField {
    BasePath,
    VenvDirectory,
    PythonInterpreter,
    PackageManager,
    PythonPackages,
    VersionControlTool,
    PlatformRuntime,
}

impl CheckField {
    pub const ALL: [CheckField; 7] = [
        Self::BasePath,
        Self::VenvDirectory,
        Self::PythonInterpreter,
        Self::PackageManager,
        Self::PythonPackages,
        Self::VersionControlTool,
        Self::PlatformRuntime,
    ];

    /// Key used in serialized snapshots.
    pub fn key(&self) -> &'static str {
        match self {
            Self::BasePath => "basePath",
            Self::VenvDirectory => "venvDirectory",
            Self::PythonInterpreter => "pythonInterpreter",
            Self::PackageManager => "packageManager",
            Self::PythonPackages => "pythonPackages",
            Self::VersionControlTool => "versionControlTool",
            Self::PlatformRuntime => "platformRuntime",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::BasePath => "Base path",
            Self::VenvDirectory => "Virtual environment",
            Self::PythonInterpreter => "Python interpreter",
            Self::PackageManager => "Package manager (uv)",
            Self::PythonPackages => "Python packages",
            Self::VersionControlTool => "Git",
            Self::PlatformRuntime => "Visual C++ runtime",
        }
    }
}

impl fmt::Display for CheckField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Incremental report of a validation pass.
///
/// A field is `None` until its step has run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub in_progress: bool,
    pub install_state: InstallState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_path: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_directory: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_interpreter: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_packages: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_control_tool: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_runtime: Option<CheckStatus>,

    /// Modules that failed import verification, in request order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_imports: Vec<String>,

    /// Explanation per failed field, keyed by [`CheckField::key`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: BTreeMap<String, String>,
}

/// One failed field of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub field: CheckField,
    pub message: String,
    pub missing_imports: Vec<String>,
}

impl Issue {
    /// The error this issue corresponds to.
    pub fn to_error(&self) -> InstallError {
        match self.field {
            CheckField::BasePath => InstallError::InaccessiblePath {
                message: self.message.clone(),
            },
            CheckField::PythonPackages => InstallError::IncompleteEnvironment {
                missing: self.missing_imports.clone(),
            },
            other => InstallError::MissingRuntime {
                tool: other.label().to_string(),
                message: self.message.clone(),
            },
        }
    }
}

impl ValidationResult {
    /// Empty snapshot for a pass that is about to start.
    pub fn started(install_state: InstallState) -> Self {
        Self {
            in_progress: true,
            install_state,
            ..Default::default()
        }
    }

    pub fn get(&self, field: CheckField) -> Option<CheckStatus> {
        match field {
            CheckField::BasePath => self.base_path,
            CheckField::VenvDirectory => self.venv_directory,
            CheckField::PythonInterpreter => self.python_interpreter,
            CheckField::PackageManager => self.package_manager,
            CheckField::PythonPackages => self.python_packages,
            CheckField::VersionControlTool => self.version_control_tool,
            CheckField::PlatformRuntime => self.platform_runtime,
        }
    }

    pub fn set(&mut self, field: CheckField, status: CheckStatus) {
        let slot = match field {
            CheckField::BasePath => &mut self.base_path,
            CheckField::VenvDirectory => &mut self.venv_directory,
            CheckField::PythonInterpreter => &mut self.python_interpreter,
            CheckField::PackageManager => &mut self.package_manager,
            CheckField::PythonPackages => &mut self.python_packages,
            CheckField::VersionControlTool => &mut self.version_control_tool,
            CheckField::PlatformRuntime => &mut self.platform_runtime,
        };
        *slot = Some(status);
    }

    /// Mark `field` failed with an explanation.
    pub fn fail(&mut self, field: CheckField, message: impl Into<String>) {
        self.set(field, CheckStatus::Error);
        self.messages.insert(field.key().to_string(), message.into());
    }

    pub fn message(&self, field: CheckField) -> Option<&str> {
        self.messages.get(field.key()).map(String::as_str)
    }

    /// Installed with no failed field.
    pub fn is_valid(&self) -> bool {
        self.install_state == InstallState::Installed
            && CheckField::ALL
                .iter()
                .all(|f| self.get(*f) != Some(CheckStatus::Error))
    }

    /// Failed fields in pipeline order.
    pub fn issues(&self) -> Vec<Issue> {
        CheckField::ALL
            .iter()
            .filter(|f| self.get(**f) == Some(CheckStatus::Error))
            .map(|f| Issue {
                field: *f,
                message: self
                    .message(*f)
                    .map(String::from)
                    .unwrap_or_else(|| format!("{} check failed", f.label())),
                missing_imports: if *f == CheckField::PythonPackages {
                    self.missing_imports.clone()
                } else {
                    Vec::new()
                },
            })
            .collect()
    }
}
