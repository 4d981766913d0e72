//! The validation pipeline.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::document::FileRead;
use crate::environment::{verify_imports, ImportCheck, VirtualEnvironment};
use crate::record::{InstallState, InstallationRecord};
use crate::shell::{OutputLine, Platform};

use super::probe::HostProbe;
use super::result::{CheckField, CheckStatus, ValidationResult};

/// Visual C++ runtime checked on Windows.
pub const VC_RUNTIME_DLL: &str = r"C:\Windows\System32\vcruntime140.dll";

/// Fields gated on the base path being accessible.
const ENVIRONMENT_FIELDS: [CheckField; 4] = [
    CheckField::VenvDirectory,
    CheckField::PythonInterpreter,
    CheckField::PackageManager,
    CheckField::PythonPackages,
];

/// Runs the eight validation steps against a record and its environment.
///
/// Only one pass runs at a time per validator; a second caller blocks until
/// the first has emitted its final snapshot.
pub struct Validator {
    legacy_marker: PathBuf,
    required_imports: Vec<String>,
    platform: Platform,
    probe: Arc<dyn HostProbe>,
    in_flight: Mutex<()>,
}

impl Validator {
    pub fn new(ctx: &AppContext, probe: Arc<dyn HostProbe>) -> Self {
        Self {
            legacy_marker: ctx.model_config_file(),
            required_imports: ctx.toolchain().required_imports.clone(),
            platform: ctx.platform(),
            probe,
            in_flight: Mutex::new(()),
        }
    }

    /// Validate `record`, emitting a snapshot before the first step and after
    /// every step. A failed step never stops the pipeline.
    ///
    /// `env` is `None` when the record has no base path yet. Output of the
    /// import verifier is forwarded to `on_output` as it arrives.
    pub fn validate(
        &self,
        record: &InstallationRecord,
        env: Option<&VirtualEnvironment>,
        on_update: &mut dyn FnMut(&ValidationResult),
        on_output: &mut dyn FnMut(OutputLine),
    ) -> ValidationResult {
        let _pass = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        let mut result = ValidationResult::started(record.state());
        on_update(&result);

        // 1. Legacy install
        if !record.has_persisted_state() && self.probe.is_file(&self.legacy_marker) {
            info!(
                "Found legacy model config at {}, treating as upgrade",
                self.legacy_marker.display()
            );
            result.install_state = InstallState::Upgraded;
        }
        on_update(&result);

        // 2. Base path
        self.check_base_path(record.base_path(), &mut result);
        on_update(&result);

        // 3-6. Environment
        match env {
            Some(env) if result.base_path == Some(CheckStatus::Ok) => {
                self.check_environment(env, &mut result, on_update, on_output);
            }
            _ => {
                debug!("Base path unavailable, skipping environment checks");
                for field in ENVIRONMENT_FIELDS {
                    result.set(field, CheckStatus::Skipped);
                    on_update(&result);
                }
            }
        }

        // 7. Git
        match self.probe.find_on_path("git") {
            Some(path) => {
                debug!("git found at {}", path.display());
                result.set(CheckField::VersionControlTool, CheckStatus::Ok);
            }
            None => {
                warn!("git not found on PATH");
                result.fail(CheckField::VersionControlTool, "git was not found on PATH");
            }
        }
        on_update(&result);

        // 8. Visual C++ runtime
        if self.platform == Platform::Windows {
            if self.probe.is_file(Path::new(VC_RUNTIME_DLL)) {
                result.set(CheckField::PlatformRuntime, CheckStatus::Ok);
            } else {
                warn!("{} not found", VC_RUNTIME_DLL);
                result.fail(
                    CheckField::PlatformRuntime,
                    "The Visual C++ redistributable is not installed",
                );
            }
        } else {
            result.set(CheckField::PlatformRuntime, CheckStatus::Skipped);
        }
        on_update(&result);

        result.in_progress = false;
        info!(
            "Validation finished: state={}, valid={}",
            result.install_state,
            result.is_valid()
        );
        on_update(&result);
        result
    }

    fn check_base_path(&self, base_path: Option<&Path>, result: &mut ValidationResult) {
        let Some(base_path) = base_path else {
            warn!("No base path recorded");
            result.fail(CheckField::BasePath, "No base path has been selected");
            return;
        };

        match self.probe.inspect_dir(base_path) {
            FileRead::Success(()) => result.set(CheckField::BasePath, CheckStatus::Ok),
            FileRead::NotFound => {
                warn!("Base path {} does not exist", base_path.display());
                result.fail(
                    CheckField::BasePath,
                    format!("{} does not exist", base_path.display()),
                );
            }
            FileRead::Invalid(message) | FileRead::Error(message) => {
                warn!("Base path check failed: {}", message);
                result.fail(CheckField::BasePath, message);
            }
        }
    }

    fn check_environment(
        &self,
        env: &VirtualEnvironment,
        result: &mut ValidationResult,
        on_update: &mut dyn FnMut(&ValidationResult),
        on_output: &mut dyn FnMut(OutputLine),
    ) {
        if self.probe.is_dir(env.venv_path()) {
            result.set(CheckField::VenvDirectory, CheckStatus::Ok);
        } else {
            warn!("{} does not exist", env.venv_path().display());
            result.fail(
                CheckField::VenvDirectory,
                format!("{} does not exist", env.venv_path().display()),
            );
        }
        on_update(result);

        self.check_executable(
            CheckField::PythonInterpreter,
            env.python_path(),
            result,
        );
        on_update(result);

        self.check_executable(CheckField::PackageManager, env.uv_path(), result);
        on_update(result);

        let prerequisites_ok = [
            CheckField::BasePath,
            CheckField::VenvDirectory,
            CheckField::PythonInterpreter,
            CheckField::PackageManager,
        ]
        .iter()
        .all(|f| result.get(*f) == Some(CheckStatus::Ok));

        if prerequisites_ok {
            self.check_imports(env, result, on_output);
        } else {
            debug!("Environment incomplete, skipping import verification");
            result.set(CheckField::PythonPackages, CheckStatus::Skipped);
        }
        on_update(result);
    }

    fn check_executable(&self, field: CheckField, path: &Path, result: &mut ValidationResult) {
        if self.probe.is_executable(path) {
            result.set(field, CheckStatus::Ok);
        } else {
            warn!("{} is missing or not executable", path.display());
            result.fail(
                field,
                format!("{} is missing or not executable", path.display()),
            );
        }
    }

    fn check_imports(
        &self,
        env: &VirtualEnvironment,
        result: &mut ValidationResult,
        on_output: &mut dyn FnMut(OutputLine),
    ) {
        match verify_imports(env, &self.required_imports, on_output) {
            Ok(ImportCheck::Verified(verified)) if verified.success => {
                result.set(CheckField::PythonPackages, CheckStatus::Ok);
            }
            Ok(ImportCheck::Verified(verified)) => {
                let message = format!(
                    "Missing Python modules: {}",
                    verified.missing_imports.join(", ")
                );
                result.missing_imports = verified.missing_imports;
                result.fail(CheckField::PythonPackages, message);
            }
            Ok(other) => {
                let message = other
                    .error_message()
                    .unwrap_or_else(|| "Import verification failed".to_string());
                result.fail(CheckField::PythonPackages, message);
            }
            Err(e) => {
                warn!("Import verification could not run: {}", e);
                result.fail(CheckField::PythonPackages, e.to_string());
            }
        }
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("legacy_marker", &self.legacy_marker)
            .field("required_imports", &self.required_imports)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
