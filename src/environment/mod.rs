//! The managed Python environment.
//!
//! A [`VirtualEnvironment`] lives at `<basePath>/.venv` and is rebuilt
//! whenever the base path or compute device changes. All package work is
//! delegated to `uv`: the bootstrap copy shipped with the application creates
//! the environment, after which the environment's own `uv` takes over.
//!
//! Every operation streams subprocess output line by line to the caller and
//! to `tracing`, so long installs stay visible.

pub mod imports;
pub mod requirements;

pub use imports::{verify_imports, ImportCheck, ImportVerificationResult};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::error::{InstallError, Result};
use crate::record::Device;
use crate::shell::{
    display_command, is_executable, CommandOptions, CommandResult, CommandRunner, OutputLine,
};

/// Directory name of the environment under the base path.
pub const VENV_DIR: &str = ".venv";

/// Directory name of the `uv` cache under the base path.
pub const CACHE_DIR: &str = "uv-cache";

/// User-selected download mirrors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSettings {
    /// Where `uv` downloads Python builds from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_mirror: Option<String>,

    /// Replacement for the default PyPI index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pypi_mirror: Option<String>,

    /// Replacement for the device-specific PyTorch index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torch_mirror: Option<String>,
}

/// A Python virtual environment rooted under an installation's base path.
pub struct VirtualEnvironment {
    base_path: PathBuf,
    venv_path: PathBuf,
    python_path: PathBuf,
    uv_path: PathBuf,
    bootstrap_uv: PathBuf,
    requirements_file: PathBuf,
    python_version: String,
    torch_packages: Vec<String>,
    torch_index: Option<String>,
    device: Option<Device>,
    mirrors: MirrorSettings,
    runner: Arc<dyn CommandRunner>,
}

impl VirtualEnvironment {
    pub fn new(
        ctx: &AppContext,
        base_path: &Path,
        device: Option<Device>,
        mirrors: &MirrorSettings,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let platform = ctx.platform();
        let venv_path = base_path.join(VENV_DIR);
        let bin_dir = venv_path.join(platform.venv_bin_dir());
        let toolchain = ctx.toolchain();

        let torch_index = mirrors
            .torch_mirror
            .clone()
            .or_else(|| toolchain.torch_index.for_device(device).map(String::from));

        Self {
            base_path: base_path.to_path_buf(),
            python_path: bin_dir.join(platform.executable_name("python")),
            uv_path: bin_dir.join(platform.executable_name("uv")),
            venv_path,
            bootstrap_uv: ctx.bootstrap_uv(),
            requirements_file: ctx.requirements_file(),
            python_version: toolchain.python_version.clone(),
            torch_packages: toolchain.torch_packages.clone(),
            torch_index,
            device,
            mirrors: mirrors.clone(),
            runner,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn venv_path(&self) -> &Path {
        &self.venv_path
    }

    pub fn python_path(&self) -> &Path {
        &self.python_path
    }

    /// The environment's own `uv`.
    pub fn uv_path(&self) -> &Path {
        &self.uv_path
    }

    pub fn device(&self) -> Option<Device> {
        self.device
    }

    pub fn mirrors(&self) -> &MirrorSettings {
        &self.mirrors
    }

    /// The `uv` to use for package work: the environment's own copy once it
    /// is executable, the bootstrap copy before that.
    pub fn package_manager(&self) -> &Path {
        if is_executable(&self.uv_path) {
            &self.uv_path
        } else {
            &self.bootstrap_uv
        }
    }

    pub fn exists(&self) -> bool {
        self.venv_path.is_dir()
    }

    /// Create the environment, seed its `uv` and install requirements.
    ///
    /// Anything left at the environment path by an earlier attempt is
    /// removed first.
    pub fn create(&self, on_output: &mut dyn FnMut(OutputLine)) -> Result<()> {
        if self.venv_path.exists() {
            warn!(
                "Removing leftover environment at {}",
                self.venv_path.display()
            );
            fs::remove_dir_all(&self.venv_path)?;
        }
        info!("Creating virtual environment at {}", self.venv_path.display());

        let args = vec![
            "venv".to_string(),
            "--python".to_string(),
            self.python_version.clone(),
            self.venv_path.display().to_string(),
        ];
        self.run_required(&self.bootstrap_uv, &args, on_output)?;

        let args = vec![
            "pip".to_string(),
            "install".to_string(),
            "--python".to_string(),
            self.python_path.display().to_string(),
            "uv".to_string(),
        ];
        self.run_required(&self.bootstrap_uv, &args, on_output)?;

        if !self.reinstall_requirements(on_output)? {
            return Err(InstallError::CommandFailed {
                command: format!("install {}", self.requirements_file.display()),
                code: None,
            });
        }

        info!("Virtual environment ready");
        Ok(())
    }

    /// Whether every package in the requirements manifest is installed.
    pub fn has_requirements(&self) -> Result<bool> {
        let manifest = fs::read_to_string(&self.requirements_file)?;
        let manifest = requirements::parse_manifest(&manifest);

        let args = vec![
            "pip".to_string(),
            "list".to_string(),
            "--python".to_string(),
            self.python_path.display().to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        let result = self.run_uv(&args, &mut |_| {})?;
        if !result.success {
            warn!("Package listing exited with {:?}", result.exit_code);
            return Ok(false);
        }

        let installed = requirements::parse_installed(&result.stdout).map_err(|e| {
            InstallError::InvalidOutput {
                command: display_command(self.package_manager(), &args),
                message: e.to_string(),
            }
        })?;

        let missing = requirements::missing_packages(&manifest, &installed);
        if missing.is_empty() {
            Ok(true)
        } else {
            warn!("Missing packages: {}", missing.join(", "));
            Ok(false)
        }
    }

    /// Install the PyTorch packages for the selected device, then the full
    /// manifest. Returns `false` if either install exits non-zero.
    pub fn reinstall_requirements(&self, on_output: &mut dyn FnMut(OutputLine)) -> Result<bool> {
        if !self.torch_packages.is_empty() {
            let mut args = self.pip_install_args();
            args.extend(self.torch_packages.iter().cloned());
            if let Some(index) = &self.torch_index {
                args.push("--index-url".to_string());
                args.push(index.clone());
            }
            let result = self.run_uv(&args, on_output)?;
            if !result.success {
                error!("PyTorch install exited with {:?}", result.exit_code);
                return Ok(false);
            }
        }

        let mut args = self.pip_install_args();
        args.push("-r".to_string());
        args.push(self.requirements_file.display().to_string());
        let result = self.run_uv(&args, on_output)?;
        if !result.success {
            error!("Requirements install exited with {:?}", result.exit_code);
            return Ok(false);
        }
        Ok(true)
    }

    /// Delete the environment directory. Failures are logged, not raised.
    pub fn remove_directory(&self) -> bool {
        if !self.venv_path.exists() {
            return true;
        }
        match fs::remove_dir_all(&self.venv_path) {
            Ok(()) => {
                info!("Removed {}", self.venv_path.display());
                true
            }
            Err(e) => {
                error!("Failed to remove {}: {}", self.venv_path.display(), e);
                false
            }
        }
    }

    /// Run `uv cache clean`.
    pub fn clear_cache(&self, on_output: &mut dyn FnMut(OutputLine)) -> Result<bool> {
        let args = vec!["cache".to_string(), "clean".to_string()];
        Ok(self.run_uv(&args, on_output)?.success)
    }

    /// Run the environment's interpreter.
    pub fn run_python(
        &self,
        args: &[String],
        on_output: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult> {
        self.run_command(&self.python_path, args, on_output)
    }

    /// Run the package manager.
    pub fn run_uv(
        &self,
        args: &[String],
        on_output: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult> {
        self.run_command(self.package_manager(), args, on_output)
    }

    /// Run any program inside the environment.
    ///
    /// Each line is logged and forwarded as it arrives. A non-zero exit is
    /// returned in the result; only a failure to start is an error.
    pub fn run_command(
        &self,
        program: &Path,
        args: &[String],
        on_output: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult> {
        let rendered = display_command(program, args);
        debug!("Running: {}", rendered);

        let options = CommandOptions {
            cwd: None,
            env: self.command_env(),
        };
        let result = self.runner.run(program, args, &options, &mut |line| {
            match &line {
                OutputLine::Stdout(text) => debug!(stream = "stdout", "{}", text),
                OutputLine::Stderr(text) => debug!(stream = "stderr", "{}", text),
            }
            on_output(line);
        })?;

        debug!(
            "Finished in {:?} with exit code {:?}: {}",
            result.duration, result.exit_code, rendered
        );
        Ok(result)
    }

    fn run_required(
        &self,
        program: &Path,
        args: &[String],
        on_output: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult> {
        let result = self.run_command(program, args, on_output)?;
        if !result.success {
            return Err(InstallError::CommandFailed {
                command: display_command(program, args),
                code: result.exit_code,
            });
        }
        Ok(result)
    }

    fn pip_install_args(&self) -> Vec<String> {
        vec![
            "pip".to_string(),
            "install".to_string(),
            "--python".to_string(),
            self.python_path.display().to_string(),
        ]
    }

    fn command_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "VIRTUAL_ENV".to_string(),
            self.venv_path.display().to_string(),
        );
        env.insert(
            "UV_CACHE_DIR".to_string(),
            self.base_path.join(CACHE_DIR).display().to_string(),
        );
        if let Some(mirror) = &self.mirrors.python_mirror {
            env.insert("UV_PYTHON_INSTALL_MIRROR".to_string(), mirror.clone());
        }
        if let Some(mirror) = &self.mirrors.pypi_mirror {
            env.insert("UV_DEFAULT_INDEX".to_string(), mirror.clone());
        }
        env
    }
}

impl std::fmt::Debug for VirtualEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualEnvironment")
            .field("venv_path", &self.venv_path)
            .field("device", &self.device)
            .field("mirrors", &self.mirrors)
            .finish_non_exhaustive()
    }
}
