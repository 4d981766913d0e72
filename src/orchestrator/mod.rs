//! Installation orchestrator.
//!
//! The orchestrator owns the [`InstallationRecord`] for the whole process and
//! is the only thing that mutates it. It runs on one worker thread and talks
//! to the UI through an [`OrchestratorPort`]:
//!
//! - `not_installed` or `started`: run the install wizard
//! - `upgraded`: migrate the legacy model config, then continue as installed
//! - `installed` with issues: run the resolution loop until the user finishes
//!   or aborts
//!
//! Every path ends with a validated record or an explicit [`Outcome`].

pub mod hardware;
mod install;
mod resolution;
pub mod settings;
mod upgrade;

pub use hardware::{HardwareProbe, HardwareReport, StaticHardware, SystemHardware};
pub use install::{
    create_layout, CUSTOM_NODES_MIGRATION_FILE, MIGRATE_CUSTOM_NODES, MIGRATE_MODELS,
    MIGRATE_USER_FILES,
};
pub use resolution::repair_tasks;
pub use settings::AppSettings;

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::channel::{OrchestratorPort, UiEvent};
use crate::context::AppContext;
use crate::document::FileRead;
use crate::environment::{MirrorSettings, VirtualEnvironment};
use crate::error::{InstallError, Result};
use crate::record::{InstallState, InstallationRecord, RecordStore};
use crate::shell::{CommandRunner, SystemRunner};
use crate::validation::{HostProbe, LocalHost, ValidationResult, Validator};

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The environment validated; the server can start.
    Ready(InstallationRecord),
    /// The user gave up. Carries the last snapshot.
    Aborted(ValidationResult),
    /// The hardware probe refused this machine.
    UnsupportedHardware(String),
    /// A persisted document could not be parsed.
    ConfigCorrupt(PathBuf),
}

pub struct Orchestrator<'a> {
    ctx: &'a AppContext,
    port: OrchestratorPort,
    store: RecordStore,
    record: InstallationRecord,
    environment: Option<VirtualEnvironment>,
    mirrors: MirrorSettings,
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn HostProbe>,
    hardware: Box<dyn HardwareProbe>,
    validator: Validator,
    last_result: ValidationResult,
}

impl<'a> Orchestrator<'a> {
    /// An orchestrator for the real machine.
    pub fn new(ctx: &'a AppContext, port: OrchestratorPort) -> Self {
        let probe: Arc<dyn HostProbe> = Arc::new(LocalHost::new(ctx.platform()));
        Self {
            ctx,
            port,
            store: ctx.record_store(),
            record: InstallationRecord::new(),
            environment: None,
            mirrors: MirrorSettings::default(),
            runner: Arc::new(SystemRunner),
            validator: Validator::new(ctx, probe.clone()),
            probe,
            hardware: Box::new(SystemHardware::detect(ctx.platform())),
            last_result: ValidationResult::default(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.validator = Validator::new(self.ctx, probe.clone());
        self.probe = probe;
        self
    }

    pub fn with_hardware(mut self, hardware: Box<dyn HardwareProbe>) -> Self {
        self.hardware = hardware;
        self
    }

    /// Load the record, validate it and drive it to a usable state.
    pub fn run(mut self) -> Result<Outcome> {
        match self.drive() {
            Err(InstallError::ConfigCorrupt { path, message }) => {
                error!("Config file {} is corrupt: {}", path.display(), message);
                self.port.emit(UiEvent::ConfigCorrupt {
                    path: path.clone(),
                    message,
                });
                Ok(Outcome::ConfigCorrupt(path))
            }
            other => other,
        }
    }

    fn drive(&mut self) -> Result<Outcome> {
        self.record = self.load_record()?;
        info!("Install state: {}", self.record.state());
        self.reload_mirrors();
        self.refresh_environment();

        let result = self.validate();
        let result = match result.install_state {
            InstallState::NotInstalled | InstallState::Started => {
                if let Some(outcome) = self.fresh_install()? {
                    return Ok(outcome);
                }
                self.validate()
            }
            InstallState::Upgraded => {
                self.migrate()?;
                self.validate()
            }
            InstallState::Installed => result,
        };

        if result.is_valid() {
            info!("Installation is valid");
            return Ok(Outcome::Ready(self.record.clone()));
        }
        self.resolve(result)
    }

    fn load_record(&self) -> Result<InstallationRecord> {
        match self.store.load() {
            FileRead::Success(record) => Ok(record),
            FileRead::NotFound => {
                info!("No installation record, starting fresh");
                Ok(InstallationRecord::new())
            }
            FileRead::Invalid(message) => Err(InstallError::ConfigCorrupt {
                path: self.store.path().to_path_buf(),
                message,
            }),
            FileRead::Error(message) => Err(anyhow::anyhow!(
                "Failed to read {}: {}",
                self.store.path().display(),
                message
            )
            .into()),
        }
    }

    fn save_record(&self) -> Result<()> {
        self.store.save(&self.record)
    }

    /// Run a validation pass, forwarding every snapshot to the UI.
    fn validate(&mut self) -> ValidationResult {
        let port = &self.port;
        let result = self.validator.validate(
            &self.record,
            self.environment.as_ref(),
            &mut |snapshot| port.emit(UiEvent::Validation(snapshot.clone())),
            &mut |line| port.emit(UiEvent::Log(line)),
        );
        self.last_result = result.clone();
        result
    }

    /// Rebuild the environment after the base path or device changed.
    fn refresh_environment(&mut self) {
        self.environment = self.record.base_path().map(|base| {
            VirtualEnvironment::new(
                self.ctx,
                base,
                self.record.selected_device(),
                &self.mirrors,
                self.runner.clone(),
            )
        });
    }

    /// Read mirror preferences back from the installation's settings file.
    fn reload_mirrors(&mut self) {
        let Some(base) = self.record.base_path() else {
            return;
        };
        let path = AppSettings::path(base);
        self.mirrors = match AppSettings::load(&path) {
            FileRead::Success(settings) => settings.mirrors(),
            FileRead::NotFound => MirrorSettings::default(),
            FileRead::Invalid(message) | FileRead::Error(message) => {
                warn!("Ignoring settings at {}: {}", path.display(), message);
                MirrorSettings::default()
            }
        };
    }

    fn environment(&self) -> Result<&VirtualEnvironment> {
        self.environment
            .as_ref()
            .ok_or_else(|| InstallError::InaccessiblePath {
                message: "No base path has been selected".to_string(),
            })
    }
}
