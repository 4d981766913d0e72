//! The resolution loop.
//!
//! Outstanding issues are offered to the UI as repair tasks. Each request is
//! answered, then the environment is validated again and the new task list
//! is published. The loop ends when the user completes with nothing left to
//! fix, or aborts.

use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::channel::{RepairAction, RepairTask, TaskKind, UiEvent, UiRequest};
use crate::document::FileRead;
use crate::error::{InstallError, Result};
use crate::model_paths::ModelPathConfig;
use crate::shell::OutputLine;
use crate::validation::{CheckField, ValidationResult};

use super::{create_layout, Orchestrator, Outcome};

/// Repair tasks for the failed fields of `result`, without duplicates.
pub fn repair_tasks(result: &ValidationResult) -> Vec<RepairTask> {
    let mut tasks: Vec<RepairTask> = Vec::new();
    let mut push = |task: RepairTask| {
        if !tasks.iter().any(|t| t.id == task.id) {
            tasks.push(task);
        }
    };

    for issue in result.issues() {
        match issue.field {
            CheckField::BasePath => push(RepairTask {
                id: "selectBasePath".to_string(),
                field: issue.field,
                title: "Choose an installation folder".to_string(),
                description: issue.message,
                kind: TaskKind::SelectBasePath,
            }),
            CheckField::VenvDirectory
            | CheckField::PythonInterpreter
            | CheckField::PackageManager => push(RepairTask {
                id: RepairAction::ResetEnvironment.id().to_string(),
                field: issue.field,
                title: "Reset the Python environment".to_string(),
                description: issue.message,
                kind: TaskKind::Repair(RepairAction::ResetEnvironment),
            }),
            CheckField::PythonPackages => {
                push(RepairTask {
                    id: RepairAction::ReinstallRequirements.id().to_string(),
                    field: issue.field,
                    title: "Reinstall Python packages".to_string(),
                    description: issue.message,
                    kind: TaskKind::Repair(RepairAction::ReinstallRequirements),
                });
                push(RepairTask {
                    id: RepairAction::ClearCache.id().to_string(),
                    field: issue.field,
                    title: "Clear the package cache".to_string(),
                    description: "Remove cached downloads before reinstalling".to_string(),
                    kind: TaskKind::Repair(RepairAction::ClearCache),
                });
            }
            CheckField::VersionControlTool => push(RepairTask {
                id: "installGit".to_string(),
                field: issue.field,
                title: "Install git".to_string(),
                description: issue.message,
                kind: TaskKind::Manual,
            }),
            CheckField::PlatformRuntime => push(RepairTask {
                id: "installVcRedist".to_string(),
                field: issue.field,
                title: "Install the Visual C++ redistributable".to_string(),
                description: issue.message,
                kind: TaskKind::Manual,
            }),
        }
    }
    tasks
}

impl Orchestrator<'_> {
    pub(super) fn resolve(&mut self, mut result: ValidationResult) -> Result<Outcome> {
        info!("Entering resolution loop with {} issues", result.issues().len());
        loop {
            self.port.emit(UiEvent::RepairTasks(repair_tasks(&result)));

            let request = match self.port.next_request() {
                Ok(request) => request,
                Err(InstallError::ChannelClosed) => {
                    warn!("UI disconnected during resolution");
                    return Ok(Outcome::Aborted(result));
                }
                Err(e) => return Err(e),
            };

            match request {
                UiRequest::Repair { action, reply } => {
                    let ok = self.repair(action);
                    reply.respond(ok);
                    result = self.validate();
                }
                UiRequest::SelectBasePath { path, reply } => {
                    let ok = self.select_base_path(&path);
                    reply.respond(ok);
                    result = self.validate();
                }
                UiRequest::Revalidate => result = self.validate(),
                UiRequest::CompleteValidation { reply } => {
                    if result.is_valid() {
                        reply.respond(true);
                        info!("Resolution complete");
                        return Ok(Outcome::Ready(self.record.clone()));
                    }
                    debug!("Completion refused, issues remain");
                    reply.respond(false);
                }
                UiRequest::Abort => {
                    info!("Resolution aborted by user");
                    return Ok(Outcome::Aborted(result));
                }
                UiRequest::StartInstall(_) => {
                    warn!("Ignoring install request, already installed");
                }
            }
        }
    }

    fn repair(&mut self, action: RepairAction) -> bool {
        info!("Running repair: {}", action);
        let outcome = self.run_repair(action);
        match outcome {
            Ok(true) => {
                info!("Repair {} succeeded", action);
                true
            }
            Ok(false) => {
                self.report_failure(&format!("Repair {} did not succeed", action));
                false
            }
            Err(e) => {
                self.report_failure(&format!("Repair {} failed: {}", action, e));
                false
            }
        }
    }

    fn run_repair(&self, action: RepairAction) -> Result<bool> {
        let env = self.environment()?;
        let port = &self.port;
        let mut on_output = |line: OutputLine| port.emit(UiEvent::Log(line));

        match action {
            RepairAction::ReinstallRequirements => {
                Ok(env.reinstall_requirements(&mut on_output)? && env.has_requirements()?)
            }
            RepairAction::ClearCache => env.clear_cache(&mut on_output),
            RepairAction::ResetEnvironment => {
                if !env.remove_directory() {
                    return Ok(false);
                }
                env.create(&mut on_output)?;
                Ok(true)
            }
        }
    }

    fn select_base_path(&mut self, path: &Path) -> bool {
        match self.try_select_base_path(path) {
            Ok(()) => true,
            Err(e) => {
                self.report_failure(&format!(
                    "Cannot use {} as base path: {}",
                    path.display(),
                    e
                ));
                false
            }
        }
    }

    fn try_select_base_path(&mut self, path: &Path) -> Result<()> {
        if !path.is_absolute() {
            return Err(InstallError::InaccessiblePath {
                message: format!("{} is not an absolute path", path.display()),
            });
        }
        fs::create_dir_all(path)?;
        match self.probe.inspect_dir(path) {
            FileRead::Success(()) => {}
            FileRead::NotFound => {
                return Err(InstallError::InaccessiblePath {
                    message: format!("{} does not exist", path.display()),
                })
            }
            FileRead::Invalid(message) | FileRead::Error(message) => {
                return Err(InstallError::InaccessiblePath { message })
            }
        }
        create_layout(path)?;

        self.record.set_base_path(path.to_path_buf());
        self.save_record()?;
        info!("Base path changed to {}", path.display());

        let config_path = self.ctx.model_config_file();
        let config = match ModelPathConfig::load(&config_path) {
            FileRead::Success(mut config) => {
                config.set_base_path(path);
                config
            }
            _ => ModelPathConfig::for_base_path(path),
        };
        config.save(&config_path)?;

        self.reload_mirrors();
        self.refresh_environment();
        Ok(())
    }

    fn report_failure(&self, message: &str) {
        error!("{}", message);
        self.port
            .emit(UiEvent::Log(OutputLine::Stderr(message.to_string())));
    }
}
