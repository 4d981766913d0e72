//! Fresh install.

use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::channel::{InstallDefaults, InstallOptions, UiEvent, UiRequest};
use crate::document::FileRead;
use crate::error::{InstallError, Result};
use crate::model_paths::{ModelPathConfig, MODEL_SUBDIRECTORIES};
use crate::record::InstallState;

use super::settings::AppSettings;
use super::{Orchestrator, Outcome};

/// Directories created under a new base path, besides the model folders.
const LAYOUT_DIRECTORIES: &[&str] = &["user/default", "input", "output", "custom_nodes"];

/// Migration item ids accepted in [`InstallOptions::migration_item_ids`].
pub const MIGRATE_USER_FILES: &str = "user_files";
pub const MIGRATE_MODELS: &str = "models";
pub const MIGRATE_CUSTOM_NODES: &str = "custom_nodes";

/// Where the custom node list from a migration source is recorded.
pub const CUSTOM_NODES_MIGRATION_FILE: &str = "custom-nodes-migration.json";

impl Orchestrator<'_> {
    /// Run the install wizard. Returns an outcome if the install stopped
    /// before finishing.
    ///
    /// An interrupted install (`started`) starts again from the beginning.
    pub(super) fn fresh_install(&mut self) -> Result<Option<Outcome>> {
        if self.record.state() == InstallState::Started {
            info!("Previous install did not finish, starting over");
        }
        self.record.transition(InstallState::Started)?;
        self.save_record()?;

        let report = match self.hardware.check() {
            Ok(report) => report,
            Err(e) => {
                let message = match e {
                    InstallError::HardwareUnsupported { message } => message,
                    other => other.to_string(),
                };
                error!("Hardware check failed: {}", message);
                self.port.emit(UiEvent::UnsupportedHardware {
                    message: message.clone(),
                });
                return Ok(Some(Outcome::UnsupportedHardware(message)));
            }
        };

        self.port
            .emit(UiEvent::AwaitingInstallOptions(InstallDefaults {
                suggested_device: report.suggested_device,
                default_base_path: self.ctx.default_base_path(),
            }));

        let Some(options) = self.await_install_options() else {
            info!("Install aborted before it started");
            return Ok(Some(Outcome::Aborted(self.last_result.clone())));
        };

        match self.install(&options) {
            Ok(()) => Ok(None),
            Err(e) => {
                error!("Install failed: {}", e);
                self.port.emit(UiEvent::InstallFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Wait for `StartInstall`. `None` if the user aborted or hung up.
    fn await_install_options(&self) -> Option<InstallOptions> {
        loop {
            match self.port.next_request() {
                Ok(UiRequest::StartInstall(options)) => return Some(options),
                Ok(UiRequest::Abort) | Err(_) => return None,
                Ok(UiRequest::Revalidate) => debug!("Ignoring revalidate during install"),
                Ok(UiRequest::Repair { reply, .. })
                | Ok(UiRequest::SelectBasePath { reply, .. })
                | Ok(UiRequest::CompleteValidation { reply }) => {
                    warn!("Ignoring request while waiting for install options");
                    reply.respond(false);
                }
            }
        }
    }

    fn install(&mut self, options: &InstallOptions) -> Result<()> {
        let base = options.base_path.as_path();
        info!("Installing to {}", base.display());
        if !base.is_absolute() {
            return Err(InstallError::InaccessiblePath {
                message: format!("{} is not an absolute path", base.display()),
            });
        }

        create_layout(base)?;
        self.migrate_assets(options)?;

        let config_path = self.ctx.model_config_file();
        let mut config = match ModelPathConfig::load(&config_path) {
            FileRead::Success(mut config) => {
                config.set_base_path(base);
                config
            }
            _ => ModelPathConfig::for_base_path(base),
        };
        if let Some(source) = migration_source(options, MIGRATE_MODELS) {
            config.set_migration_source(source);
        }
        config.save(&config_path)?;

        let settings_path = AppSettings::path(base);
        let mut settings = match AppSettings::load(&settings_path) {
            FileRead::Success(settings) => settings,
            _ => AppSettings::default(),
        };
        settings.apply(options);
        settings.save(&settings_path)?;

        self.record.set_base_path(base.to_path_buf());
        self.record.set_selected_device(options.device);
        self.save_record()?;

        self.mirrors = settings.mirrors();
        self.refresh_environment();
        {
            let port = &self.port;
            self.environment()?
                .create(&mut |line| port.emit(UiEvent::Log(line)))?;
        }

        self.record.transition(InstallState::Installed)?;
        self.save_record()?;
        info!("Install complete");
        self.port.emit(UiEvent::InstallComplete {
            base_path: base.to_path_buf(),
        });
        Ok(())
    }

    fn migrate_assets(&self, options: &InstallOptions) -> Result<()> {
        let Some(source) = options.migration_source_path.as_deref() else {
            return Ok(());
        };
        if options.migration_item_ids.is_empty() {
            return Ok(());
        }
        if !source.is_dir() {
            return Err(InstallError::InaccessiblePath {
                message: format!("Migration source {} is not a directory", source.display()),
            });
        }

        let base = options.base_path.as_path();
        for item in &options.migration_item_ids {
            match item.as_str() {
                MIGRATE_USER_FILES => {
                    let copied = copy_missing(&source.join("user"), &base.join("user"))?;
                    info!("Migrated {} user files from {}", copied, source.display());
                }
                MIGRATE_CUSTOM_NODES => {
                    let nodes = list_custom_nodes(&source.join("custom_nodes"))?;
                    let path = base
                        .join("user")
                        .join("default")
                        .join(CUSTOM_NODES_MIGRATION_FILE);
                    let content = serde_json::to_string_pretty(&nodes).map_err(|e| {
                        InstallError::Serialization {
                            what: "custom node list".to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    crate::document::write_atomic(&path, &content)?;
                    info!("Recorded {} custom nodes for reinstall", nodes.len());
                }
                // Written with the model-path config.
                MIGRATE_MODELS => {}
                other => warn!("Unknown migration item '{}'", other),
            }
        }
        Ok(())
    }
}

fn migration_source<'o>(options: &'o InstallOptions, item: &str) -> Option<&'o Path> {
    options
        .migration_source_path
        .as_deref()
        .filter(|_| options.migration_item_ids.iter().any(|id| id == item))
}

/// Create the base path and the directories ComfyUI expects inside it.
pub fn create_layout(base: &Path) -> Result<()> {
    for name in MODEL_SUBDIRECTORIES {
        fs::create_dir_all(base.join("models").join(name))?;
    }
    for dir in LAYOUT_DIRECTORIES {
        fs::create_dir_all(base.join(dir))?;
    }
    debug!("Created directory layout under {}", base.display());
    Ok(())
}

/// Copy files from `src` into `dst`, keeping any that already exist.
///
/// Returns the number of files copied. A missing `src` copies nothing.
fn copy_missing(src: &Path, dst: &Path) -> Result<u64> {
    if !src.is_dir() {
        return Ok(0);
    }
    fs::create_dir_all(dst)?;

    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_missing(&entry.path(), &target)?;
        } else if !target.exists() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Names of the node packages in a `custom_nodes` directory, sorted.
fn list_custom_nodes(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut nodes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() && !name.starts_with('.') && name != "__pycache__" {
            nodes.push(name);
        }
    }
    nodes.sort();
    Ok(nodes)
}
