//! One-shot migration of a legacy installation.

use tracing::{info, warn};

use crate::document::FileRead;
use crate::error::{InstallError, Result};
use crate::model_paths::ModelPathConfig;
use crate::record::InstallState;

use super::Orchestrator;

impl Orchestrator<'_> {
    /// Adopt a legacy install: take its base path from the model-path
    /// config, point the config's default section at it and mark the record
    /// installed.
    pub(super) fn migrate(&mut self) -> Result<()> {
        info!("Migrating legacy installation");
        // A migration interrupted after this point resumes as upgraded.
        if self.record.state() != InstallState::Upgraded {
            self.record.transition(InstallState::Upgraded)?;
            self.save_record()?;
        }

        let path = self.ctx.model_config_file();
        match ModelPathConfig::load(&path) {
            FileRead::Success(mut config) => match config.legacy_base_path() {
                Some(base) => {
                    info!("Legacy base path: {}", base.display());
                    config.set_base_path(&base);
                    config.save(&path)?;
                    self.record.set_base_path(base);
                }
                None => warn!("{} names no base path", path.display()),
            },
            FileRead::NotFound => warn!("{} disappeared before migration", path.display()),
            FileRead::Invalid(message) => {
                return Err(InstallError::ConfigCorrupt { path, message });
            }
            FileRead::Error(message) => {
                return Err(anyhow::anyhow!("Failed to read {}: {}", path.display(), message).into())
            }
        }

        self.record.transition(InstallState::Installed)?;
        self.save_record()?;

        self.reload_mirrors();
        self.refresh_environment();
        Ok(())
    }
}
