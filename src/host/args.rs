//! Launch flags for the host binary.

use clap::Parser;
use std::path::PathBuf;

use crate::context::AppContext;
use crate::record::Device;

/// Prepare and validate the ComfyUI Python environment.
#[derive(Debug, Parser)]
#[command(name = "comfy-setup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding config.json and extra_models_config.yaml
    #[arg(long, env = "COMFY_SETUP_USER_DATA")]
    pub user_data_dir: Option<PathBuf>,

    /// Directory holding the bundled uv and requirements.txt
    #[arg(long, env = "COMFY_SETUP_RESOURCES")]
    pub resources_dir: Option<PathBuf>,

    /// Base path to install into (skips the prompt)
    #[arg(long)]
    pub base_path: Option<PathBuf>,

    /// Compute device: cpu, cuda, rocm or mps
    #[arg(long)]
    pub device: Option<Device>,

    /// Never prompt; abort when a repair needs a decision
    #[arg(long)]
    pub non_interactive: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn user_data_dir(&self) -> PathBuf {
        self.user_data_dir
            .clone()
            .unwrap_or_else(AppContext::default_user_data_dir)
    }

    /// Resources directory, defaulting to `resources/` next to the executable.
    pub fn resources_dir(&self) -> PathBuf {
        self.resources_dir.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
                .unwrap_or_else(|| PathBuf::from("resources"))
        })
    }
}
