//! Terminal front end for the orchestrator channel.

use console::{style, Style, Term};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use crate::channel::{
    InstallDefaults, InstallOptions, Pending, RepairTask, TaskKind, UiEvent, UiPort,
};
use crate::error::{InstallError, Result};
use crate::record::Device;
use crate::shell::OutputLine;
use crate::validation::{CheckField, CheckStatus, ValidationResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const DEVICES: [Device; 4] = [Device::Cuda, Device::Rocm, Device::Mps, Device::Cpu];

fn map_dialoguer_err(e: dialoguer::Error) -> InstallError {
    InstallError::Io(e.into())
}

fn prompt_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("".to_string()),
        ..ColorfulTheme::default()
    }
}

/// Answers given on the command line instead of at a prompt.
#[derive(Debug, Clone, Default)]
pub struct Presets {
    pub base_path: Option<PathBuf>,
    pub device: Option<Device>,
}

/// Drives a [`UiPort`] from a terminal.
pub struct TerminalHost {
    term: Term,
    interactive: bool,
    presets: Presets,
    spinner: Option<ProgressBar>,
    backlog: VecDeque<UiEvent>,
    success: Style,
    error: Style,
    dim: Style,
}

impl TerminalHost {
    pub fn new(interactive: bool, presets: Presets) -> Self {
        let term = Term::stderr();
        Self {
            interactive: interactive && term.is_term(),
            term,
            presets,
            spinner: None,
            backlog: VecDeque::new(),
            success: Style::new().green(),
            error: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Handle events until the orchestrator hangs up.
    pub fn drive(&mut self, port: &UiPort) -> Result<()> {
        loop {
            let event = match self.backlog.pop_front() {
                Some(event) => event,
                None => match port.recv_event() {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event, port)?;
        }
        self.stop_spinner();
        Ok(())
    }

    fn handle(&mut self, event: UiEvent, port: &UiPort) -> Result<()> {
        match event {
            UiEvent::Validation(snapshot) if snapshot.in_progress => {
                self.progress(&format!("Validating environment ({})", progress_label(&snapshot)));
            }
            UiEvent::Validation(snapshot) => {
                self.stop_spinner();
                self.print_summary(&snapshot);
            }
            UiEvent::Log(line) => self.print_log(&line),
            UiEvent::AwaitingInstallOptions(defaults) => {
                self.stop_spinner();
                let options = self.install_options(&defaults)?;
                port.start_install(options)?;
                self.progress("Installing");
            }
            UiEvent::RepairTasks(tasks) => {
                self.stop_spinner();
                self.resolve(&tasks, port)?;
            }
            UiEvent::UnsupportedHardware { message } => {
                self.stop_spinner();
                self.line(&format!(
                    "{} {}",
                    self.error.apply_to("✗ Unsupported hardware:"),
                    message
                ));
            }
            UiEvent::ConfigCorrupt { path, message } => {
                self.stop_spinner();
                self.line(&format!(
                    "{} {}\n  {}",
                    self.error.apply_to("✗ Config file is corrupt:"),
                    path.display(),
                    self.dim.apply_to(message)
                ));
            }
            UiEvent::InstallComplete { base_path } => {
                self.stop_spinner();
                self.line(&format!(
                    "{} {}",
                    self.success.apply_to("✓ Installed to"),
                    base_path.display()
                ));
            }
            UiEvent::InstallFailed { message } => {
                self.stop_spinner();
                self.line(&format!(
                    "{} {}",
                    self.error.apply_to("✗ Install failed:"),
                    message
                ));
            }
        }
        Ok(())
    }

    fn install_options(&self, defaults: &InstallDefaults) -> Result<InstallOptions> {
        let base_path = match (&self.presets.base_path, self.interactive) {
            (Some(path), _) => path.clone(),
            (None, false) => defaults.default_base_path.clone(),
            (None, true) => {
                let answer: String = Input::with_theme(&prompt_theme())
                    .with_prompt("Install ComfyUI to")
                    .default(defaults.default_base_path.display().to_string())
                    .interact_on(&self.term)
                    .map_err(map_dialoguer_err)?;
                PathBuf::from(answer)
            }
        };

        let device = match (self.presets.device, self.interactive) {
            (Some(device), _) => Some(device),
            (None, false) => defaults.suggested_device,
            (None, true) => {
                let labels: Vec<String> = DEVICES.iter().map(|d| d.to_string()).collect();
                let default = defaults
                    .suggested_device
                    .and_then(|s| DEVICES.iter().position(|d| *d == s))
                    .unwrap_or(DEVICES.len() - 1);
                let index = Select::with_theme(&prompt_theme())
                    .with_prompt("Compute device")
                    .items(&labels)
                    .default(default)
                    .interact_on(&self.term)
                    .map_err(map_dialoguer_err)?;
                Some(DEVICES[index])
            }
        };

        Ok(InstallOptions::new(base_path, device))
    }

    fn resolve(&mut self, tasks: &[RepairTask], port: &UiPort) -> Result<()> {
        if tasks.is_empty() {
            let pending = port.complete_validation()?;
            if !self.wait_reply(pending, port)? {
                port.revalidate()?;
            }
            return Ok(());
        }

        if !self.interactive {
            for task in tasks {
                self.line(&format!(
                    "{} {}: {}",
                    self.error.apply_to("✗"),
                    task.title,
                    self.dim.apply_to(&task.description)
                ));
            }
            self.line("Repairs need a decision; rerun without --non-interactive.");
            return port.abort();
        }

        let mut labels: Vec<String> = tasks.iter().map(|t| t.title.clone()).collect();
        labels.push("Check again".to_string());
        labels.push("Quit".to_string());

        let index = Select::with_theme(&prompt_theme())
            .with_prompt("Fix an issue")
            .items(&labels)
            .default(0)
            .interact_on(&self.term)
            .map_err(map_dialoguer_err)?;

        let Some(task) = tasks.get(index) else {
            return if index == tasks.len() {
                port.revalidate()
            } else {
                port.abort()
            };
        };

        match task.kind {
            TaskKind::SelectBasePath => {
                let answer: String = Input::with_theme(&prompt_theme())
                    .with_prompt("New installation folder")
                    .interact_on(&self.term)
                    .map_err(map_dialoguer_err)?;
                let pending = port.select_base_path(answer)?;
                let ok = self.wait_reply(pending, port)?;
                self.report(ok, &task.title);
            }
            TaskKind::Repair(action) => {
                self.progress(&task.title);
                let pending = port.repair(action)?;
                let ok = self.wait_reply(pending, port)?;
                self.stop_spinner();
                self.report(ok, &task.title);
            }
            TaskKind::Manual => {
                self.line(&format!("{}", self.dim.apply_to(&task.description)));
                Confirm::with_theme(&prompt_theme())
                    .with_prompt("Fix this outside the installer, then press enter to check again")
                    .default(true)
                    .show_default(false)
                    .interact_on(&self.term)
                    .map_err(map_dialoguer_err)?;
                port.revalidate()?;
            }
        }
        Ok(())
    }

    /// Wait for a reply while still printing live output. Other events are
    /// kept for the main loop.
    fn wait_reply(&mut self, pending: Pending<bool>, port: &UiPort) -> Result<bool> {
        loop {
            if let Some(reply) = pending.try_wait()? {
                return Ok(reply);
            }
            match port.recv_event_timeout(POLL_INTERVAL) {
                Some(UiEvent::Log(line)) => self.print_log(&line),
                Some(other) => self.backlog.push_back(other),
                None => {}
            }
        }
    }

    fn report(&self, ok: bool, title: &str) {
        if ok {
            self.line(&format!("{} {}", self.success.apply_to("✓"), title));
        } else {
            self.line(&format!("{} {}", self.error.apply_to("✗"), title));
        }
    }

    fn print_summary(&self, snapshot: &ValidationResult) {
        self.line(&format!(
            "\n{} ({})",
            style("Environment").bold(),
            snapshot.install_state
        ));
        for field in CheckField::ALL {
            let Some(status) = snapshot.get(field) else {
                continue;
            };
            let icon = match status {
                CheckStatus::Ok => self.success.apply_to("✓").to_string(),
                CheckStatus::Error => self.error.apply_to("✗").to_string(),
                CheckStatus::Skipped => self.dim.apply_to("○").to_string(),
            };
            match snapshot.message(field) {
                Some(message) => self.line(&format!(
                    "  {} {} {}",
                    icon,
                    field.label(),
                    self.dim.apply_to(message)
                )),
                None => self.line(&format!("  {} {}", icon, field.label())),
            }
        }
    }

    fn print_log(&self, line: &OutputLine) {
        let text = if line.is_stderr() {
            self.error.apply_to(line.text()).to_string()
        } else {
            self.dim.apply_to(line.text()).to_string()
        };
        match &self.spinner {
            Some(bar) => bar.println(format!("  {}", text)),
            None => self.line(&format!("  {}", text)),
        }
    }

    fn progress(&mut self, message: &str) {
        if let Some(bar) = &self.spinner {
            bar.set_message(message.to_string());
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.magenta} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(bar);
    }

    fn stop_spinner(&mut self) {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }
}

/// Completed steps out of the seven checks, for the spinner.
fn progress_label(snapshot: &ValidationResult) -> String {
    let done = CheckField::ALL
        .iter()
        .filter(|f| snapshot.get(**f).is_some())
        .count();
    format!("{}/{}", done, CheckField::ALL.len())
}
