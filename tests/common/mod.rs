//! Shared fixtures for integration tests.
//!
//! A `Harness` owns a temp directory laid out like a real machine: a
//! user-data directory, a resources directory with a requirements manifest,
//! and a `bin/` directory on the probe's search path holding a fake `git`.
//! Subprocesses go through a `ScriptedRunner` that imitates `uv` and Python.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use comfy_setup::channel::{connect, UiEvent, UiPort};
use comfy_setup::context::{AppContext, ToolchainConfig};
use comfy_setup::orchestrator::{Orchestrator, Outcome, StaticHardware};
use comfy_setup::record::Device;
use comfy_setup::shell::{Platform, ScriptedResponse, ScriptedRunner};
use comfy_setup::validation::LocalHost;
use tempfile::TempDir;

pub const REQUIREMENTS: &str = "PyYAML>=6.0\ntorch\nuv\n";

pub const INSTALLED_PACKAGES: &str = r#"[
  {"name": "PyYAML", "version": "6.0.2"},
  {"name": "torch", "version": "2.6.0"},
  {"name": "uv", "version": "0.6.0"}
]"#;

pub const IMPORTS_OK: &str = r#"{"success": true, "failed_imports": []}"#;

pub fn make_executable(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "#!/bin/sh\n").unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Create `.venv/bin/{python,uv}` under `base`.
pub fn make_venv(base: &Path) {
    make_executable(&base.join(".venv/bin/python"));
    make_executable(&base.join(".venv/bin/uv"));
}

pub struct Harness {
    pub temp: TempDir,
    pub ctx: AppContext,
    pub runner: Arc<ScriptedRunner>,
    pub probe: Arc<LocalHost>,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("data");
        let resources = temp.path().join("resources");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&resources).unwrap();
        fs::write(resources.join("requirements.txt"), REQUIREMENTS).unwrap();

        let bin = temp.path().join("bin");
        make_executable(&bin.join("git"));

        let ctx = AppContext::new(&data, &resources, ToolchainConfig::default())
            .with_platform(Platform::Linux);
        let probe = Arc::new(LocalHost::with_path(Platform::Linux, vec![bin]));

        Self {
            temp,
            ctx,
            runner: Arc::new(ScriptedRunner::new()),
            probe,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    /// `uv venv` creates the interpreter and `uv`; listings and imports
    /// report a complete environment.
    pub fn script_healthy_uv(&self) {
        self.script_venv_creation();
        self.runner.on(
            |c| c.args_start_with(&["pip", "list"]),
            |_| ScriptedResponse::ok(INSTALLED_PACKAGES),
        );
        self.runner.on(
            |c| c.program_name() == "python",
            |_| ScriptedResponse::ok(IMPORTS_OK),
        );
    }

    pub fn script_venv_creation(&self) {
        self.runner.on(
            |c| c.args_start_with(&["venv"]),
            |call| {
                let venv = PathBuf::from(call.args.last().unwrap());
                make_executable(&venv.join("bin/python"));
                make_executable(&venv.join("bin/uv"));
                ScriptedResponse::ok("Creating virtual environment at: .venv")
            },
        );
    }

    /// Imports fail until a requirements install has run.
    pub fn script_imports_fixed_by_reinstall(&self, failed: &[&str]) -> Arc<AtomicBool> {
        let reinstalled = Arc::new(AtomicBool::new(false));

        let flag = reinstalled.clone();
        self.runner.on(
            |c| c.args_start_with(&["pip", "install"]) && c.has_arg("-r"),
            move |_| {
                flag.store(true, Ordering::SeqCst);
                ScriptedResponse::ok("Installed 3 packages")
            },
        );
        self.runner.on(
            |c| c.args_start_with(&["pip", "list"]),
            |_| ScriptedResponse::ok(INSTALLED_PACKAGES),
        );

        let flag = reinstalled.clone();
        let payload = format!(
            r#"{{"success": false, "failed_imports": {}}}"#,
            serde_json::to_string(failed).unwrap()
        );
        self.runner.on(
            |c| c.program_name() == "python",
            move |_| {
                if flag.load(Ordering::SeqCst) {
                    ScriptedResponse::ok(IMPORTS_OK)
                } else {
                    ScriptedResponse::exit(1, &payload)
                }
            },
        );
        reinstalled
    }

    pub fn write_record(&self, json: &str) {
        fs::write(self.ctx.user_data_dir().join("config.json"), json).unwrap();
    }

    pub fn read_record(&self) -> serde_json::Value {
        let content = fs::read_to_string(self.ctx.user_data_dir().join("config.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// Run an orchestrator with a supported CPU machine, reacting to each
    /// event with `script`. Returns the outcome and every event seen.
    pub fn run<F>(&self, script: F) -> (comfy_setup::Result<Outcome>, Vec<UiEvent>)
    where
        F: FnMut(&UiPort, &UiEvent),
    {
        self.run_with_hardware(StaticHardware::Supported(Some(Device::Cpu)), script)
    }

    pub fn run_with_hardware<F>(
        &self,
        hardware: StaticHardware,
        mut script: F,
    ) -> (comfy_setup::Result<Outcome>, Vec<UiEvent>)
    where
        F: FnMut(&UiPort, &UiEvent),
    {
        let (port, ui) = connect();
        thread::scope(|s| {
            let worker = s.spawn(|| {
                Orchestrator::new(&self.ctx, port)
                    .with_runner(self.runner.clone())
                    .with_probe(self.probe.clone())
                    .with_hardware(Box::new(hardware))
                    .run()
            });

            let mut events = Vec::new();
            while let Some(event) = ui.recv_event() {
                script(&ui, &event);
                events.push(event);
            }
            (worker.join().unwrap(), events)
        })
    }
}

/// The last snapshot that finished a validation pass.
pub fn final_snapshot(events: &[UiEvent]) -> Option<&comfy_setup::validation::ValidationResult> {
    events.iter().rev().find_map(|e| match e {
        UiEvent::Validation(snapshot) if !snapshot.in_progress => Some(snapshot),
        _ => None,
    })
}

/// Ids of the repair tasks in an event, if it is a task list.
pub fn task_ids(event: &UiEvent) -> Option<Vec<String>> {
    match event {
        UiEvent::RepairTasks(tasks) => Some(tasks.iter().map(|t| t.id.clone()).collect()),
        _ => None,
    }
}
