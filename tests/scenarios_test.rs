//! End-to-end install, repair and upgrade flows driven through the channel.
#![cfg(unix)]

mod common;

use std::fs;

use common::{final_snapshot, make_venv, task_ids, Harness};
use comfy_setup::channel::{InstallOptions, RepairAction, UiEvent};
use comfy_setup::model_paths::{ModelPathConfig, DEFAULT_SECTION, MIGRATION_SECTION};
use comfy_setup::orchestrator::{AppSettings, Outcome, StaticHardware, MIGRATE_MODELS};
use comfy_setup::record::{Device, InstallState};
use comfy_setup::validation::CheckStatus;

#[test]
fn fresh_install_with_cpu_device() {
    let h = Harness::new();
    h.script_healthy_uv();
    let base = h.path("comfy");

    let (outcome, events) = h.run(|ui, event| {
        if let UiEvent::AwaitingInstallOptions(defaults) = event {
            assert_eq!(defaults.suggested_device, Some(Device::Cpu));
            ui.start_install(InstallOptions::new(&base, Some(Device::Cpu)))
                .unwrap();
        }
        if task_ids(event).is_some() {
            ui.abort().unwrap();
        }
    });

    let record = match outcome.unwrap() {
        Outcome::Ready(record) => record,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(record.state(), InstallState::Installed);
    assert_eq!(record.base_path(), Some(base.as_path()));
    assert_eq!(record.selected_device(), Some(Device::Cpu));
    assert!(record.installed_at().is_some());

    // Persisted
    let stored = h.read_record();
    assert_eq!(stored["installState"], "installed");
    assert_eq!(stored["selectedDevice"], "cpu");
    assert_eq!(stored["basePath"], base.display().to_string());

    // Layout, model paths and settings
    assert!(base.join("models/checkpoints").is_dir());
    assert!(base.join("user/default").is_dir());
    let config = ModelPathConfig::load(&h.ctx.model_config_file()).ok().unwrap();
    assert_eq!(
        config.section(DEFAULT_SECTION).unwrap().base_path.as_deref(),
        Some(base.as_path())
    );
    let settings = AppSettings::load(&AppSettings::path(&base)).ok().unwrap();
    assert_eq!(settings.auto_update, Some(true));

    // Output was streamed and the install announced
    assert!(events.iter().any(|e| matches!(e, UiEvent::Log(_))));
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::InstallComplete { base_path } if *base_path == base)));
    assert!(final_snapshot(&events).unwrap().is_valid());

    // CPU wheels come from the CPU index
    let torch_install = h
        .runner
        .calls()
        .into_iter()
        .find(|c| c.args_start_with(&["pip", "install"]) && c.has_arg("torch"))
        .unwrap();
    assert!(torch_install
        .arg_after("--index-url")
        .unwrap()
        .ends_with("/cpu"));
}

#[test]
fn fresh_install_records_migration_source() {
    let h = Harness::new();
    h.script_healthy_uv();
    let base = h.path("comfy");
    let legacy = h.path("legacy");
    fs::create_dir_all(legacy.join("models")).unwrap();

    let (outcome, _) = h.run(|ui, event| {
        if let UiEvent::AwaitingInstallOptions(_) = event {
            let mut options = InstallOptions::new(&base, Some(Device::Cpu));
            options.migration_source_path = Some(legacy.clone());
            options.migration_item_ids = vec![MIGRATE_MODELS.to_string()];
            ui.start_install(options).unwrap();
        }
    });

    assert!(matches!(outcome.unwrap(), Outcome::Ready(_)));
    let config = ModelPathConfig::load(&h.ctx.model_config_file()).ok().unwrap();
    assert_eq!(
        config.section(MIGRATION_SECTION).unwrap().base_path.as_deref(),
        Some(legacy.as_path())
    );
}

#[test]
fn interrupted_install_starts_over() {
    let h = Harness::new();
    h.script_healthy_uv();
    h.write_record(r#"{"installState": "started"}"#);
    let base = h.path("comfy");

    let mut prompted = 0;
    let (outcome, _) = h.run(|ui, event| {
        if let UiEvent::AwaitingInstallOptions(_) = event {
            prompted += 1;
            ui.start_install(InstallOptions::new(&base, None)).unwrap();
        }
    });

    assert_eq!(prompted, 1);
    assert!(matches!(outcome.unwrap(), Outcome::Ready(_)));
    assert_eq!(h.read_record()["installState"], "installed");
}

#[test]
fn unsupported_hardware_stops_before_wizard() {
    let h = Harness::new();

    let (outcome, events) = h.run_with_hardware(
        StaticHardware::Unsupported("Intel-based Macs are not supported".into()),
        |ui, event| {
            if let UiEvent::AwaitingInstallOptions(_) = event {
                ui.abort().unwrap();
            }
        },
    );

    match outcome.unwrap() {
        Outcome::UnsupportedHardware(message) => assert!(message.contains("Intel")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::UnsupportedHardware { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, UiEvent::AwaitingInstallOptions(_))));
    assert_eq!(h.read_record()["installState"], "started");
    assert!(h.runner.calls().is_empty());
}

#[test]
fn failed_environment_creation_leaves_install_started() {
    let h = Harness::new();
    h.runner.on(
        |c| c.args_start_with(&["venv"]),
        |_| comfy_setup::shell::ScriptedResponse::fail(1, "error: no Python 3.12 found"),
    );
    let base = h.path("comfy");

    let (outcome, events) = h.run(|ui, event| {
        if let UiEvent::AwaitingInstallOptions(_) = event {
            ui.start_install(InstallOptions::new(&base, Some(Device::Cpu)))
                .unwrap();
        }
    });

    assert!(outcome.is_err());
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::Log(line) if line.text().contains("no Python 3.12"))));
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::InstallFailed { .. })));
    assert_eq!(h.read_record()["installState"], "started");
}

#[test]
fn deleted_base_path_is_resolved_by_selecting_a_new_one() {
    let h = Harness::new();
    h.script_healthy_uv();
    let old_base = h.path("gone");
    let new_base = h.path("replacement");
    h.write_record(&format!(
        r#"{{"installState": "installed", "basePath": "{}", "selectedDevice": "cpu"}}"#,
        old_base.display()
    ));

    let mut task_lists = Vec::new();
    let (outcome, events) = h.run(|ui, event| {
        let Some(ids) = task_ids(event) else {
            return;
        };
        task_lists.push(ids.clone());
        if ids.iter().any(|id| id == "selectBasePath") {
            assert!(ui.select_base_path(&new_base).unwrap().wait().unwrap());
        } else if ids.iter().any(|id| id == "resetEnvironment") {
            assert!(ui
                .repair(RepairAction::ResetEnvironment)
                .unwrap()
                .wait()
                .unwrap());
        } else if ids.is_empty() {
            assert!(ui.complete_validation().unwrap().wait().unwrap());
        } else {
            ui.abort().unwrap();
        }
    });

    let record = match outcome.unwrap() {
        Outcome::Ready(record) => record,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(record.base_path(), Some(new_base.as_path()));
    assert_eq!(task_lists[0], vec!["selectBasePath"]);
    assert_eq!(task_lists[1], vec!["resetEnvironment"]);
    assert!(task_lists.last().unwrap().is_empty());

    // The first pass skipped everything behind the base path.
    let first = events
        .iter()
        .find_map(|e| match e {
            UiEvent::Validation(s) if !s.in_progress => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(first.base_path, Some(CheckStatus::Error));
    assert_eq!(first.venv_directory, Some(CheckStatus::Skipped));
    assert_eq!(first.python_packages, Some(CheckStatus::Skipped));

    assert_eq!(
        h.read_record()["basePath"],
        new_base.display().to_string()
    );
    let config = ModelPathConfig::load(&h.ctx.model_config_file()).ok().unwrap();
    assert_eq!(
        config.section(DEFAULT_SECTION).unwrap().base_path.as_deref(),
        Some(new_base.as_path())
    );
    assert!(make_venv_exists(&new_base));
    assert!(new_base.join("models/checkpoints").is_dir());
    assert!(new_base.join("user/default").is_dir());
    assert!(new_base.join("custom_nodes").is_dir());
}

fn make_venv_exists(base: &std::path::Path) -> bool {
    base.join(".venv/bin/python").is_file() && base.join(".venv/bin/uv").is_file()
}

#[test]
fn missing_imports_are_fixed_by_reinstall() {
    let h = Harness::new();
    let base = h.path("comfy");
    fs::create_dir_all(&base).unwrap();
    make_venv(&base);
    h.write_record(&format!(
        r#"{{"installState": "installed", "basePath": "{}", "selectedDevice": "cpu"}}"#,
        base.display()
    ));
    let reinstalled = h.script_imports_fixed_by_reinstall(&["yaml", "torch", "uv"]);

    let mut first_snapshot = None;
    let (outcome, events) = h.run(|ui, event| {
        if let UiEvent::Validation(snapshot) = event {
            if !snapshot.in_progress && first_snapshot.is_none() {
                first_snapshot = Some(snapshot.clone());
            }
        }
        let Some(ids) = task_ids(event) else {
            return;
        };
        if ids.is_empty() {
            assert!(ui.complete_validation().unwrap().wait().unwrap());
        } else if ids.first().map(String::as_str) == Some("reinstallRequirements") {
            assert!(ui
                .repair(RepairAction::ReinstallRequirements)
                .unwrap()
                .wait()
                .unwrap());
        } else {
            ui.abort().unwrap();
        }
    });

    let first = first_snapshot.unwrap();
    assert_eq!(first.python_packages, Some(CheckStatus::Error));
    assert_eq!(first.missing_imports, vec!["yaml", "torch", "uv"]);
    assert!(reinstalled.load(std::sync::atomic::Ordering::SeqCst));

    assert!(matches!(outcome.unwrap(), Outcome::Ready(_)));
    let last = final_snapshot(&events).unwrap();
    assert_eq!(last.python_packages, Some(CheckStatus::Ok));
    assert!(last.missing_imports.is_empty());
}

#[test]
fn completion_is_refused_while_issues_remain() {
    let h = Harness::new();
    let base = h.path("comfy");
    fs::create_dir_all(&base).unwrap();
    make_venv(&base);
    h.write_record(&format!(
        r#"{{"installState": "installed", "basePath": "{}"}}"#,
        base.display()
    ));
    h.script_imports_fixed_by_reinstall(&["torch"]);

    let mut refused = false;
    let (outcome, _) = h.run(|ui, event| {
        if task_ids(event).is_some() {
            if refused {
                ui.abort().unwrap();
            } else {
                refused = !ui.complete_validation().unwrap().wait().unwrap();
            }
        }
    });

    assert!(refused);
    match outcome.unwrap() {
        Outcome::Aborted(snapshot) => {
            assert!(!snapshot.is_valid());
            assert_eq!(snapshot.missing_imports, vec!["torch"]);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn ui_hanging_up_aborts_resolution() {
    let h = Harness::new();
    h.write_record(&format!(
        r#"{{"installState": "installed", "basePath": "{}"}}"#,
        h.path("missing").display()
    ));

    let (port, ui) = comfy_setup::channel::connect();
    drop(ui);
    let outcome = comfy_setup::orchestrator::Orchestrator::new(&h.ctx, port)
        .with_runner(h.runner.clone())
        .with_probe(h.probe.clone())
        .run()
        .unwrap();

    assert!(matches!(outcome, Outcome::Aborted(_)));
}

#[test]
fn legacy_install_is_migrated() {
    let h = Harness::new();
    h.script_healthy_uv();
    let legacy_base = h.path("legacy");
    fs::create_dir_all(&legacy_base).unwrap();
    make_venv(&legacy_base);
    fs::write(
        h.ctx.model_config_file(),
        format!(
            "comfyui:\n  base_path: {}\n  checkpoints: models/checkpoints/\n",
            legacy_base.display()
        ),
    )
    .unwrap();

    let (outcome, events) = h.run(|ui, event| {
        if matches!(event, UiEvent::AwaitingInstallOptions(_)) || task_ids(event).is_some() {
            ui.abort().unwrap();
        }
    });

    let record = match outcome.unwrap() {
        Outcome::Ready(record) => record,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(record.state(), InstallState::Installed);
    assert_eq!(record.base_path(), Some(legacy_base.as_path()));

    let first = events
        .iter()
        .find_map(|e| match e {
            UiEvent::Validation(s) if !s.in_progress => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(first.install_state, InstallState::Upgraded);

    let config = ModelPathConfig::load(&h.ctx.model_config_file()).ok().unwrap();
    let section = config.section(DEFAULT_SECTION).unwrap();
    assert_eq!(section.base_path.as_deref(), Some(legacy_base.as_path()));
    assert_eq!(section.is_default, Some(true));
    assert!(config.section("comfyui").is_some());
}

#[test]
fn corrupt_record_is_reported() {
    let h = Harness::new();
    h.write_record("{ not json");

    let (outcome, events) = h.run(|ui, _| {
        let _ = ui.abort();
    });

    match outcome.unwrap() {
        Outcome::ConfigCorrupt(path) => assert!(path.ends_with("config.json")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(matches!(
        events.as_slice(),
        [UiEvent::ConfigCorrupt { .. }]
    ));
}
