//! Import verification.
//!
//! A package can be listed as installed and still fail to import (partial
//! downloads, ABI mismatches, a broken wheel). Verification runs one Python
//! process that tries every requested import and prints a single JSON
//! payload, so interpreter start-up is paid once and there is exactly one
//! thing to parse.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::shell::OutputLine;

use super::VirtualEnvironment;

/// Outcome of a successful verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportVerificationResult {
    pub success: bool,
    /// Modules that failed to import, in request order. Empty on success.
    pub missing_imports: Vec<String>,
}

impl ImportVerificationResult {
    fn all_imported() -> Self {
        Self {
            success: true,
            missing_imports: Vec::new(),
        }
    }
}

/// How the verifier's output was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportCheck {
    /// The payload was well-formed.
    Verified(ImportVerificationResult),
    /// Stdout did not contain JSON.
    ParseError {
        raw_output: String,
        exit_code: Option<i32>,
    },
    /// Stdout was JSON but not the expected payload.
    InvalidFormat { message: String },
}

impl ImportCheck {
    /// Description of a parse or format failure.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Verified(_) => None,
            Self::ParseError {
                raw_output,
                exit_code,
            } => Some(format!(
                "Failed to parse import verification output (exit code {}): {}",
                exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                raw_output.trim()
            )),
            Self::InvalidFormat { message } => Some(format!(
                "Import verification output has an invalid format: {}",
                message
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImportPayload {
    success: bool,
    failed_imports: Vec<String>,
}

/// Build the Python script that checks `imports`.
///
/// Module names are embedded as a JSON array, which is also a valid Python
/// list literal.
pub fn build_script(imports: &[String]) -> String {
    let modules = serde_json::to_string(imports).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"import importlib
import json
import sys

failed = []
for name in {modules}:
    try:
        importlib.import_module(name)
    except Exception:
        failed.append(name)

print(json.dumps({{"success": not failed, "failed_imports": failed}}))
sys.exit(1 if failed else 0)
"#
    )
}

/// Interpret the verifier's stdout and exit code.
///
/// Imported packages may print to stdout, so only the last non-empty line is
/// treated as the payload.
pub fn interpret_output(stdout: &str, exit_code: Option<i32>) -> ImportCheck {
    let Some(payload_line) = stdout.lines().rev().find(|l| !l.trim().is_empty()) else {
        return ImportCheck::ParseError {
            raw_output: stdout.to_string(),
            exit_code,
        };
    };

    let value: serde_json::Value = match serde_json::from_str(payload_line.trim()) {
        Ok(value) => value,
        Err(_) => {
            return ImportCheck::ParseError {
                raw_output: stdout.to_string(),
                exit_code,
            }
        }
    };

    match serde_json::from_value::<ImportPayload>(value) {
        Ok(payload) if payload.success => {
            ImportCheck::Verified(ImportVerificationResult::all_imported())
        }
        Ok(payload) => ImportCheck::Verified(ImportVerificationResult {
            success: false,
            missing_imports: payload.failed_imports,
        }),
        Err(e) => ImportCheck::InvalidFormat {
            message: e.to_string(),
        },
    }
}

/// Check that every module in `imports` can be imported in `env`.
///
/// An empty list succeeds without starting Python. A non-zero exit code is
/// expected when imports fail and is not an error by itself.
pub fn verify_imports(
    env: &VirtualEnvironment,
    imports: &[String],
    on_output: &mut dyn FnMut(OutputLine),
) -> Result<ImportCheck> {
    if imports.is_empty() {
        return Ok(ImportCheck::Verified(
            ImportVerificationResult::all_imported(),
        ));
    }

    debug!("Verifying imports: {}", imports.join(", "));
    let args = vec!["-c".to_string(), build_script(imports)];
    let result = env.run_python(&args, on_output)?;

    let check = interpret_output(&result.stdout, result.exit_code);
    match &check {
        ImportCheck::Verified(r) if !r.success => {
            warn!("Failed imports: {}", r.missing_imports.join(", "));
        }
        ImportCheck::Verified(_) => {}
        other => {
            if let Some(message) = other.error_message() {
                warn!("{}", message);
            }
        }
    }
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AppContext, ToolchainConfig};
    use crate::environment::MirrorSettings;
    use crate::shell::{ScriptedResponse, ScriptedRunner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn env_with(runner: Arc<ScriptedRunner>) -> (TempDir, VirtualEnvironment) {
        let temp = TempDir::new().unwrap();
        let ctx = AppContext::new(
            &temp.path().join("data"),
            &temp.path().join("resources"),
            ToolchainConfig::default(),
        );
        let env = VirtualEnvironment::new(
            &ctx,
            &temp.path().join("comfy"),
            None,
            &MirrorSettings::default(),
            runner,
        );
        (temp, env)
    }

    fn modules(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_import_list_succeeds_without_python() {
        let runner = Arc::new(ScriptedRunner::new());
        let (_temp, env) = env_with(runner.clone());

        let check = verify_imports(&env, &[], &mut |_| {}).unwrap();

        assert_eq!(
            check,
            ImportCheck::Verified(ImportVerificationResult {
                success: true,
                missing_imports: vec![]
            })
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn failing_imports_run_one_interpreter() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(
            |c| c.program_name() == "python",
            |_| {
                ScriptedResponse::exit(
                    1,
                    r#"{"success": false, "failed_imports": ["yaml", "sqlalchemy"]}"#,
                )
            },
        );
        let (_temp, env) = env_with(runner.clone());
        let mut lines = Vec::new();

        let check = verify_imports(
            &env,
            &modules(&["yaml", "numpy", "sqlalchemy"]),
            &mut |line| lines.push(line),
        )
        .unwrap();

        assert_eq!(
            check,
            ImportCheck::Verified(ImportVerificationResult {
                success: false,
                missing_imports: vec!["yaml".into(), "sqlalchemy".into()],
            })
        );
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, env.python_path());
        assert_eq!(calls[0].args[0], "-c");
        assert!(calls[0].args[1].contains(r#"["yaml","numpy","sqlalchemy"]"#));
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on(|_| true, |_| ScriptedResponse::SpawnFailure);
        let (_temp, env) = env_with(runner);

        let err = verify_imports(&env, &modules(&["yaml"]), &mut |_| {}).unwrap_err();
        assert!(matches!(err, crate::InstallError::Spawn { .. }));
    }

    #[test]
    fn script_embeds_module_list() {
        let script = build_script(&["yaml".to_string(), "PIL".to_string()]);
        assert!(script.contains(r#"for name in ["yaml","PIL"]:"#));
        assert!(script.contains("sys.exit(1 if failed else 0)"));
        assert!(script.contains(r#"{"success": not failed, "failed_imports": failed}"#));
    }

    #[test]
    fn success_payload() {
        let check = interpret_output(r#"{"success": true, "failed_imports": []}"#, Some(0));
        assert_eq!(
            check,
            ImportCheck::Verified(ImportVerificationResult {
                success: true,
                missing_imports: vec![]
            })
        );
        assert!(check.error_message().is_none());
    }

    #[test]
    fn failure_payload_lists_modules_in_order() {
        let stdout = r#"{"success": false, "failed_imports": ["yaml", "torch", "uv"]}"#;
        match interpret_output(stdout, Some(1)) {
            ImportCheck::Verified(result) => {
                assert!(!result.success);
                assert_eq!(result.missing_imports, vec!["yaml", "torch", "uv"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn noise_before_payload_is_ignored() {
        let stdout = "Warning: something noisy\n{\"success\": true, \"failed_imports\": []}\n\n";
        assert!(matches!(
            interpret_output(stdout, Some(0)),
            ImportCheck::Verified(ImportVerificationResult { success: true, .. })
        ));
    }

    #[test]
    fn missing_success_field_is_invalid_format() {
        let check = interpret_output(r#"{"failed_imports": []}"#, Some(0));
        match &check {
            ImportCheck::InvalidFormat { message } => assert!(message.contains("success")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(check.error_message().unwrap().contains("invalid format"));
    }

    #[test]
    fn wrong_field_type_is_invalid_format() {
        let check = interpret_output(r#"{"success": "yes", "failed_imports": []}"#, Some(0));
        assert!(matches!(check, ImportCheck::InvalidFormat { .. }));
    }

    #[test]
    fn non_json_output_reports_raw_output_and_exit_code() {
        let check = interpret_output("Traceback: interpreter exploded", Some(134));
        assert!(matches!(check, ImportCheck::ParseError { .. }));

        let message = check.error_message().unwrap();
        assert!(message.contains("Traceback: interpreter exploded"));
        assert!(message.contains("134"));
    }

    #[test]
    fn empty_output_is_parse_error() {
        let check = interpret_output("", None);
        assert!(check.error_message().unwrap().contains("exit code none"));
    }
}
