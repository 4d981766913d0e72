//! Scripted command runner for testing.
//!
//! `ScriptedRunner` implements [`CommandRunner`] without starting any
//! process. Rules are matched in registration order; the first matching rule
//! produces the response. Every invocation is recorded for later assertion.
//!
//! # Example
//!
//! ```
//! use comfy_setup::shell::{CommandOptions, CommandRunner, ScriptedResponse, ScriptedRunner};
//! use std::path::Path;
//!
//! let runner = ScriptedRunner::new();
//! runner.on(
//!     |call| call.args_start_with(&["cache", "clean"]),
//!     |_| ScriptedResponse::ok("Cleared 12 files"),
//! );
//!
//! let args = vec!["cache".to_string(), "clean".to_string()];
//! let mut lines = Vec::new();
//! let result = runner
//!     .run(Path::new("uv"), &args, &CommandOptions::default(), &mut |l| lines.push(l))
//!     .unwrap();
//!
//! assert!(result.success);
//! assert_eq!(lines.len(), 1);
//! assert_eq!(runner.calls().len(), 1);
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{InstallError, Result};

use super::command::{CommandOptions, CommandResult, CommandRunner, OutputLine};

/// A recorded call to [`ScriptedRunner::run`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Invocation {
    /// File stem of the program (`uv`, `python`, ...).
    pub fn program_name(&self) -> String {
        self.program
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    pub fn args_start_with(&self, prefix: &[&str]) -> bool {
        self.args.len() >= prefix.len() && self.args.iter().zip(prefix).all(|(a, p)| a == p)
    }

    /// Value following `flag` in the argument list.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// What a scripted command does.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// The process ran and exited with `code`.
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    /// The program could not be started.
    SpawnFailure,
}

impl ScriptedResponse {
    /// Exit 0 with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self::exit(0, stdout)
    }

    /// Exit with `code` and the given stdout.
    pub fn exit(code: i32, stdout: &str) -> Self {
        Self::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    /// Exit with `code` and the given stderr.
    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

type Matcher = Box<dyn Fn(&Invocation) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&Invocation) -> ScriptedResponse + Send + Sync>;

struct Rule {
    matches: Matcher,
    respond: Responder,
}

/// Command runner driven by registered rules.
///
/// Calls that match no rule exit 0 with no output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Earlier rules win.
    pub fn on<M, R>(&self, matches: M, respond: R) -> &Self
    where
        M: Fn(&Invocation) -> bool + Send + Sync + 'static,
        R: Fn(&Invocation) -> ScriptedResponse + Send + Sync + 'static,
    {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Rule {
                matches: Box::new(matches),
                respond: Box::new(respond),
            });
        self
    }

    /// All invocations so far, oldest first.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of recorded invocations matching `predicate`.
    pub fn count_calls<P: Fn(&Invocation) -> bool>(&self, predicate: P) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|call| predicate(call))
            .count()
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        options: &CommandOptions,
        on_line: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult> {
        let call = Invocation {
            program: program.to_path_buf(),
            args: args.to_vec(),
            env: options.env.clone(),
        };
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.clone());

        let response = {
            let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            rules
                .iter()
                .find(|rule| (rule.matches)(&call))
                .map(|rule| (rule.respond)(&call))
        }
        .unwrap_or_else(|| ScriptedResponse::ok(""));

        match response {
            ScriptedResponse::SpawnFailure => Err(InstallError::Spawn {
                program: program.display().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            ScriptedResponse::Exit {
                code,
                stdout,
                stderr,
            } => {
                for line in stdout.lines() {
                    on_line(OutputLine::Stdout(line.to_string()));
                }
                for line in stderr.lines() {
                    on_line(OutputLine::Stderr(line.to_string()));
                }
                Ok(CommandResult::from_exit(
                    Some(code),
                    stdout,
                    stderr,
                    Duration::ZERO,
                ))
            }
        }
    }
}
