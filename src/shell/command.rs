//! Subprocess execution with live output.
//!
//! Every subprocess this crate starts goes through a [`CommandRunner`]. The
//! production runner reads stdout and stderr on separate threads and hands
//! each line to the caller as it arrives; nothing is buffered until exit.

use crate::error::{InstallError, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of executing a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Collected standard output.
    pub stdout: String,

    /// Collected standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,
}

impl CommandResult {
    /// Build a result from an exit code.
    pub fn from_exit(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
            success: exit_code == Some(0),
        }
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with system env).
    pub env: HashMap<String, String>,
}

/// Output line from command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    /// The line text without the stream tag.
    pub fn text(&self) -> &str {
        match self {
            Self::Stdout(line) | Self::Stderr(line) => line,
        }
    }

    pub fn is_stderr(&self) -> bool {
        matches!(self, Self::Stderr(_))
    }
}

/// Render a program and its arguments for log messages.
pub fn display_command(program: &Path, args: &[String]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Starts subprocesses.
///
/// Implementations must forward every output line through `on_line` before
/// returning, and must report a process that could not be started as
/// [`InstallError::Spawn`] rather than as a failed [`CommandResult`].
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        options: &CommandOptions,
        on_line: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult>;
}

/// Runs commands as real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        program: &Path,
        args: &[String],
        options: &CommandOptions,
        on_line: &mut dyn FnMut(OutputLine),
    ) -> Result<CommandResult> {
        execute_streaming(program, args, options, on_line)
    }
}

/// Execute a program with streaming output.
pub fn execute_streaming(
    program: &Path,
    args: &[String],
    options: &CommandOptions,
    on_line: &mut dyn FnMut(OutputLine),
) -> Result<CommandResult> {
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| InstallError::Spawn {
        program: program.display().to_string(),
        source,
    })?;

    let (tx, rx) = mpsc::channel();

    // Spawn threads to read stdout and stderr
    let stdout_handle = child.stdout.take().map(|stdout| {
        let tx = tx.clone();
        thread::spawn(move || forward_lines(stdout, tx, OutputLine::Stdout))
    });
    let stderr_handle = child
        .stderr
        .take()
        .map(|stderr| thread::spawn(move || forward_lines(stderr, tx, OutputLine::Stderr)));

    // Process output through callback
    for line in rx {
        on_line(line);
    }

    let stdout_output = stdout_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr_output = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    let status = child.wait()?;

    Ok(CommandResult::from_exit(
        status.code(),
        stdout_output,
        stderr_output,
        start.elapsed(),
    ))
}

fn forward_lines<R: Read>(
    stream: R,
    tx: mpsc::Sender<OutputLine>,
    tag: fn(String) -> OutputLine,
) -> String {
    let mut reader = BufReader::new(stream);
    let mut output = String::new();
    let mut buf = Vec::new();
    // Invalid UTF-8 is replaced, not treated as end of stream.
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        output.push_str(&line);
        output.push('\n');
        let _ = tx.send(tag(line));
    }
    output
}
