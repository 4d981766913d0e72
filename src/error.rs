//! Error types for installation and validation.
//!
//! This module defines [`InstallError`], the error type used throughout the
//! crate, and a [`Result`] alias.
//!
//! # Error Handling Strategy
//!
//! - The first five variants are the installation taxonomy: they describe
//!   what is wrong with a machine, and validation issues map onto them
//! - Spawn failures are distinct from non-zero exit codes; the latter are
//!   returned in a [`CommandResult`](crate::shell::CommandResult) and left to
//!   the caller to interpret
//! - Use `anyhow::Error` (via `InstallError::Other`) for unexpected errors

use std::path::PathBuf;
use thiserror::Error;

use crate::record::InstallState;

/// Core error type for installation operations.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The base path is missing, not a directory, or unreadable.
    #[error("Base path is not accessible: {message}")]
    InaccessiblePath { message: String },

    /// An interpreter, package manager or support tool is not executable.
    #[error("Missing runtime '{tool}': {message}")]
    MissingRuntime { tool: String, message: String },

    /// Import verification reported modules that cannot be imported.
    #[error("Python environment is incomplete, missing imports: {}", missing.join(", "))]
    IncompleteEnvironment { missing: Vec<String> },

    /// A persisted document exists but cannot be parsed.
    #[error("Config file at {path} is corrupt: {message}")]
    ConfigCorrupt { path: PathBuf, message: String },

    /// The hardware compatibility probe failed.
    #[error("Hardware not supported: {message}")]
    HardwareUnsupported { message: String },

    /// A subprocess could not be started at all.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A subprocess ran but exited unsuccessfully where success was required.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// A subprocess produced output that could not be understood.
    #[error("Unexpected output from '{command}': {message}")]
    InvalidOutput { command: String, message: String },

    /// The installation record refused a backwards state change.
    #[error("Invalid install state transition: {from} -> {to}")]
    InvalidTransition { from: InstallState, to: InstallState },

    /// Failed to serialize a document before writing it.
    #[error("Failed to serialize {what}: {message}")]
    Serialization { what: String, message: String },

    /// The UI side of the event channel went away.
    #[error("UI channel closed")]
    ChannelClosed,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for installation operations.
pub type Result<T> = std::result::Result<T, InstallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inaccessible_path_displays_message() {
        let err = InstallError::InaccessiblePath {
            message: "/data/comfy does not exist".into(),
        };
        assert!(err.to_string().contains("/data/comfy"));
    }

    #[test]
    fn missing_runtime_displays_tool_and_message() {
        let err = InstallError::MissingRuntime {
            tool: "git".into(),
            message: "Not found on PATH".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("git"));
        assert!(msg.contains("Not found on PATH"));
    }

    #[test]
    fn incomplete_environment_lists_modules() {
        let err = InstallError::IncompleteEnvironment {
            missing: vec!["yaml".into(), "torch".into()],
        };
        assert!(err.to_string().contains("yaml, torch"));
    }

    #[test]
    fn config_corrupt_displays_path() {
        let err = InstallError::ConfigCorrupt {
            path: PathBuf::from("/home/user/.config/ComfyUI/config.json"),
            message: "expected value at line 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("config.json"));
        assert!(msg.contains("expected value"));
    }

    #[test]
    fn spawn_error_keeps_source() {
        let err = InstallError::Spawn {
            program: "uv".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("uv"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn command_failed_displays_command_and_code() {
        let err = InstallError::CommandFailed {
            command: "uv pip install -r requirements.txt".into(),
            code: Some(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("uv pip install"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn invalid_transition_displays_states() {
        let err = InstallError::InvalidTransition {
            from: InstallState::Installed,
            to: InstallState::Started,
        };
        assert_eq!(
            err.to_string(),
            "Invalid install state transition: installed -> started"
        );
    }

    #[test]
    fn io_error_converts_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: InstallError = io_err.into();
        assert!(matches!(err, InstallError::Io(_)));
    }
}
