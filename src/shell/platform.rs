//! Platform detection and executable lookup.

use std::path::{Path, PathBuf};

/// Operating systems with distinct environment layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Directory inside a virtual environment that holds its executables.
    pub fn venv_bin_dir(&self) -> &'static str {
        match self {
            Platform::Windows => "Scripts",
            Platform::MacOs | Platform::Linux => "bin",
        }
    }

    /// File name of an executable with the given stem.
    pub fn executable_name(&self, stem: &str) -> String {
        match self {
            Platform::Windows => format!("{}.exe", stem),
            Platform::MacOs | Platform::Linux => stem.to_string(),
        }
    }
}

/// Check whether a file has executable permission bits set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// On Windows, executability is determined by file extension, not permission bits.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve a tool's binary path by iterating over PATH entries.
///
/// Returns the first match that exists and is executable. Does not shell
/// out to `which`, whose behavior varies across systems.
pub fn resolve_tool_path(
    tool: &str,
    path_entries: &[PathBuf],
    platform: Platform,
) -> Option<PathBuf> {
    let file_name = platform.executable_name(tool);
    path_entries
        .iter()
        .map(|dir| dir.join(&file_name))
        .find(|candidate| is_executable(candidate))
}

/// Parse the system PATH environment variable into a list of directories.
pub fn parse_system_path() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default()
}
