//! Host filesystem and PATH access for validation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::document::FileRead;
use crate::shell::{is_executable, parse_system_path, resolve_tool_path, Platform};

/// What the validator may ask about the machine it runs on.
pub trait HostProbe: Send + Sync {
    /// Whether `path` is a readable directory.
    ///
    /// `Invalid` means the path exists but is not a directory.
    fn inspect_dir(&self, path: &Path) -> FileRead<()>;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn is_executable(&self, path: &Path) -> bool;

    /// Locate `tool` on the search path.
    fn find_on_path(&self, tool: &str) -> Option<PathBuf>;
}

/// The real machine.
#[derive(Debug, Clone)]
pub struct LocalHost {
    platform: Platform,
    path_entries: Vec<PathBuf>,
}

impl LocalHost {
    /// Probe using the process's `PATH`.
    pub fn new(platform: Platform) -> Self {
        Self::with_path(platform, parse_system_path())
    }

    /// Probe using an explicit search path.
    pub fn with_path(platform: Platform, path_entries: Vec<PathBuf>) -> Self {
        Self {
            platform,
            path_entries,
        }
    }
}

impl HostProbe for LocalHost {
    fn inspect_dir(&self, path: &Path) -> FileRead<()> {
        match fs::metadata(path) {
            Ok(meta) if !meta.is_dir() => {
                FileRead::Invalid(format!("{} is not a directory", path.display()))
            }
            Ok(_) => match fs::read_dir(path) {
                Ok(_) => FileRead::Success(()),
                Err(e) => FileRead::Error(format!("{} is not readable: {}", path.display(), e)),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => FileRead::NotFound,
            Err(e) => FileRead::Error(format!("{}: {}", path.display(), e)),
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_executable(&self, path: &Path) -> bool {
        is_executable(path)
    }

    fn find_on_path(&self, tool: &str) -> Option<PathBuf> {
        resolve_tool_path(tool, &self.path_entries, self.platform)
    }
}
