//! Reading and writing persisted documents.
//!
//! Every file this crate reads can be fine, absent, present but unparseable,
//! or unreadable. [`FileRead`] keeps those four cases apart so callers can
//! decide which ones are repairable; `Err` is reserved for unexpected faults
//! while writing.

use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::Result;

/// Outcome of reading a document from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRead<T> {
    /// The file was read and parsed.
    Success(T),
    /// No file at the path.
    NotFound,
    /// The file exists but its content could not be parsed.
    Invalid(String),
    /// The file exists but could not be read.
    Error(String),
}

impl<T> FileRead<T> {
    /// The payload, if the read succeeded.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn read_with<T, F>(path: &Path, parse: F) -> FileRead<T>
where
    F: FnOnce(&str) -> std::result::Result<T, String>,
{
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return FileRead::NotFound,
        Err(e) => return FileRead::Error(e.to_string()),
    };

    match parse(&content) {
        Ok(value) => FileRead::Success(value),
        Err(message) => FileRead::Invalid(message),
    }
}

/// Read and parse a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> FileRead<T> {
    read_with(path, |content| {
        serde_json::from_str(content).map_err(|e| e.to_string())
    })
}

/// Read and parse a YAML document.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> FileRead<T> {
    read_with(path, |content| {
        serde_yaml::from_str(content).map_err(|e| e.to_string())
    })
}

/// Write a file atomically.
///
/// Writes to a sibling temp file and renames it over the target, so a crash
/// mid-write never leaves a half-written document behind.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Doc {
        name: String,
    }

    #[test]
    fn read_json_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let read: FileRead<Doc> = read_json(&temp.path().join("absent.json"));
        assert_eq!(read, FileRead::NotFound);
    }

    #[test]
    fn read_json_parses_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        fs::write(&path, r#"{"name": "comfy"}"#).unwrap();

        let read: FileRead<Doc> = read_json(&path);
        assert_eq!(
            read,
            FileRead::Success(Doc {
                name: "comfy".into()
            })
        );
    }

    #[test]
    fn read_json_garbage_is_invalid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.json");
        fs::write(&path, "{ not json").unwrap();

        let read: FileRead<Doc> = read_json(&path);
        assert!(matches!(read, FileRead::Invalid(_)));
    }

    #[test]
    fn read_directory_is_error() {
        let temp = TempDir::new().unwrap();
        let read: FileRead<Doc> = read_yaml(temp.path());
        assert!(matches!(read, FileRead::Error(_)));
    }

    #[test]
    fn read_yaml_parses_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.yaml");
        fs::write(&path, "name: comfy\n").unwrap();

        let read: FileRead<Doc> = read_yaml(&path);
        assert!(read.is_success());
    }

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/config.json");

        write_atomic(&path, "{}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!temp.path().join("nested/dir/config.json.tmp").exists());
    }

}
