//! Requirement manifests and installed-package listings.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::LazyLock;

static REQUIREMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").unwrap());

static NAME_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-_.]+").unwrap());

/// Normalize a distribution name (PEP 503): lowercase, separators collapsed to `-`.
pub fn normalize_name(name: &str) -> String {
    NAME_SEPARATORS
        .replace_all(&name.trim().to_lowercase(), "-")
        .into_owned()
}

/// Package names listed in a requirements file.
///
/// Comments, blank lines and option lines (`-r`, `--index-url`, ...) are
/// skipped. Version specifiers, extras and markers are dropped.
pub fn parse_manifest(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() || line.starts_with('-') {
            continue;
        }
        if let Some(caps) = REQUIREMENT_NAME.captures(line) {
            let name = normalize_name(&caps[1]);
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

#[derive(Debug, Deserialize)]
struct ListedPackage {
    name: String,
}

/// Parse the output of `uv pip list --format json` into normalized names.
pub fn parse_installed(json: &str) -> Result<Vec<String>, serde_json::Error> {
    let packages: Vec<ListedPackage> = serde_json::from_str(json.trim())?;
    Ok(packages.iter().map(|p| normalize_name(&p.name)).collect())
}

/// Manifest entries absent from the installed set, in manifest order.
pub fn missing_packages(manifest: &[String], installed: &[String]) -> Vec<String> {
    let installed: HashSet<&str> = installed.iter().map(String::as_str).collect();
    manifest
        .iter()
        .filter(|name| !installed.contains(name.as_str()))
        .cloned()
        .collect()
}
