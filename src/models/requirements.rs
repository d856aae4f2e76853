//! Dependency requirements and installed-version detection

use crate::error::{DlhubError, DlhubResult};
use std::collections::HashMap;
use std::process::Command;

/// Version constraint for a dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Literal version string
    Pinned(String),
    /// Resolve the installed version when the description is serialized
    Detect,
}

impl Requirement {
    /// Interpret a version string; `detect` and `latest` request detection
    pub fn parse(version: &str) -> Self {
        match version {
            "detect" | "latest" => Self::Detect,
            other => Self::Pinned(other.to_string()),
        }
    }
}

impl From<&str> for Requirement {
    fn from(version: &str) -> Self {
        Self::parse(version)
    }
}

/// Looks up the installed version of a package
pub trait VersionResolver: Send + Sync + std::fmt::Debug {
    fn installed_version(&self, package: &str) -> DlhubResult<String>;
}

/// Resolves versions from the local Python installation via `pip show`
#[derive(Debug, Clone)]
pub struct PipVersionResolver {
    python: String,
}

impl PipVersionResolver {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }
}

impl Default for PipVersionResolver {
    fn default() -> Self {
        Self::new(std::env::var("DLHUB_PYTHON").unwrap_or_else(|_| "python3".to_string()))
    }
}

impl VersionResolver for PipVersionResolver {
    fn installed_version(&self, package: &str) -> DlhubResult<String> {
        let output = Command::new(&self.python)
            .args(["-m", "pip", "show", package])
            .output()
            .map_err(|e| DlhubError::VersionDetection {
                package: package.to_string(),
                reason: format!("failed to run {}: {}", self.python, e),
            })?;

        if !output.status.success() {
            return Err(DlhubError::VersionDetection {
                package: package.to_string(),
                reason: "package is not installed".to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_pip_show(&stdout).ok_or_else(|| DlhubError::VersionDetection {
            package: package.to_string(),
            reason: "no Version field in pip output".to_string(),
        })
    }
}

fn parse_pip_show(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fixed package versions, for tests and offline use
#[derive(Debug, Clone, Default)]
pub struct StaticVersionResolver {
    versions: HashMap<String, String>,
}

impl StaticVersionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, package: &str, version: &str) -> Self {
        self.versions
            .insert(package.to_string(), version.to_string());
        self
    }
}

impl VersionResolver for StaticVersionResolver {
    fn installed_version(&self, package: &str) -> DlhubResult<String> {
        self.versions
            .get(package)
            .cloned()
            .ok_or_else(|| DlhubError::VersionDetection {
                package: package.to_string(),
                reason: "package is not installed".to_string(),
            })
    }
}
