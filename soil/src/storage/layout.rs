//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the deployments root
pub const ROOT_ENV: &str = "SOIL_HOME";

/// Name of the per-deployment status record
pub const STATUS_FILE: &str = "status";

/// Storage layout for deployments
///
/// Every deployment lives in `<base_dir>/<name>/` and keeps its status
/// record at `<base_dir>/<name>/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Base directory for all deployments
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Resolve the root from an explicit path, then `SOIL_HOME`, then `$HOME/.soil`
    pub fn resolve(explicit: Option<PathBuf>) -> Self {
        match explicit {
            Some(path) => Self::new(absolute(path)),
            None => match std::env::var_os(ROOT_ENV) {
                Some(path) if !path.is_empty() => Self::new(absolute(PathBuf::from(path))),
                _ => Self::default(),
            },
        }
    }

    /// Get the deployments root directory
    pub fn root_dir(&self) -> Dir {
        Dir::new(self.base_dir.clone())
    }

    /// Get the working directory of a deployment
    pub fn workdir(&self, name: &str) -> Dir {
        self.root_dir().subdir(name)
    }

    /// Get the status record of a deployment
    pub fn status_file(&self, name: &str) -> File {
        self.workdir(name).file(STATUS_FILE)
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        self.root_dir().file("settings.json")
    }

    /// Get the log file path
    pub fn log_file(&self) -> File {
        self.root_dir().file("soil.log")
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::new(absolute(home.join(".soil")))
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(&path))
        .unwrap_or(path)
}
