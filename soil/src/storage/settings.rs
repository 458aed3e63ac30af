//! Settings file management

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SoilError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Soil settings, built once at startup and passed down by reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Shell used to run command lines
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Admin password configured on provisioned Rancher and Grafana
    #[serde(default = "default_admin_password")]
    pub admin_password: String,

    /// Repository holding the terraform configurations, as `url[@branch]`
    #[serde(default = "default_terraform_repo_ref")]
    pub terraform_repo_ref: String,
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_admin_password() -> String {
    "adminadminadmin".to_string()
}

fn default_terraform_repo_ref() -> String {
    "https://github.com/moio/scalability-tests".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            shell: default_shell(),
            admin_password: default_admin_password(),
            terraform_repo_ref: default_terraform_repo_ref(),
        }
    }
}

impl Settings {
    /// Load settings from file, falling back to defaults when it is absent
    pub async fn load(settings_file: &File) -> Result<Self, SoilError> {
        if !settings_file.exists().await {
            debug!(
                "No settings file at {}, using defaults",
                settings_file.path().display()
            );
            return Ok(Self::default());
        }
        settings_file.read_json().await
    }
}
