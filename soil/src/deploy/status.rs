//! Status record persistence
//!
//! Each deployment keeps one JSON record at `<root>/<name>/status`:
//!
//! ```json
//! {
//!   "deployment": { "deployment_name": "perf", "kind": "k3d", ... },
//!   "type": "deploy.ScalabilityDeployment",
//!   "name": "perf",
//!   "extra": { "repo": "...", "replicas": 1 }
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::deploy::directory::DeploymentDirectory;
use crate::deploy::registry::DeploymentRegistry;
use crate::deploy::{validate_name, Deployment};
use crate::errors::SoilError;
use crate::filesys::dir::Dir;
use crate::storage::layout::StorageLayout;

/// Polymorphic envelope persisted for every deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub deployment: Value,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub name: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl StatusRecord {
    pub fn from_deployment(deployment: &dyn Deployment) -> Result<Self, SoilError> {
        Ok(Self {
            deployment: deployment.payload()?,
            type_tag: deployment.type_tag().to_string(),
            name: deployment.name().to_string(),
            extra: deployment.extra(),
        })
    }
}

/// Reads and writes status records under the deployments root
#[derive(Debug, Clone)]
pub struct StatusStore {
    layout: StorageLayout,
    registry: Arc<DeploymentRegistry>,
}

impl StatusStore {
    pub fn new(layout: StorageLayout, registry: Arc<DeploymentRegistry>) -> Self {
        Self { layout, registry }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn registry(&self) -> &DeploymentRegistry {
        &self.registry
    }

    /// Enumerate the deployments under the root
    pub fn directory(&self) -> DeploymentDirectory<'_> {
        DeploymentDirectory::new(self)
    }

    /// Create the working directory of a deployment. Existing is fine.
    pub async fn ensure_workdir(&self, name: &str) -> Result<Dir, SoilError> {
        validate_name(name)?;
        let workdir = self.layout.workdir(name);
        if workdir.exists().await {
            debug!("Working directory {} already exists", workdir.path().display());
        }
        workdir.create().await?;
        Ok(workdir)
    }

    /// Whether a status record exists for `name`
    pub async fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.layout.status_file(name).exists().await
    }

    /// Write the status record, replacing any previous one
    pub async fn save(&self, deployment: &dyn Deployment) -> Result<(), SoilError> {
        if !self.registry.contains(deployment.type_tag()) {
            return Err(SoilError::UnknownKind(deployment.type_tag().to_string()));
        }
        let record = StatusRecord::from_deployment(deployment)?;
        self.ensure_workdir(&record.name).await?;

        let status_file = self.layout.status_file(&record.name);
        status_file.write_json(&record).await?;
        info!("Saved deployment status: {}", status_file.path().display());
        Ok(())
    }

    /// Read the raw record without decoding the payload
    pub async fn load_record(&self, name: &str) -> Result<StatusRecord, SoilError> {
        validate_name(name)?;
        let status_file = self.layout.status_file(name);
        let contents = status_file.read_string().await.map_err(|e| match e {
            SoilError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                SoilError::NotFound(name.to_string())
            }
            other => other,
        })?;

        serde_json::from_str(&contents)
            .map_err(|e| SoilError::parse(status_file.path().display().to_string(), e))
    }

    /// Load and decode a deployment by name
    pub async fn load(&self, name: &str) -> Result<Box<dyn Deployment>, SoilError> {
        let record = self.load_record(name).await?;
        debug!("Loading deployment '{}' of type {}", name, record.type_tag);
        self.registry.decode(&record.type_tag, record.deployment)
    }

    /// Every deployment whose record loads cleanly, sorted by name
    pub async fn list(&self) -> Result<Vec<Box<dyn Deployment>>, SoilError> {
        self.directory().list().await
    }

    /// Delete the working directory and everything in it
    pub async fn delete(&self, name: &str) -> Result<(), SoilError> {
        validate_name(name)?;
        let workdir = self.layout.workdir(name);
        workdir.delete().await?;
        info!("Deleted working directory {}", workdir.path().display());
        Ok(())
    }
}
