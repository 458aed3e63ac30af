//! Enumeration of persisted deployments

use tracing::warn;

use crate::deploy::status::StatusStore;
use crate::deploy::Deployment;
use crate::errors::SoilError;

/// View over the deployments root
pub struct DeploymentDirectory<'a> {
    store: &'a StatusStore,
}

impl<'a> DeploymentDirectory<'a> {
    pub fn new(store: &'a StatusStore) -> Self {
        Self { store }
    }

    /// Names of the subdirectories under the root. A missing root is empty.
    pub async fn names(&self) -> Result<Vec<String>, SoilError> {
        let root = self.store.layout().root_dir();
        if !root.exists().await {
            return Ok(Vec::new());
        }

        Ok(root
            .list_dirs()
            .await?
            .iter()
            .filter_map(|path| path.file_name())
            .filter_map(|name| name.to_str())
            .map(str::to_string)
            .collect())
    }

    /// Load every deployment under the root.
    ///
    /// Listing is best effort: a directory without a status record, with a
    /// malformed one, or with an unregistered type is logged and skipped.
    pub async fn list(&self) -> Result<Vec<Box<dyn Deployment>>, SoilError> {
        let mut deployments = Vec::new();

        for name in self.names().await? {
            match self.store.load(&name).await {
                Ok(deployment) => deployments.push(deployment),
                Err(e) => warn!("Skipping '{}': {}", name, e),
            }
        }

        Ok(deployments)
    }
}
