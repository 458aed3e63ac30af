//! Deployment lifecycle: state machine and orchestration

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::deploy::kind::Kind;
use crate::deploy::scalability::{CreateParams, ScalabilityDeployment};
use crate::deploy::status::StatusStore;
use crate::deploy::{Deployment, ProvisionContext};
use crate::errors::SoilError;
use crate::process::Executor;
use crate::storage::settings::Settings;

/// Persisted state of a deployment name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    /// No status record
    Absent,

    /// Status record present
    Created,
}

/// Lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Persist and provision
    Create,

    /// Probe provisioned resources
    Test,

    /// Tear down; `force` also deletes the working directory
    Remove { force: bool },
}

impl DeploymentState {
    /// Next state after `event`, or the error an invalid transition yields
    pub fn process(self, name: &str, event: LifecycleEvent) -> Result<DeploymentState, SoilError> {
        match (self, event) {
            (DeploymentState::Absent, LifecycleEvent::Create) => Ok(DeploymentState::Created),
            (DeploymentState::Created, LifecycleEvent::Test) => Ok(DeploymentState::Created),
            (DeploymentState::Created, LifecycleEvent::Remove { force: true }) => {
                Ok(DeploymentState::Absent)
            }
            (DeploymentState::Created, LifecycleEvent::Remove { force: false }) => {
                Ok(DeploymentState::Created)
            }

            // Invalid transitions
            (DeploymentState::Created, LifecycleEvent::Create) => {
                Err(SoilError::AlreadyExists(name.to_string()))
            }
            (DeploymentState::Absent, _) => Err(SoilError::NotFound(name.to_string())),
        }
    }
}

/// Runs lifecycle operations against the deployments root
pub struct Lifecycle {
    store: StatusStore,
    settings: Settings,
    executor: Arc<dyn Executor>,
}

impl Lifecycle {
    pub fn new(store: StatusStore, settings: Settings, executor: Arc<dyn Executor>) -> Self {
        Self {
            store,
            settings,
            executor,
        }
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn context(&self) -> ProvisionContext<'_> {
        ProvisionContext {
            layout: self.store.layout(),
            settings: &self.settings,
            executor: self.executor.as_ref(),
        }
    }

    /// Current state of `name`
    pub async fn state(&self, name: &str) -> DeploymentState {
        if self.store.exists(name).await {
            DeploymentState::Created
        } else {
            DeploymentState::Absent
        }
    }

    /// Create a deployment and provision it. Returns the working directory.
    ///
    /// The status record is written before provisioning starts, so a failed
    /// provisioning leaves a created deployment behind that `remove` can
    /// tear down.
    pub async fn create(
        &self,
        name: &str,
        kind: &str,
        params: CreateParams,
    ) -> Result<PathBuf, SoilError> {
        self.state(name).await.process(name, LifecycleEvent::Create)?;

        let kind = Kind::lookup(kind)?;
        let deployment =
            ScalabilityDeployment::new(name, kind, &self.settings.terraform_repo_ref, params)?;
        self.store.save(&deployment).await?;

        deployment.create(&self.context()).await?;

        let workdir = deployment.workdir(self.store.layout());
        info!("Created {}", workdir.path().display());
        Ok(workdir.path().to_path_buf())
    }

    pub async fn load(&self, name: &str) -> Result<Box<dyn Deployment>, SoilError> {
        self.store.load(name).await
    }

    pub async fn list_all(&self) -> Result<Vec<Box<dyn Deployment>>, SoilError> {
        self.store.list().await
    }

    /// Description plus access details when the deployment can report them
    pub async fn describe(&self, name: &str) -> Result<String, SoilError> {
        let deployment = self.load(name).await?;
        let mut text = deployment.describe();

        match deployment.access_details(&self.context()).await {
            Ok(Some(details)) => {
                text.push_str("    ");
                text.push_str(&details.replace('\n', "\n    "));
            }
            Ok(None) => {}
            Err(e) => warn!("Unable to read access details for '{}': {}", name, e),
        }
        Ok(text)
    }

    /// Run probes against a created deployment. The status record is untouched.
    pub async fn test(&self, name: &str) -> Result<(), SoilError> {
        self.state(name).await.process(name, LifecycleEvent::Test)?;
        let deployment = self.load(name).await?;
        deployment.test(&self.context()).await
    }

    /// Tear down a deployment; `force` also deletes its working directory.
    ///
    /// With `force` the working directory is deleted even when teardown
    /// fails; the teardown error is still returned.
    pub async fn remove(&self, name: &str, force: bool) -> Result<(), SoilError> {
        let next = self
            .state(name)
            .await
            .process(name, LifecycleEvent::Remove { force })?;
        let deployment = self.load(name).await?;

        let teardown = deployment.remove(&self.context()).await;
        if next == DeploymentState::Created {
            teardown?;
            info!("Removed deployment '{}'", name);
            return Ok(());
        }

        if let Err(e) = &teardown {
            warn!("Teardown of '{}' failed, deleting it anyway: {}", name, e);
        }
        self.store.delete(name).await?;
        info!("Removed deployment '{}'", name);
        teardown
    }
}
