//! Deployment module
//!
//! A deployment is a named, externally provisioned stack. Every concrete
//! kind carries a [`CommonIdentity`] and implements [`Deployment`]; the
//! [`registry`] maps the type tag stored in a status record back to the
//! concrete kind when the record is loaded.

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SoilError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::process::Executor;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

pub mod directory;
pub mod git;
pub mod kind;
pub mod kube;
pub mod lifecycle;
pub mod registry;
pub mod scalability;
pub mod status;

/// Identity shared by every deployment kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonIdentity {
    #[serde(rename = "deployment_name")]
    pub name: String,
}

impl CommonIdentity {
    pub fn new(name: impl Into<String>) -> Result<Self, SoilError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }
}

/// Deployment names double as directory names under the deployments root
pub fn validate_name(name: &str) -> Result<(), SoilError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(SoilError::Config(format!("Invalid deployment name: '{}'", name)))
    }
}

/// Everything a deployment needs to drive external tools
#[derive(Clone, Copy)]
pub struct ProvisionContext<'a> {
    pub layout: &'a StorageLayout,
    pub settings: &'a Settings,
    pub executor: &'a dyn Executor,
}

/// Capabilities of a deployment kind
#[async_trait]
pub trait Deployment: fmt::Debug + Send + Sync {
    /// Shared identity
    fn identity(&self) -> &CommonIdentity;

    /// Deployment name
    fn name(&self) -> &str {
        &self.identity().name
    }

    /// Tag written to the `type` field of the status record
    fn type_tag(&self) -> &'static str;

    /// Discriminator chosen at creation (`k3d`, `ssh`, `aws`)
    fn kind(&self) -> &str;

    /// One-line summary for listings
    fn brief(&self) -> String {
        self.name().to_string()
    }

    /// Multi-line description for `status NAME`
    fn describe(&self) -> String;

    /// Kind-specific attributes exported into the status record
    fn extra(&self) -> Map<String, Value>;

    /// Full payload stored under `deployment` in the status record
    fn payload(&self) -> Result<Value, SoilError>;

    fn workdir(&self, layout: &StorageLayout) -> Dir {
        layout.workdir(self.name())
    }

    fn status_path(&self, layout: &StorageLayout) -> File {
        layout.status_file(self.name())
    }

    /// Provision external resources. Runs after the status record is saved.
    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<(), SoilError>;

    /// Probe already provisioned resources without touching the status record
    async fn test(&self, ctx: &ProvisionContext<'_>) -> Result<(), SoilError>;

    /// Tear down external resources
    async fn remove(&self, ctx: &ProvisionContext<'_>) -> Result<(), SoilError>;

    /// Endpoints and credentials, when the external resources can report them
    async fn access_details(
        &self,
        _ctx: &ProvisionContext<'_>,
    ) -> Result<Option<String>, SoilError> {
        Ok(None)
    }

    fn as_any(&self) -> &dyn Any;
}
