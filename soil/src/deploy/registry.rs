//! Type registry for status record decoding

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::deploy::scalability::{ScalabilityDeployment, SCALABILITY_TYPE};
use crate::deploy::Deployment;
use crate::errors::SoilError;

/// Decodes a status record payload into a concrete deployment
pub type DecodeFn = fn(Value) -> Result<Box<dyn Deployment>, serde_json::Error>;

/// Maps type tags to decoders.
///
/// Built once at startup and shared read-only afterwards. A tag that was
/// never registered fails with `UnknownKind`; there is no fallback type.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRegistry {
    decoders: BTreeMap<String, DecodeFn>,
}

impl DeploymentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every deployment kind shipped with soil
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register_type::<ScalabilityDeployment>(SCALABILITY_TYPE);
        registry
    }

    /// Register a decoder for a tag, replacing any previous one
    pub fn register(&mut self, tag: impl Into<String>, decode: DecodeFn) {
        self.decoders.insert(tag.into(), decode);
    }

    /// Register a deserializable deployment type under a tag
    pub fn register_type<T>(&mut self, tag: impl Into<String>)
    where
        T: Deployment + DeserializeOwned + 'static,
    {
        self.register(tag, decode_as::<T>);
    }

    /// Look up the decoder for a tag
    pub fn resolve(&self, tag: &str) -> Result<DecodeFn, SoilError> {
        self.decoders
            .get(tag)
            .copied()
            .ok_or_else(|| SoilError::UnknownKind(tag.to_string()))
    }

    /// Decode a payload as the type registered under `tag`
    pub fn decode(&self, tag: &str, payload: Value) -> Result<Box<dyn Deployment>, SoilError> {
        let decode = self.resolve(tag)?;
        decode(payload).map_err(|e| SoilError::parse(format!("{} payload", tag), e))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.decoders.contains_key(tag)
    }
}

fn decode_as<T>(payload: Value) -> Result<Box<dyn Deployment>, serde_json::Error>
where
    T: Deployment + DeserializeOwned + 'static,
{
    let deployment: T = serde_json::from_value(payload)?;
    Ok(Box::new(deployment))
}
