//! Provider trait and desired-state types

use crate::action::{ApplyResult, Plan};
use crate::error::{CloudError, Result};
use crate::state::{ProviderState, ResourceState};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider abstraction trait
///
/// A provider turns desired resources into remote entities. It never reads
/// or writes the state file itself: the current state is handed in and the
/// provider records its results into it.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g. "bitrise")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    /// Calculate the actions needed to move `current` towards `desired`
    async fn plan(&self, desired: &ResourceSet, current: &ProviderState) -> Result<Plan>;

    /// Apply the planned actions, recording outcomes into `state`
    async fn apply(&self, plan: &Plan, state: &mut ProviderState) -> Result<ApplyResult>;

    /// Adopt an existing remote entity by its handle
    async fn import(&self, resource_type: &str, handle: &str) -> Result<ResourceState>;
}

/// Set of resources to be managed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Resources indexed by type:id
    pub resources: BTreeMap<String, ResourceConfig>,
}

impl ResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: ResourceConfig) {
        self.resources.insert(resource.key(), resource);
    }

    pub fn get(&self, resource_type: &str, id: &str) -> Option<&ResourceConfig> {
        self.resources.get(&format!("{}:{}", resource_type, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Subset of resources owned by one provider
    pub fn for_provider(&self, provider: &str) -> ResourceSet {
        let resources = self
            .resources
            .iter()
            .filter(|(_, r)| r.provider == provider)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();
        ResourceSet { resources }
    }
}

impl FromIterator<ResourceConfig> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = ResourceConfig>>(iter: I) -> Self {
        let mut set = ResourceSet::new();
        for resource in iter {
            set.add(resource);
        }
        set
    }
}

/// Desired configuration for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type (e.g. "app")
    pub resource_type: String,

    /// Caller-chosen identifier
    pub id: String,

    /// Provider name
    pub provider: String,

    /// Resource-specific configuration
    pub config: serde_json::Value,
}

impl ResourceConfig {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        provider: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            provider: provider.into(),
            config,
        }
    }

    /// Get the full resource key (type:id)
    pub fn key(&self) -> String {
        format!("{}:{}", self.resource_type, self.id)
    }

    /// Deserialize the whole configuration into a typed spec
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.config.clone()).map_err(|e| CloudError::InvalidResource {
            key: self.key(),
            message: e.to_string(),
        })
    }
}
