//! # Sources
//!
//! A [`Source`] is the live instance the embedding host builds from one
//! declarative document. Sources are grouped into a [`SourceMap`] keyed by
//! workspace and provider; the map is the only surface gateway subsystems
//! (GraphQL, RPC, pub/sub, task queues) use to discover their configuration.
//!
//! Sources are never mutated after construction. A reload builds a fresh set
//! and the old set is dropped once the new one is installed.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::configman::loader::RuntimeConfig;
use crate::core::error::GatewayResult;
use crate::resource::codec::ResourceTypeKey;
use crate::resource::document::Document;
use crate::resource::registry::SourceRegistration;

pub mod builtin;
pub mod composer;
pub mod host;
pub mod resolver;

pub use composer::{compose, Composition};
pub use host::LocalHost;
pub use resolver::resolve;

/// Runtime contract every instantiated document satisfies
pub trait Source: Send + Sync + fmt::Debug {
    /// Higher priorities sort first within a provider bucket
    fn priority(&self) -> i32;

    fn name(&self) -> &str;

    fn type_key(&self) -> &ResourceTypeKey;

    /// Provider namespaces this source participates in
    fn providers(&self) -> &[String];

    fn workspace(&self) -> &str;

    /// Downcast hook for providers that need the concrete kind
    fn as_any(&self) -> &dyn Any;
}

/// Capabilities the embedding module host exposes to the control plane
///
/// The control plane decides which documents exist and in what order they
/// are realised; building and running them is the host's business.
#[async_trait]
pub trait ModuleHost: Send + Sync {
    /// Build a live source from a document of a registered kind
    fn construct(
        &self,
        registration: &SourceRegistration,
        document: &Document,
    ) -> GatewayResult<Arc<dyn Source>>;

    /// Whether `provider` has been reconciled and is serving
    fn is_provider_live(&self, provider: &str) -> bool;

    /// Bring a freshly composed configuration up
    ///
    /// An error leaves the previously loaded configuration in charge.
    async fn load(&self, config: &RuntimeConfig) -> GatewayResult<()>;

    /// Tear down a configuration that has been replaced
    async fn unload(&self, config: &RuntimeConfig);
}

type Bucket = Vec<Arc<dyn Source>>;

/// workspace -> provider -> sources sorted by descending priority
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    buckets: HashMap<String, HashMap<String, Bucket>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources serving `provider` in `workspace`, highest priority first
    pub fn get_sources(&self, workspace: &str, provider: &str) -> &[Arc<dyn Source>] {
        self.buckets
            .get(workspace)
            .and_then(|providers| providers.get(provider))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn workspaces(&self) -> Vec<&str> {
        let mut workspaces: Vec<&str> = self.buckets.keys().map(String::as_str).collect();
        workspaces.sort_unstable();
        workspaces
    }

    pub fn providers(&self, workspace: &str) -> Vec<&str> {
        let mut providers: Vec<&str> = self
            .buckets
            .get(workspace)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default();
        providers.sort_unstable();
        providers
    }

    /// Number of (workspace, provider, source) entries
    pub fn len(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|providers| providers.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&mut self, workspace: &str, provider: &str, source: Arc<dyn Source>) {
        self.buckets
            .entry(workspace.to_string())
            .or_default()
            .entry(provider.to_string())
            .or_default()
            .push(source);
    }

    /// Stable sort of every bucket by descending priority
    pub(crate) fn sort(&mut self) {
        for providers in self.buckets.values_mut() {
            for bucket in providers.values_mut() {
                bucket.sort_by(|a, b| b.priority().cmp(&a.priority()));
            }
        }
    }
}
