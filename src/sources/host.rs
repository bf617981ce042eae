//! # Local Module Host
//!
//! In-process [`ModuleHost`] used by the gateway binary. It builds sources
//! through their registered constructor and marks the providers this process
//! serves as live once a configuration has been loaded.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::configman::loader::RuntimeConfig;
use crate::core::error::GatewayResult;
use crate::resource::document::Document;
use crate::resource::registry::SourceRegistration;
use crate::sources::{ModuleHost, Source};

pub struct LocalHost {
    /// Providers this process hosts
    providers: Vec<String>,

    live: RwLock<HashSet<String>>,

    loaded_generation: RwLock<Option<u64>>,
}

impl LocalHost {
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            providers: providers.into_iter().map(Into::into).collect(),
            live: RwLock::new(HashSet::new()),
            loaded_generation: RwLock::new(None),
        }
    }

    /// Mark a provider live ahead of the first load
    pub fn mark_live(&self, provider: impl Into<String>) {
        self.live.write().insert(provider.into());
    }

    pub fn loaded_generation(&self) -> Option<u64> {
        *self.loaded_generation.read()
    }
}

#[async_trait]
impl ModuleHost for LocalHost {
    fn construct(
        &self,
        registration: &SourceRegistration,
        document: &Document,
    ) -> GatewayResult<Arc<dyn Source>> {
        registration.construct(document)
    }

    fn is_provider_live(&self, provider: &str) -> bool {
        self.live.read().contains(provider)
    }

    async fn load(&self, config: &RuntimeConfig) -> GatewayResult<()> {
        for workspace in config.sources.workspaces() {
            for provider in config.sources.providers(workspace) {
                debug!(
                    workspace,
                    provider,
                    sources = config.sources.get_sources(workspace, provider).len(),
                    "Loading provider bucket"
                );
            }
        }

        {
            let mut live = self.live.write();
            live.extend(self.providers.iter().cloned());
        }
        *self.loaded_generation.write() = Some(config.generation);

        info!(generation = config.generation, "Configuration loaded into host");
        Ok(())
    }

    async fn unload(&self, config: &RuntimeConfig) {
        debug!(generation = config.generation, "Retired configuration unloaded");
    }
}
