//! # Source Registry
//!
//! Table of resource kinds the process knows how to realise. Each kind is
//! registered once at startup with a constructor and a default priority.
//!
//! Registration goes through [`RegistryBuilder`]; once built the registry is
//! immutable, so lookups never need a lock. A single registry may be installed
//! as the process-wide one with [`SourceRegistry::install`]. Registration after
//! the registry has been built is impossible by construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::core::error::{GatewayError, GatewayResult};
use crate::resource::codec::{ModuleToken, ResourceTypeKey};
use crate::resource::document::Document;
use crate::sources::Source;

static GLOBAL_REGISTRY: OnceLock<Arc<SourceRegistry>> = OnceLock::new();

/// What a constructor learns about the document it is building
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub token: ModuleToken,
    pub type_key: ResourceTypeKey,
    pub workspace: String,
    pub default_priority: i32,
}

/// Builds a live source from one document
pub type SourceFactory =
    Arc<dyn Fn(&Document, &SourceContext) -> GatewayResult<Arc<dyn Source>> + Send + Sync>;

/// One registered resource kind
#[derive(Clone)]
pub struct SourceRegistration {
    pub type_key: ResourceTypeKey,
    pub token: ModuleToken,
    pub default_priority: i32,
    factory: SourceFactory,
}

impl SourceRegistration {
    /// Run the prototype constructor for `document`
    pub fn construct(&self, document: &Document) -> GatewayResult<Arc<dyn Source>> {
        let ctx = SourceContext {
            token: self.token.clone(),
            type_key: self.type_key.clone(),
            workspace: document.workspace().to_string(),
            default_priority: self.default_priority,
        };
        (self.factory)(document, &ctx)
    }
}

impl fmt::Debug for SourceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistration")
            .field("token", &self.token)
            .field("default_priority", &self.default_priority)
            .finish()
    }
}

/// Collects registrations before the registry is frozen
#[derive(Default)]
pub struct RegistryBuilder {
    registrations: Vec<SourceRegistration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource kind
    pub fn register<F>(mut self, type_key: ResourceTypeKey, default_priority: i32, factory: F) -> Self
    where
        F: Fn(&Document, &SourceContext) -> GatewayResult<Arc<dyn Source>>
            + Send
            + Sync
            + 'static,
    {
        let token = type_key.token();
        self.registrations.push(SourceRegistration {
            type_key,
            token,
            default_priority,
            factory: Arc::new(factory),
        });
        self
    }

    /// Freeze the table
    ///
    /// Fails on an invalid type key or when two registrations share a token.
    pub fn build(self) -> GatewayResult<SourceRegistry> {
        let mut entries = HashMap::with_capacity(self.registrations.len());
        for registration in self.registrations {
            registration.type_key.validate()?;
            let token = registration.token.clone();
            if entries.insert(token.clone(), registration).is_some() {
                return Err(GatewayError::config(format!(
                    "resource kind {} registered twice",
                    token
                )));
            }
        }
        Ok(SourceRegistry { entries })
    }
}

/// Read-only table of registered resource kinds
#[derive(Debug, Default)]
pub struct SourceRegistry {
    entries: HashMap<ModuleToken, SourceRegistration>,
}

impl SourceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, token: &ModuleToken) -> Option<&SourceRegistration> {
        self.entries.get(token)
    }

    pub fn contains(&self, token: &ModuleToken) -> bool {
        self.entries.contains_key(token)
    }

    /// Registered type keys, sorted by token
    pub fn type_keys(&self) -> Vec<ResourceTypeKey> {
        let mut registrations: Vec<&SourceRegistration> = self.entries.values().collect();
        registrations.sort_by(|a, b| a.token.cmp(&b.token));
        registrations.into_iter().map(|r| r.type_key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Install `registry` as the process-wide registry
    ///
    /// Only the first call succeeds.
    pub fn install(registry: SourceRegistry) -> GatewayResult<Arc<SourceRegistry>> {
        let registry = Arc::new(registry);
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| GatewayError::config("source registry is already installed"))?;
        Ok(registry)
    }

    /// The process-wide registry, if one was installed
    pub fn global() -> Option<Arc<SourceRegistry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}
