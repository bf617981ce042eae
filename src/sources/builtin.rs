//! # Built-in Resource Kinds
//!
//! Resource kinds that ship with the gateway. All of them are realised as a
//! [`DeclaredSource`]: the document's identity, its priority (the `spec.priority`
//! override or the kind's default) and the providers the kind serves.

use std::any::Any;
use std::sync::Arc;

use crate::core::error::GatewayResult;
use crate::resource::codec::ResourceTypeKey;
use crate::resource::document::Document;
use crate::resource::registry::{RegistryBuilder, SourceContext, SourceRegistry};
use crate::sources::Source;
use crate::structural_error;

/// API group of the built-in kinds
pub const CORE_GROUP: &str = "core.resource-gateway.io";

/// API version of the built-in kinds
pub const CORE_VERSION: &str = "v1alpha1";

/// `(resource, default priority, providers)` for each built-in kind
const BUILTIN_KINDS: &[(&str, i32, &[&str])] = &[
    ("compiledgraphqlsources", 0, &["graphql"]),
    ("graphqlsources", 0, &["graphql"]),
    ("openapisources", 0, &["rpc"]),
    ("pubsubchannels", 0, &["pubsub"]),
    ("taskqueues", 0, &["tasks"]),
    ("redissources", 10, &["tasks", "pubsub"]),
    ("jwthsasecrets", 0, &[]),
];

/// Generic live source for a declarative document
#[derive(Debug, Clone)]
pub struct DeclaredSource {
    name: String,
    workspace: String,
    type_key: ResourceTypeKey,
    priority: i32,
    providers: Vec<String>,
    spec: serde_yaml::Value,
}

impl DeclaredSource {
    /// Build from a document, honouring a `spec.priority` override
    pub fn from_document(
        document: &Document,
        ctx: &SourceContext,
        providers: &[&str],
    ) -> GatewayResult<Self> {
        let priority = match document.spec.get("priority") {
            None | Some(serde_yaml::Value::Null) => ctx.default_priority,
            Some(value) => value
                .as_i64()
                .and_then(|p| i32::try_from(p).ok())
                .ok_or_else(|| {
                    structural_error!(
                        "spec.priority of '{}' must be an integer, got {:?}",
                        document.name(),
                        value
                    )
                })?,
        };

        Ok(Self {
            name: document.name().to_string(),
            workspace: ctx.workspace.clone(),
            type_key: ctx.type_key.clone(),
            priority,
            providers: providers.iter().map(|p| p.to_string()).collect(),
            spec: document.spec.clone(),
        })
    }

    pub fn spec(&self) -> &serde_yaml::Value {
        &self.spec
    }
}

impl Source for DeclaredSource {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn type_key(&self) -> &ResourceTypeKey {
        &self.type_key
    }

    fn providers(&self) -> &[String] {
        &self.providers
    }

    fn workspace(&self) -> &str {
        &self.workspace
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Type key of a built-in kind
pub fn builtin_key(resource: &str) -> ResourceTypeKey {
    ResourceTypeKey::new(CORE_GROUP, CORE_VERSION, resource)
}

/// Add every built-in kind to `builder`
pub fn register_builtin(mut builder: RegistryBuilder) -> RegistryBuilder {
    for (resource, priority, providers) in BUILTIN_KINDS {
        let providers: &'static [&'static str] = *providers;
        builder = builder.register(
            builtin_key(resource),
            *priority,
            move |document: &Document, ctx: &SourceContext| {
                Ok(Arc::new(DeclaredSource::from_document(document, ctx, providers)?) as Arc<dyn Source>)
            },
        );
    }
    builder
}

/// Registry holding only the built-in kinds
pub fn builtin_registry() -> GatewayResult<SourceRegistry> {
    register_builtin(SourceRegistry::builder()).build()
}
