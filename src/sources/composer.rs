//! # Source Composer
//!
//! Turns a configuration snapshot into a [`SourceMap`]. Every document is
//! processed in isolation: an unknown kind skips that kind's documents, a
//! failed construction skips that one document, and everything else is still
//! realised.

use tracing::{debug, warn};

use crate::core::error::GatewayError;
use crate::resource::document::ConfigSnapshot;
use crate::resource::registry::SourceRegistry;
use crate::sources::{ModuleHost, SourceMap};

/// Result of composing one snapshot
#[derive(Debug, Default)]
pub struct Composition {
    pub sources: SourceMap,

    /// Non-fatal problems, one per skipped kind or document
    pub errors: Vec<GatewayError>,

    /// Documents that produced a live source
    pub constructed: usize,

    /// Documents in the snapshot
    pub documents: usize,
}

impl Composition {
    /// The snapshot had documents but none of them could be realised
    pub fn is_total_failure(&self) -> bool {
        self.documents > 0 && self.constructed == 0 && !self.errors.is_empty()
    }
}

/// Compose `snapshot` into a source map using `host` to build each source
pub fn compose(
    snapshot: &ConfigSnapshot,
    registry: &SourceRegistry,
    host: &dyn ModuleHost,
) -> Composition {
    let mut composition = Composition {
        documents: snapshot.len(),
        ..Composition::default()
    };

    for (token, documents) in snapshot.iter() {
        let Some(registration) = registry.lookup(token) else {
            warn!(
                token = %token,
                documents = documents.len(),
                "Skipping documents of unregistered resource kind"
            );
            composition.errors.push(GatewayError::unknown_resource(token.as_str()));
            continue;
        };

        for document in documents {
            let source = match host.construct(registration, document) {
                Ok(source) => source,
                Err(e) => {
                    warn!(
                        token = %token,
                        name = document.name(),
                        workspace = document.workspace(),
                        error = %e,
                        "Failed to instantiate source"
                    );
                    metrics::counter!("config_documents_rejected_total").increment(1);
                    composition.errors.push(match e {
                        GatewayError::Instantiation { .. } => e,
                        other => GatewayError::instantiation(document.identity(), other.to_string()),
                    });
                    continue;
                }
            };

            composition.constructed += 1;
            let workspace = document.workspace();
            if source.providers().is_empty() {
                debug!(token = %token, name = document.name(), "Source declares no providers");
            }
            for provider in source.providers() {
                composition.sources.push(workspace, provider, source.clone());
            }
        }
    }

    composition.sources.sort();
    composition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::codec::ResourceTypeKey;
    use crate::resource::document::Document;
    use crate::sources::builtin::DeclaredSource;
    use crate::sources::host::LocalHost;
    use crate::sources::Source;
    use std::sync::Arc;

    fn key(kind: &str) -> ResourceTypeKey {
        ResourceTypeKey::new("core.example.io", "v1", kind)
    }

    fn registry() -> SourceRegistry {
        SourceRegistry::builder()
            .register(key("redissources"), 0, |doc: &Document, ctx: &crate::resource::registry::SourceContext| {
                Ok(Arc::new(DeclaredSource::from_document(doc, ctx, &["tasks", "pubsub"])?) as Arc<dyn Source>)
            })
            .register(key("jwtsecrets"), 0, |doc: &Document, ctx: &crate::resource::registry::SourceContext| {
                Ok(Arc::new(DeclaredSource::from_document(doc, ctx, &[])?) as Arc<dyn Source>)
            })
            .build()
            .unwrap()
    }

    fn redis(name: &str, priority: i64) -> Document {
        Document::new(&key("redissources"), "RedisSource", name)
            .with_spec(serde_yaml::from_str(&format!("priority: {}", priority)).unwrap())
    }

    fn names(map: &SourceMap, ws: &str, provider: &str) -> Vec<String> {
        map.get_sources(ws, provider)
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    #[test]
    fn test_buckets_sorted_by_priority() {
        let snapshot: ConfigSnapshot = vec![redis("a", 50), redis("b", 100), redis("c", 70)]
            .into_iter()
            .collect();
        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));

        assert!(composition.errors.is_empty());
        assert_eq!(names(&composition.sources, "default", "tasks"), vec!["b", "c", "a"]);
        assert_eq!(names(&composition.sources, "default", "pubsub"), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_equal_priorities_keep_snapshot_order() {
        let snapshot: ConfigSnapshot = vec![redis("x", 5), redis("y", 5), redis("z", 5)]
            .into_iter()
            .collect();
        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));
        assert_eq!(names(&composition.sources, "default", "tasks"), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_workspaces_are_isolated() {
        let snapshot: ConfigSnapshot = vec![
            redis("shared", 1).with_workspace("shop"),
            redis("shared", 1),
        ]
        .into_iter()
        .collect();
        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));
        assert_eq!(composition.sources.workspaces(), vec!["default", "shop"]);
        assert_eq!(composition.sources.get_sources("shop", "tasks").len(), 1);
    }

    #[test]
    fn test_unknown_kind_is_skipped() {
        let mut snapshot: ConfigSnapshot = vec![redis("a", 1)].into_iter().collect();
        let unknown = key("mysteries");
        snapshot.push(unknown.token(), Document::new(&unknown, "Mystery", "m"));

        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));
        assert_eq!(composition.constructed, 1);
        assert_eq!(composition.errors.len(), 1);
        assert!(matches!(composition.errors[0], GatewayError::UnknownResource { .. }));
        assert!(!composition.is_total_failure());
    }

    #[test]
    fn test_source_without_providers_is_built_but_not_bucketed() {
        let secret = key("jwtsecrets");
        let snapshot: ConfigSnapshot = vec![Document::new(&secret, "JwtSecret", "signing")]
            .into_iter()
            .collect();
        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));
        assert_eq!(composition.constructed, 1);
        assert!(composition.sources.is_empty());
    }

    #[test]
    fn test_bad_document_does_not_block_others() {
        let mut docs: Vec<Document> = (0..9).map(|i| redis(&format!("ok-{}", i), i)).collect();
        docs.insert(
            4,
            Document::new(&key("redissources"), "RedisSource", "broken")
                .with_spec(serde_yaml::from_str("priority: not-a-number").unwrap()),
        );
        let snapshot: ConfigSnapshot = docs.into_iter().collect();

        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));
        assert_eq!(composition.constructed, 9);
        assert_eq!(composition.errors.len(), 1);
        assert!(matches!(composition.errors[0], GatewayError::Instantiation { .. }));
        assert_eq!(composition.sources.get_sources("default", "tasks").len(), 9);
    }

    #[test]
    fn test_total_failure_detection() {
        let snapshot: ConfigSnapshot = vec![Document::new(&key("redissources"), "RedisSource", "bad")
            .with_spec(serde_yaml::from_str("priority: [1]").unwrap())]
        .into_iter()
        .collect();
        let composition = compose(&snapshot, &registry(), &LocalHost::new(Vec::<String>::new()));
        assert!(composition.is_total_failure());

        let empty = compose(&ConfigSnapshot::new(), &registry(), &LocalHost::new(Vec::<String>::new()));
        assert!(!empty.is_total_failure());
    }
}
