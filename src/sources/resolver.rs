//! # Dependency Resolver
//!
//! Lets a provider check that every other provider a source participates in
//! is already live before it starts using the source. This is an existence
//! check against the host, not a scheduler.

use crate::core::error::{GatewayError, GatewayResult};
use crate::sources::{ModuleHost, Source};

/// Ensure every provider of `source` other than `caller` is live
///
/// Returns a dependency error naming the first provider that is not.
pub fn resolve(caller: &str, source: &dyn Source, host: &dyn ModuleHost) -> GatewayResult<()> {
    for provider in source.providers() {
        if provider == caller {
            continue;
        }
        if !host.is_provider_live(provider) {
            tracing::debug!(
                caller,
                source = source.name(),
                missing = provider.as_str(),
                "Source dependency not live"
            );
            return Err(GatewayError::dependency(provider.as_str()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::codec::ResourceTypeKey;
    use crate::resource::document::Document;
    use crate::resource::registry::SourceContext;
    use crate::sources::builtin::DeclaredSource;
    use crate::sources::host::LocalHost;

    fn source(providers: &[&str]) -> DeclaredSource {
        let key = ResourceTypeKey::new("core.example.io", "v1", "redissources");
        let doc = Document::new(&key, "RedisSource", "cache");
        let ctx = SourceContext {
            token: key.token(),
            type_key: key.clone(),
            workspace: "default".to_string(),
            default_priority: 0,
        };
        DeclaredSource::from_document(&doc, &ctx, providers).unwrap()
    }

    #[test]
    fn test_missing_dependency_is_named() {
        let host = LocalHost::new(Vec::<String>::new());
        let err = resolve("rpc", &source(&["rpc", "tasks"]), &host).unwrap_err();
        match err {
            GatewayError::Dependency { provider } => assert_eq!(provider, "tasks"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_live_dependency_resolves() {
        let host = LocalHost::new(Vec::<String>::new());
        host.mark_live("tasks");
        assert!(resolve("rpc", &source(&["rpc", "tasks"]), &host).is_ok());
    }

    #[test]
    fn test_caller_itself_is_not_required() {
        let host = LocalHost::new(Vec::<String>::new());
        assert!(resolve("rpc", &source(&["rpc"]), &host).is_ok());
    }
}
