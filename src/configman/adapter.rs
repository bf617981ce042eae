//! # Configuration Adapter
//!
//! Abstracts where declarative documents live. Every adapter hands out
//! complete snapshots (never deltas), so adapters stay interchangeable and the
//! loader alone decides when to reload.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::error::{GatewayError, GatewayResult};
use crate::resource::codec::ResourceTypeKey;
use crate::resource::document::{ConfigSnapshot, Document, DocumentFilter};

/// Capacity of the snapshot channel returned by [`ConfigAdapter::watch`]
pub const WATCH_CHANNEL_CAPACITY: usize = 16;

#[async_trait]
pub trait ConfigAdapter: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Read the full current configuration
    async fn get_snapshot(&self) -> GatewayResult<ConfigSnapshot>;

    /// Start watching for changes
    ///
    /// Every detected change emits a complete snapshot. The channel closes
    /// when watching becomes impossible; the last snapshot received is then
    /// stale. Cancelling `cancel` stops the watcher.
    async fn watch(&self, cancel: CancellationToken) -> GatewayResult<mpsc::Receiver<ConfigSnapshot>>;

    async fn list(&self, key: &ResourceTypeKey, filter: &DocumentFilter) -> GatewayResult<Vec<Document>>;

    async fn get(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<Document>;

    /// Insert or replace the document with the same name
    async fn apply(&self, key: &ResourceTypeKey, document: Document) -> GatewayResult<()>;

    async fn delete(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<()>;
}

/// Reject a document whose type key does not match the one it is applied under
pub fn check_document_key(key: &ResourceTypeKey, document: &Document) -> GatewayResult<()> {
    document.validate()?;
    let document_key = document.type_key()?;
    if &document_key != key {
        return Err(GatewayError::invalid_request(format!(
            "document '{}' is a {} but was applied as {}",
            document.name(),
            document_key,
            key
        )));
    }
    Ok(())
}

/// Error for a missing `(key, name)` pair
pub fn missing(key: &ResourceTypeKey, name: &str) -> GatewayError {
    GatewayError::not_found(format!("{}/{}", key, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_document_key() {
        let key = ResourceTypeKey::new("a.io", "v1", "things");
        assert!(check_document_key(&key, &Document::new(&key, "Thing", "x")).is_ok());

        let other = ResourceTypeKey::new("a.io", "v1", "widgets");
        let err = check_document_key(&key, &Document::new(&other, "Widget", "x")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    }
}
