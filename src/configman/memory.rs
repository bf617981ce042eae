//! In-process configuration adapter
//!
//! Holds the snapshot in memory and pushes the complete snapshot to every
//! watcher after each mutation. Useful when the gateway is embedded and the
//! host owns the configuration.

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::configman::adapter::{check_document_key, missing, ConfigAdapter, WATCH_CHANNEL_CAPACITY};
use crate::core::error::GatewayResult;
use crate::resource::codec::ResourceTypeKey;
use crate::resource::document::{ConfigSnapshot, Document, DocumentFilter};

pub struct MemoryAdapter {
    snapshot: RwLock<ConfigSnapshot>,
    changes: broadcast::Sender<ConfigSnapshot>,
}

impl MemoryAdapter {
    pub fn new(initial: ConfigSnapshot) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            snapshot: RwLock::new(initial),
            changes,
        }
    }

    /// Replace the whole snapshot and notify watchers
    pub fn replace(&self, snapshot: ConfigSnapshot) {
        *self.snapshot.write() = snapshot.clone();
        let _ = self.changes.send(snapshot);
    }

    fn publish(&self) {
        let current = self.snapshot.read().clone();
        let _ = self.changes.send(current);
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new(ConfigSnapshot::new())
    }
}

#[async_trait]
impl ConfigAdapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_snapshot(&self) -> GatewayResult<ConfigSnapshot> {
        Ok(self.snapshot.read().clone())
    }

    async fn watch(&self, cancel: CancellationToken) -> GatewayResult<mpsc::Receiver<ConfigSnapshot>> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = changes.recv() => match received {
                        Ok(snapshot) => {
                            if tx.send(snapshot).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Memory adapter watcher lagged behind");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        Ok(rx)
    }

    async fn list(&self, key: &ResourceTypeKey, filter: &DocumentFilter) -> GatewayResult<Vec<Document>> {
        let snapshot = self.snapshot.read();
        Ok(snapshot
            .documents(&key.token())
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<Document> {
        self.snapshot
            .read()
            .get(&key.token(), name)
            .cloned()
            .ok_or_else(|| missing(key, name))
    }

    async fn apply(&self, key: &ResourceTypeKey, document: Document) -> GatewayResult<()> {
        check_document_key(key, &document)?;
        self.snapshot.write().upsert(key.token(), document);
        self.publish();
        Ok(())
    }

    async fn delete(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<()> {
        let removed = self.snapshot.write().remove(&key.token(), name);
        if removed.is_none() {
            return Err(missing(key, name));
        }
        self.publish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ResourceTypeKey {
        ResourceTypeKey::new("a.io", "v1", "things")
    }

    #[tokio::test]
    async fn test_apply_upserts_and_notifies() {
        let adapter = MemoryAdapter::default();
        let mut rx = adapter.watch(CancellationToken::new()).await.unwrap();

        adapter.apply(&key(), Document::new(&key(), "Thing", "a")).await.unwrap();
        adapter
            .apply(&key(), Document::new(&key(), "Thing", "a").with_workspace("shop"))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second.documents(&key().token())[0].workspace(), "shop");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let adapter = MemoryAdapter::default();
        assert!(adapter.delete(&key(), "nope").await.is_err());
        assert!(adapter.get(&key(), "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_by_workspace() {
        let adapter = MemoryAdapter::default();
        adapter.apply(&key(), Document::new(&key(), "Thing", "a")).await.unwrap();
        adapter
            .apply(&key(), Document::new(&key(), "Thing", "b").with_workspace("shop"))
            .await
            .unwrap();

        let shop = adapter.list(&key(), &DocumentFilter::workspace("shop")).await.unwrap();
        assert_eq!(shop.len(), 1);
        assert_eq!(shop[0].name(), "b");
        assert_eq!(adapter.list(&key(), &DocumentFilter::default()).await.unwrap().len(), 2);
    }
}
