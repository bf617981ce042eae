//! # File Adapter
//!
//! Reads declarative documents from every file in a directory and watches the
//! directory with `notify`. Each raw file system event produces a fresh full
//! snapshot; bursts are coalesced by the loader, not here.
//!
//! Writes go to one file per resource kind, `<group>.<resource>.yaml`. Apply
//! and Delete also remove a matching `(token, name)` document from whichever
//! other file held it, so the next snapshot never sees duplicates. Files are
//! replaced atomically through a hidden temporary file; hidden files are never
//! read as configuration.

use async_trait::async_trait;
use notify::{recommended_watcher, Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::configman::adapter::{check_document_key, missing, ConfigAdapter, WATCH_CHANNEL_CAPACITY};
use crate::core::error::{GatewayError, GatewayResult};
use crate::resource::codec::{ModuleToken, ResourceTypeKey};
use crate::resource::document::{parse_documents, render_documents, ConfigSnapshot, Document, DocumentFilter};

pub struct FileAdapter {
    path: PathBuf,

    /// Serialises Apply/Delete so concurrent writers cannot lose updates
    write_lock: Mutex<()>,
}

impl FileAdapter {
    /// Open a configuration directory, creating it if needed
    pub async fn open<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            GatewayError::adapter(
                "file",
                format!("Failed to create config directory {}: {}", path.display(), e),
            )
        })?;

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File that Apply writes documents of `key` into
    pub fn file_for(&self, key: &ResourceTypeKey) -> PathBuf {
        let group = key.group.replace('/', "_");
        self.path.join(format!("{}.{}.yaml", group, key.kind))
    }

    async fn read_snapshot(path: &Path) -> GatewayResult<ConfigSnapshot> {
        let mut snapshot = ConfigSnapshot::new();
        for (file, entries) in Self::read_all(path).await? {
            for entry in entries {
                let checked = entry.and_then(|document| {
                    document.validate()?;
                    Ok((document.token()?, document))
                });
                match checked {
                    Ok((token, document)) => snapshot.push(token, document),
                    Err(e) => warn!(file = %file.display(), error = %e, "Skipping document"),
                }
            }
        }
        Ok(snapshot)
    }

    /// Parse every configuration file, skipping files that are not valid YAML
    async fn read_all(path: &Path) -> GatewayResult<Vec<(PathBuf, Vec<GatewayResult<Document>>)>> {
        let mut files = Vec::new();
        for file in Self::config_files(path).await? {
            match Self::read_file(&file).await {
                Ok(entries) => files.push((file, entries)),
                Err(e) => {
                    error!(file = %file.display(), error = %e, "Unable to parse config file");
                }
            }
        }
        Ok(files)
    }

    /// Regular, non-hidden files in name order
    async fn config_files(path: &Path) -> GatewayResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(path).await.map_err(|e| {
            GatewayError::adapter(
                "file",
                format!("Unable to read config directory {}: {}", path.display(), e),
            )
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            if is_hidden(&file) || !entry.file_type().await?.is_file() {
                continue;
            }
            files.push(file);
        }
        files.sort();
        Ok(files)
    }

    async fn read_file(file: &Path) -> GatewayResult<Vec<GatewayResult<Document>>> {
        let content = tokio::fs::read_to_string(file).await?;
        parse_documents(&content)
    }

    /// Documents of `file` that can be written back without losing anything
    fn rewritable(file: &Path, entries: Vec<GatewayResult<Document>>) -> GatewayResult<Vec<Document>> {
        entries
            .into_iter()
            .collect::<GatewayResult<Vec<_>>>()
            .map_err(|e| {
                GatewayError::adapter(
                    "file",
                    format!("Refusing to rewrite {} with malformed content: {}", file.display(), e),
                )
            })
    }

    /// Replace `file` with `documents`, removing it when nothing is left
    async fn write_file(file: &Path, documents: &[Document]) -> GatewayResult<()> {
        if documents.is_empty() {
            match tokio::fs::remove_file(file).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }

        let content = render_documents(documents)?;
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GatewayError::adapter("file", format!("Invalid file path {}", file.display())))?;
        let temp = file.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&temp, content).await?;
        if let Err(e) = tokio::fs::rename(&temp, file).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop `(token, name)` from every file except `keep`
    ///
    /// Returns true when at least one document was removed.
    async fn remove_everywhere(
        &self,
        token: &ModuleToken,
        name: &str,
        keep: Option<&Path>,
    ) -> GatewayResult<bool> {
        let matches = |d: &Document| d.name() == name && d.token().ok().as_ref() == Some(token);

        let mut removed = false;
        for (file, entries) in Self::read_all(&self.path).await? {
            if Some(file.as_path()) == keep {
                continue;
            }
            if !entries.iter().any(|e| e.as_ref().map(|d| matches(d)).unwrap_or(false)) {
                continue;
            }

            let remaining: Vec<Document> = Self::rewritable(&file, entries)?
                .into_iter()
                .filter(|d| !matches(d))
                .collect();
            debug!(file = %file.display(), name, "Removing document from config file");
            Self::write_file(&file, &remaining).await?;
            removed = true;
        }
        Ok(removed)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[async_trait]
impl ConfigAdapter for FileAdapter {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_snapshot(&self) -> GatewayResult<ConfigSnapshot> {
        Self::read_snapshot(&self.path).await
    }

    async fn watch(&self, cancel: CancellationToken) -> GatewayResult<mpsc::Receiver<ConfigSnapshot>> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();

        let mut watcher = recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(e) => warn!(error = %e, "File watcher reported an error"),
        })?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let path = self.path.clone();

        tokio::spawn(async move {
            // keeps the watcher registered for the lifetime of this task
            let _watcher = watcher;
            info!(dir = %path.display(), "Watching config directory");

            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = raw_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let only_hidden = !event.paths.is_empty() && event.paths.iter().all(|p| is_hidden(p));
                if matches!(event.kind, EventKind::Access(_)) || only_hidden {
                    continue;
                }

                match Self::read_snapshot(&path).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(dir = %path.display(), error = %e, "Config directory unreadable, stopping watch");
                        break;
                    }
                }
            }
            debug!(dir = %path.display(), "File watch stopped");
        });

        Ok(rx)
    }

    async fn list(&self, key: &ResourceTypeKey, filter: &DocumentFilter) -> GatewayResult<Vec<Document>> {
        let snapshot = self.get_snapshot().await?;
        Ok(snapshot
            .documents(&key.token())
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<Document> {
        let snapshot = self.get_snapshot().await?;
        snapshot
            .get(&key.token(), name)
            .cloned()
            .ok_or_else(|| missing(key, name))
    }

    async fn apply(&self, key: &ResourceTypeKey, document: Document) -> GatewayResult<()> {
        check_document_key(key, &document)?;
        let token = key.token();
        let target = self.file_for(key);
        let _guard = self.write_lock.lock().await;

        let mut documents = match tokio::fs::try_exists(&target).await? {
            true => {
                let entries = Self::read_file(&target).await.map_err(|e| {
                    GatewayError::adapter(
                        "file",
                        format!("Refusing to overwrite unparsable {}: {}", target.display(), e),
                    )
                })?;
                Self::rewritable(&target, entries)?
            }
            false => Vec::new(),
        };

        let name = document.name().to_string();
        match documents
            .iter_mut()
            .find(|d| d.name() == name && d.token().ok().as_ref() == Some(&token))
        {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }

        // the new copy lands before any old one is dropped
        Self::write_file(&target, &documents).await?;
        self.remove_everywhere(&token, &name, Some(&target)).await?;

        info!(token = %token, name = %name, file = %target.display(), "Applied document");
        Ok(())
    }

    async fn delete(&self, key: &ResourceTypeKey, name: &str) -> GatewayResult<()> {
        let token = key.token();
        let _guard = self.write_lock.lock().await;

        if !self.remove_everywhere(&token, name, None).await? {
            return Err(missing(key, name));
        }
        info!(token = %token, name, "Deleted document");
        Ok(())
    }
}
