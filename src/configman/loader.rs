//! # Config Loader
//!
//! Owns one configuration adapter and keeps the installed runtime
//! configuration in step with it.
//!
//! ## Pipeline
//! Two tasks connected by a single-slot mailbox (a `tokio::sync::watch`
//! channel, which only ever holds the newest value):
//!
//! 1. the watch task drains the adapter's snapshot stream into the mailbox,
//!    restarting the adapter watch after errors or closure. Every time a
//!    watch is established it also reads a full snapshot, so changes made
//!    while no watch was running are not missed;
//! 2. the reload task waits for the mailbox to change, lets one debounce
//!    window pass from that first change, then reloads from the latest
//!    snapshot. A snapshot equal to the installed one is skipped.
//!
//! N snapshots inside one window therefore cost exactly one reload, a steady
//! stream of snapshots still reloads once per window, and reloads never
//! overlap: a snapshot that arrives mid-reload marks the mailbox changed and
//! causes a single follow-up reload.
//!
//! ## Installing
//! The installed configuration lives behind an `Arc` swapped under a short
//! write lock. Readers clone the `Arc` and never wait for a reload. A new
//! configuration only replaces the old one after the host has loaded it; the
//! old one is unloaded afterwards. On any failure the old configuration stays.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::configman::adapter::ConfigAdapter;
use crate::core::error::{GatewayError, GatewayResult};
use crate::resource::document::ConfigSnapshot;
use crate::resource::registry::SourceRegistry;
use crate::sources::{compose, ModuleHost, Source, SourceMap};

/// Timing knobs of the reload pipeline
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Quiet period required before a reload runs
    pub debounce: Duration,

    /// Pause before restarting a failed or closed adapter watch
    pub watch_retry: Duration,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            watch_retry: Duration::from_secs(2),
        }
    }
}

/// Fully composed configuration the process runs on
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Increases by one with every installed configuration
    pub generation: u64,
    pub snapshot: ConfigSnapshot,
    pub sources: SourceMap,
    /// Per-document problems recorded while composing
    pub warnings: Vec<GatewayError>,
    pub applied_at: DateTime<Utc>,
}

/// Outcome of a reload, broadcast to subscribers
#[derive(Debug, Clone)]
pub enum ReloadEvent {
    Applied { generation: u64, warnings: usize },
    Rejected { reason: String },
}

pub struct ConfigLoader {
    adapter: Arc<dyn ConfigAdapter>,
    registry: Arc<SourceRegistry>,
    host: Arc<dyn ModuleHost>,
    settings: LoaderSettings,

    current: RwLock<Arc<RuntimeConfig>>,
    next_generation: AtomicU64,

    /// Held for the whole of a reload so reloads never overlap
    reload_lock: Mutex<()>,

    last_error: RwLock<Option<String>>,
    events: broadcast::Sender<ReloadEvent>,
}

impl ConfigLoader {
    /// Cold start: read, compose and load one configuration
    ///
    /// Fails when the adapter is unreachable or no document of a non-empty
    /// snapshot can be realised; the gateway must not serve without a
    /// configuration.
    pub async fn start(
        adapter: Arc<dyn ConfigAdapter>,
        registry: Arc<SourceRegistry>,
        host: Arc<dyn ModuleHost>,
        settings: LoaderSettings,
    ) -> GatewayResult<Arc<Self>> {
        info!(adapter = adapter.name(), "Loading initial configuration");

        let snapshot = adapter.get_snapshot().await.map_err(|e| {
            GatewayError::fatal(format!(
                "initial configuration unavailable from {} adapter: {}",
                adapter.name(),
                e
            ))
        })?;
        if snapshot.is_empty() {
            warn!(adapter = adapter.name(), "Initial configuration has no documents");
        }

        let config = Self::build(&snapshot, &registry, host.as_ref(), 1)
            .map_err(|e| GatewayError::fatal(format!("initial configuration rejected: {}", e)))?;
        host.load(&config)
            .await
            .map_err(|e| GatewayError::fatal(format!("host failed to load initial configuration: {}", e)))?;

        Self::record_applied(&config);
        info!(
            generation = config.generation,
            documents = config.snapshot.len(),
            warnings = config.warnings.len(),
            "Initial configuration installed"
        );

        let (events, _) = broadcast::channel(32);
        Ok(Arc::new(Self {
            adapter,
            registry,
            host,
            settings,
            current: RwLock::new(Arc::new(config)),
            next_generation: AtomicU64::new(2),
            reload_lock: Mutex::new(()),
            last_error: RwLock::new(None),
            events,
        }))
    }

    fn build(
        snapshot: &ConfigSnapshot,
        registry: &SourceRegistry,
        host: &dyn ModuleHost,
        generation: u64,
    ) -> GatewayResult<RuntimeConfig> {
        let composition = compose(snapshot, registry, host);
        if composition.is_total_failure() {
            let first = composition
                .errors
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(GatewayError::config(format!(
                "none of {} documents could be realised ({} errors, first: {})",
                composition.documents,
                composition.errors.len(),
                first
            )));
        }

        Ok(RuntimeConfig {
            generation,
            snapshot: snapshot.clone(),
            sources: composition.sources,
            warnings: composition.errors,
            applied_at: Utc::now(),
        })
    }

    fn record_applied(config: &RuntimeConfig) {
        metrics::counter!("config_reloads_total", "outcome" => "applied").increment(1);
        metrics::gauge!("config_generation").set(config.generation as f64);
    }

    /// The installed configuration
    pub fn current(&self) -> Arc<RuntimeConfig> {
        Arc::clone(&self.current.read())
    }

    /// Sources serving `provider` in `workspace`, highest priority first
    pub fn get_sources(&self, workspace: &str, provider: &str) -> Vec<Arc<dyn Source>> {
        self.current().sources.get_sources(workspace, provider).to_vec()
    }

    pub fn adapter(&self) -> &Arc<dyn ConfigAdapter> {
        &self.adapter
    }

    pub fn host(&self) -> &Arc<dyn ModuleHost> {
        &self.host
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    /// Compose `snapshot` and install it if the host accepts it
    pub async fn reload(&self, snapshot: ConfigSnapshot) -> GatewayResult<Arc<RuntimeConfig>> {
        let _serial = self.reload_lock.lock().await;
        let generation = self.next_generation.load(Ordering::SeqCst);
        debug!(generation, documents = snapshot.len(), "Reloading configuration");

        let result = match Self::build(&snapshot, &self.registry, self.host.as_ref(), generation) {
            Ok(config) => match self.host.load(&config).await {
                Ok(()) => Ok(config),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let config = match result {
            Ok(config) => Arc::new(config),
            Err(e) => {
                error!(generation, error = %e, "Configuration rejected, keeping the installed one");
                metrics::counter!("config_reloads_total", "outcome" => "rejected").increment(1);
                *self.last_error.write() = Some(e.to_string());
                let _ = self.events.send(ReloadEvent::Rejected {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let previous = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, Arc::clone(&config))
        };
        self.next_generation.fetch_add(1, Ordering::SeqCst);
        *self.last_error.write() = None;

        self.host.unload(&previous).await;
        Self::record_applied(&config);
        info!(
            generation = config.generation,
            documents = config.snapshot.len(),
            warnings = config.warnings.len(),
            "Configuration reloaded"
        );
        let _ = self.events.send(ReloadEvent::Applied {
            generation: config.generation,
            warnings: config.warnings.len(),
        });
        Ok(config)
    }

    /// Re-read the adapter and reload immediately
    pub async fn reload_from_adapter(&self) -> GatewayResult<Arc<RuntimeConfig>> {
        let snapshot = self.adapter.get_snapshot().await?;
        self.reload(snapshot).await
    }

    /// Run the watch and reload pipeline until `cancel` fires
    ///
    /// A reload already running when `cancel` fires is allowed to finish.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let loader = Arc::clone(self);
        tokio::spawn(async move { loader.run(cancel).await })
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let (pending_tx, pending_rx) = watch::channel::<Option<ConfigSnapshot>>(None);

        let watcher = tokio::spawn(Self::watch_loop(
            Arc::clone(&self.adapter),
            pending_tx,
            cancel.clone(),
            self.settings.watch_retry,
        ));

        self.reload_loop(pending_rx, cancel).await;

        if let Err(e) = watcher.await {
            error!(error = %e, "Config watch task panicked");
        }
        info!("Config loader stopped");
    }

    async fn watch_loop(
        adapter: Arc<dyn ConfigAdapter>,
        pending: watch::Sender<Option<ConfigSnapshot>>,
        cancel: CancellationToken,
        retry: Duration,
    ) {
        while !cancel.is_cancelled() {
            match adapter.watch(cancel.child_token()).await {
                Ok(mut snapshots) => {
                    match adapter.get_snapshot().await {
                        Ok(snapshot) => {
                            pending.send_replace(Some(snapshot));
                        }
                        Err(e) => {
                            warn!(
                                adapter = adapter.name(),
                                error = %e,
                                "Failed to resync config after watch start"
                            );
                        }
                    }

                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            next = snapshots.recv() => match next {
                                Some(snapshot) => {
                                    pending.send_replace(Some(snapshot));
                                }
                                None => {
                                    warn!(
                                        adapter = adapter.name(),
                                        "Config watch stopped, installed configuration may be stale"
                                    );
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    warn!(adapter = adapter.name(), error = %e, "Failed to start config watch");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(retry) => {
                    info!(adapter = adapter.name(), "Restarting config watch");
                }
            }
        }
    }

    async fn reload_loop(
        &self,
        mut pending: watch::Receiver<Option<ConfigSnapshot>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = pending.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }

            // the window is fixed at the first change; later ones only replace the snapshot
            let deadline = tokio::time::Instant::now() + self.settings.debounce;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break,
                    changed = pending.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            let latest = pending.borrow_and_update().clone();
            if let Some(snapshot) = latest {
                if snapshot == self.current().snapshot {
                    debug!("Snapshot matches installed configuration, skipping reload");
                    continue;
                }
                // errors are already logged and recorded by reload
                let _ = self.reload(snapshot).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configman::memory::MemoryAdapter;
    use crate::resource::codec::ResourceTypeKey;
    use crate::resource::document::Document;
    use crate::sources::builtin::{builtin_key, builtin_registry};
    use crate::sources::host::LocalHost;

    fn taskqueue(name: &str) -> Document {
        Document::new(&builtin_key("taskqueues"), "TaskQueue", name)
    }

    fn snapshot_of(docs: Vec<Document>) -> ConfigSnapshot {
        docs.into_iter().collect()
    }

    async fn loader_with(initial: ConfigSnapshot) -> (Arc<ConfigLoader>, Arc<MemoryAdapter>) {
        let adapter = Arc::new(MemoryAdapter::new(initial));
        let loader = ConfigLoader::start(
            adapter.clone(),
            Arc::new(builtin_registry().unwrap()),
            Arc::new(LocalHost::new(["tasks"])),
            LoaderSettings {
                debounce: Duration::from_millis(100),
                watch_retry: Duration::from_millis(50),
            },
        )
        .await
        .unwrap();
        (loader, adapter)
    }

    #[tokio::test]
    async fn test_cold_start_installs_generation_one() {
        let (loader, _) = loader_with(snapshot_of(vec![taskqueue("jobs")])).await;
        let current = loader.current();
        assert_eq!(current.generation, 1);
        assert_eq!(loader.get_sources("default", "tasks").len(), 1);
        assert!(loader.host().is_provider_live("tasks"));
    }

    #[tokio::test]
    async fn test_cold_start_fails_when_nothing_is_realisable() {
        let unknown = ResourceTypeKey::new("other.io", "v1", "mysteries");
        let mut snapshot = ConfigSnapshot::new();
        snapshot.push(unknown.token(), Document::new(&unknown, "Mystery", "m"));

        let result = ConfigLoader::start(
            Arc::new(MemoryAdapter::new(snapshot)),
            Arc::new(builtin_registry().unwrap()),
            Arc::new(LocalHost::new(["tasks"])),
            LoaderSettings::default(),
        )
        .await;
        assert!(matches!(result, Err(GatewayError::Fatal { .. })));
    }

    #[tokio::test]
    async fn test_manual_reload_bumps_generation() {
        let (loader, _) = loader_with(ConfigSnapshot::new()).await;
        let config = loader
            .reload(snapshot_of(vec![taskqueue("a"), taskqueue("b")]))
            .await
            .unwrap();
        assert_eq!(config.generation, 2);
        assert_eq!(loader.current().generation, 2);
        assert_eq!(loader.get_sources("default", "tasks").len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_reload_keeps_previous_config() {
        let (loader, _) = loader_with(snapshot_of(vec![taskqueue("jobs")])).await;
        let mut events = loader.subscribe();

        let bad = taskqueue("broken").with_spec(serde_yaml::from_str("priority: nope").unwrap());
        assert!(loader.reload(snapshot_of(vec![bad])).await.is_err());

        assert_eq!(loader.current().generation, 1);
        assert_eq!(loader.get_sources("default", "tasks")[0].name(), "jobs");
        assert!(loader.last_error().is_some());
        assert!(matches!(events.recv().await.unwrap(), ReloadEvent::Rejected { .. }));

        // the failed attempt does not burn a generation number
        let config = loader.reload(snapshot_of(vec![taskqueue("next")])).await.unwrap();
        assert_eq!(config.generation, 2);
        assert!(loader.last_error().is_none());
    }

    #[tokio::test]
    async fn test_watch_pipeline_reloads_on_change() {
        let (loader, adapter) = loader_with(ConfigSnapshot::new()).await;
        let mut events = loader.subscribe();
        let cancel = CancellationToken::new();
        let handle = loader.spawn(cancel.clone());

        // give the watch task time to subscribe
        tokio::time::sleep(Duration::from_millis(50)).await;
        adapter.replace(snapshot_of(vec![taskqueue("jobs")]));

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, ReloadEvent::Applied { generation: 2, .. }));

        cancel.cancel();
        handle.await.unwrap();
    }
}
