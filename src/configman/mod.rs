//! # Configuration Management
//!
//! Adapters that store declarative documents and the loader that turns their
//! snapshots into the running configuration.

pub mod adapter;
pub mod file;
pub mod loader;
pub mod memory;
pub mod remote;

pub use adapter::ConfigAdapter;
pub use file::FileAdapter;
pub use loader::{ConfigLoader, LoaderSettings, ReloadEvent, RuntimeConfig};
pub use memory::MemoryAdapter;
pub use remote::RemoteAdapter;

use std::sync::Arc;

use crate::core::config::{AdapterConfig, LoaderConfig};
use crate::core::error::GatewayResult;

/// Build the adapter named in the settings
pub async fn build_adapter(config: &AdapterConfig) -> GatewayResult<Arc<dyn ConfigAdapter>> {
    let adapter: Arc<dyn ConfigAdapter> = match config {
        AdapterConfig::File { path } => Arc::new(FileAdapter::open(path).await?),
        AdapterConfig::Remote {
            base_url,
            poll_interval,
            timeout,
        } => Arc::new(RemoteAdapter::new(base_url.clone(), *poll_interval, *timeout)?),
    };
    Ok(adapter)
}

impl From<&LoaderConfig> for LoaderSettings {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            debounce: config.debounce,
            watch_retry: config.watch_retry,
        }
    }
}
