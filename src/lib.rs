//! # Resource Gateway - Control Plane Library
//!
//! Configuration core of an API gateway. Declarative documents
//! (`apiVersion`/`kind`/`metadata`/`spec`) are read from a pluggable store,
//! turned into prioritised data sources grouped by workspace and provider,
//! and hot-reloaded when the store changes.
//!
//! ## Module Layout
//! - `core`: error type and process settings
//! - `resource`: documents, resource identifiers and the kind registry
//! - `sources`: source composition, dependency checks and built-in kinds
//! - `configman`: configuration adapters and the reload pipeline
//! - `admin`: HTTP endpoints over the adapter and installed configuration
//! - `observability`: logging setup
//!
//! ## Data Flow
//! ```text
//! adapter --snapshot--> loader --compose--> SourceMap --host.load--> installed
//!    ^                                                                   |
//!    +---------------------- admin API (apply/delete) ------------------+
//! ```

/// Error types and process settings
pub mod core;

/// Declarative documents and resource type identifiers
pub mod resource;

/// Source trait, composition and dependency resolution
pub mod sources;

/// Configuration adapters and the config loader
pub mod configman;

/// Admin HTTP endpoints
pub mod admin;

/// Logging initialisation
pub mod observability;

// Re-export commonly used types for convenience
pub use core::config::GatewayConfig;
pub use core::error::{GatewayError, GatewayResult};

pub use resource::codec::{decode, encode, ModuleToken, ResourceTypeKey};
pub use resource::document::{ConfigSnapshot, Document};
pub use resource::registry::SourceRegistry;

pub use sources::{ModuleHost, Source, SourceMap};

pub use configman::{ConfigAdapter, ConfigLoader};
