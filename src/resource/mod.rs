//! # Resources
//!
//! Declarative documents, the identifiers that name their kinds and the
//! registry of kinds the process knows how to build.

pub mod codec;
pub mod document;
pub mod registry;

pub use codec::{ModuleToken, ResourceTypeKey};
pub use document::{ConfigSnapshot, Document, DocumentFilter, ObjectMeta};
pub use registry::{RegistryBuilder, SourceContext, SourceRegistry};
