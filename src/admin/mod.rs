//! # Admin Module
//!
//! Administrative HTTP endpoints for reading and editing declarative
//! documents and inspecting the installed configuration.
//!
//! ## Security Considerations
//! Admin endpoints can change what the gateway serves and should only be
//! reachable by operators.
//!
//! ## Usage Example
//! ```rust,ignore
//! use resource_gateway::admin::{AdminRouter, AdminState};
//!
//! let router = AdminRouter::create_router(AdminState::new(loader));
//! ```

pub mod endpoints;

pub use endpoints::{AdminRouter, AdminState};
