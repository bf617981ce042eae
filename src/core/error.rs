//! # Error Handling Module
//!
//! Every failure in the control plane is a `GatewayError`. The variants follow
//! the way failures propagate through a reconciliation cycle:
//!
//! - **Structural** errors (malformed token, malformed document, unknown kind)
//!   are logged and the offending unit is skipped.
//! - **Instantiation** errors belong to a single document; the rest of the
//!   snapshot proceeds without it.
//! - **Dependency** errors are handed back to the provider that asked.
//! - **Adapter** errors are transient I/O failures of a configuration source;
//!   the installed configuration stays in place.
//! - **Fatal** errors mean no valid configuration could be produced at all.
//!
//! ## The `?` Operator
//! Conversions from `std::io::Error`, `serde_yaml::Error`, `serde_json::Error`,
//! `reqwest::Error` and `notify::Error` are implemented below, so adapter code
//! can propagate library errors with `?`:
//! ```rust,ignore
//! async fn read(path: &Path) -> GatewayResult<Vec<GatewayResult<Document>>> {
//!     let content = tokio::fs::read_to_string(path).await?;
//!     parse_documents(&content)
//! }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the gateway control plane
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Process settings are invalid or could not be read
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Malformed module token or declarative document
    #[error("Structural error: {message}")]
    Structural { message: String },

    /// A snapshot references a resource kind nobody registered
    #[error("Unknown resource kind: {token}")]
    UnknownResource { token: String },

    /// The host failed to build a live source from one document
    #[error("Failed to instantiate {document}: {reason}")]
    Instantiation { document: String, reason: String },

    /// A provider a source depends on is not live yet
    #[error("Provider '{provider}' is not live yet")]
    Dependency { provider: String },

    /// A configuration adapter failed to read, write or watch
    #[error("Adapter error ({adapter}): {message}")]
    Adapter { adapter: String, message: String },

    /// Requested resource does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Admin request was rejected before reaching the adapter
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// No usable configuration could be produced
    #[error("Fatal error: {message}")]
    Fatal { message: String },

    /// I/O errors (file operations, sockets)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for declarative documents and settings
    #[error("YAML error: {message}")]
    Yaml { message: String },

    /// HTTP client errors when talking to a remote configuration API
    #[error("HTTP client error: {message}")]
    HttpClient { message: String },

    /// File system watcher errors
    #[error("Watch error: {message}")]
    Watch { message: String },
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a structural error for a malformed token or document
    pub fn structural<S: Into<String>>(message: S) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    pub fn unknown_resource<S: Into<String>>(token: S) -> Self {
        Self::UnknownResource {
            token: token.into(),
        }
    }

    /// Create an instantiation error naming the failed document
    pub fn instantiation<D: Into<String>, R: Into<String>>(document: D, reason: R) -> Self {
        Self::Instantiation {
            document: document.into(),
            reason: reason.into(),
        }
    }

    pub fn dependency<S: Into<String>>(provider: S) -> Self {
        Self::Dependency {
            provider: provider.into(),
        }
    }

    /// Create an adapter error tagged with the adapter name
    pub fn adapter<A: Into<String>, M: Into<String>>(adapter: A, message: M) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(reason: S) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Structural { .. } => StatusCode::BAD_REQUEST,
            Self::UnknownResource { .. } => StatusCode::BAD_REQUEST,
            Self::Instantiation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Adapter { .. } => StatusCode::BAD_GATEWAY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Fatal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Json { .. } => StatusCode::BAD_REQUEST,
            Self::Yaml { .. } => StatusCode::BAD_REQUEST,
            Self::HttpClient { .. } => StatusCode::BAD_GATEWAY,
            Self::Watch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if the failed operation is worth retrying
    ///
    /// Adapter and transport failures are transient; structural problems with a
    /// document will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Adapter { .. }
                | Self::Io { .. }
                | Self::HttpClient { .. }
                | Self::Watch { .. }
                | Self::Dependency { .. }
        )
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Structural { .. } => "structural_error",
            Self::UnknownResource { .. } => "unknown_resource",
            Self::Instantiation { .. } => "instantiation_error",
            Self::Dependency { .. } => "dependency_error",
            Self::Adapter { .. } => "adapter_error",
            Self::NotFound { .. } => "not_found",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Fatal { .. } => "fatal_error",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
            Self::Yaml { .. } => "yaml_error",
            Self::HttpClient { .. } => "http_client_error",
            Self::Watch { .. } => "watch_error",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpClient {
            message: err.to_string(),
        }
    }
}

impl From<notify::Error> for GatewayError {
    fn from(err: notify::Error) -> Self {
        Self::Watch {
            message: err.to_string(),
        }
    }
}

/// Convert errors into structured JSON responses for the admin API
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
                "retryable": self.is_retryable(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}

/// Convenience macro for creating structural errors
///
/// Usage: `structural_error!("token '{}' has {} segments", token, n)`
#[macro_export]
macro_rules! structural_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::structural(format!($($arg)*))
    };
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid port: {}", port)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::GatewayError::config(format!($($arg)*))
    };
}
