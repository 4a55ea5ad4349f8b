//! Error types shared by every turbocache crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for turbocache operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Configuration or validation error, fatal before the daemon serves traffic
    #[error("Configuration error: {message}")]
    #[diagnostic(code(turbocache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
        /// Optional hint shown below the error
        #[help]
        help: Option<String>,
    },

    /// I/O error during storage or daemon operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(turbocache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// A cache key the backend would reject
    #[error("Invalid cache key '{key}': {reason}")]
    #[diagnostic(code(turbocache::storage::invalid_key))]
    InvalidKey {
        /// The offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// The active provider cannot perform this operation
    #[error("The {provider} provider does not support {operation}")]
    #[diagnostic(
        code(turbocache::storage::unsupported),
        help("Retention only runs against providers that can list their entries")
    )]
    Unsupported {
        /// Provider name
        provider: &'static str,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// A remote backend call failed
    #[error("{provider} {operation} failed{}: {message}", status.map_or(String::new(), |s| format!(" (HTTP {s})")))]
    #[diagnostic(code(turbocache::storage::backend))]
    Backend {
        /// Provider name
        provider: &'static str,
        /// Operation that failed
        operation: &'static str,
        /// Backend-supplied detail
        message: String,
        /// HTTP status, when the backend answered at all
        status: Option<u16>,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            help: None,
        }
    }

    /// Create a configuration error with a hint
    #[must_use]
    pub fn configuration_with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            help: Some(help.into()),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create an invalid key error
    #[must_use]
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error
    #[must_use]
    pub const fn unsupported(provider: &'static str, operation: &'static str) -> Self {
        Self::Unsupported {
            provider,
            operation,
        }
    }

    /// Create a backend error
    #[must_use]
    pub fn backend(
        provider: &'static str,
        operation: &'static str,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::Backend {
            provider,
            operation,
            message: message.into(),
            status,
        }
    }

    /// Whether this is the unsupported-operation error
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Result type for turbocache operations
pub type Result<T> = std::result::Result<T, Error>;
