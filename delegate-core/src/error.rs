//! src/error.rs
//! ============================================================================
//! # `DelegateError`: errors at the fallible seams of the delegation layer
//!
//! Registration and dispatch never fail: a missing root, an unknown event type
//! or a selector that matches nothing all degrade to "no dispatch". This type
//! covers the places that can genuinely fail: parsing selectors, attaching
//! native listeners on a host, and the configuration/logging setup.

use std::{io, path::PathBuf};
use thiserror::Error;

/// Unified error type for delegation hosts and setup.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// Selector string could not be parsed.
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The host refused a listener operation (e.g. `addEventListener` threw).
    #[error("Host operation '{operation}' failed: {message}")]
    Host { operation: String, message: String },

    /// Element handle does not belong to the host it was used with.
    #[error("Unknown element: {0}")]
    UnknownElement(String),

    /// TOML config parsing error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// Config file I/O error with path.
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DelegateError {
    /// Create a selector parse error
    pub fn invalid_selector<S1: Into<String>, S2: Into<String>>(selector: S1, reason: S2) -> Self {
        Self::InvalidSelector {
            selector: selector.into(),
            reason: reason.into(),
        }
    }

    /// Create a host operation error
    pub fn host<S1: Into<String>, S2: Into<String>>(operation: S1, message: S2) -> Self {
        Self::Host {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
