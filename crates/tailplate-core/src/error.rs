//! Inline template error types

use std::path::PathBuf;

use thiserror::Error;

use crate::{call_site::CallSite, engine::BoxError};

/// Errors surfaced by [`crate::InlineCache::render`]
///
/// None of these are recovered internally: a broken inline template fails
/// the render instead of producing partial or stale output.
#[derive(Debug, Error)]
pub enum InlineError {
    /// The source file backing a call site is missing or unreadable
    #[error("Failed to read inline template source {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The call site names an engine that was never registered
    #[error("Unknown template engine: {name}")]
    UnknownEngine { name: String },

    /// The extracted template body was rejected by its engine
    #[error("Failed to compile inline template at {call_site}: {source}")]
    Compile {
        call_site: CallSite,
        #[source]
        source: BoxError,
    },

    /// The compiled template failed while evaluating
    #[error("Failed to render inline template at {call_site}: {source}")]
    Render {
        call_site: CallSite,
        #[source]
        source: BoxError,
    },
}

impl InlineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Call site the failure is attributed to, when known
    pub fn call_site(&self) -> Option<&CallSite> {
        match self {
            Self::Compile { call_site, .. } | Self::Render { call_site, .. } => Some(call_site),
            Self::Io { .. } | Self::UnknownEngine { .. } => None,
        }
    }

    /// The engine's own error for compile and render failures
    ///
    /// Downcast it to the engine's error type to inspect engine-specific
    /// details.
    pub fn engine_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Compile { source, .. } | Self::Render { source, .. } => Some(source.as_ref()),
            Self::Io { .. } | Self::UnknownEngine { .. } => None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration source error: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
