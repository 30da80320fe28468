//! Error handling for fieldnet
//!
//! This module defines the crate-level error type and a Result alias used
//! by configuration loading and the binary. Graph operations report the
//! more specific [`GraphError`](crate::graph::GraphError), which converts
//! into [`FieldNetError`] with `?`.

use crate::graph::GraphError;
use thiserror::Error;

/// Main error type for fieldnet operations
#[derive(Error, Debug)]
pub enum FieldNetError {
    /// Errors raised by the processing graph
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FieldNetError>,
    },
}

impl FieldNetError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FieldNetError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for fieldnet operations
pub type Result<T> = std::result::Result<T, FieldNetError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, GraphError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| FieldNetError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FieldNetError::from(e).with_context(f()))
    }
}
