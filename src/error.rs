//! Error types for XSLT consolidation

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StylesheetError {
    #[error("Failed to load stylesheet from {path}: {reason}")]
    LoadError { path: String, reason: String },

    #[error("Referenced stylesheet '{href}' not found (resolved to {path})")]
    ReferenceNotFound { href: String, path: String },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid stylesheet structure: {0}")]
    InvalidStructure(String),

    #[error("Cycle detected: '{0}' is already being consolidated")]
    CycleDetected(String),

    #[error("Reference '{href}' exceeds the maximum consolidation depth of {limit}")]
    DepthLimitExceeded { href: String, limit: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] xot::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}
