//! # Error Module
//!
//! Error types for the declutter engine.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Per-file failures are not fatal** - batch operations count and skip
//!   them; only orchestration-level failures surface as errors
//! - **Cancellation is not an error** - it is a normal early-exit path, but
//!   it gets a variant so callers can tell the two apart

use std::path::PathBuf;
use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug)]
pub enum DeclutterError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur while collecting the file inventory
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Scan was cancelled")]
    Cancelled,
}

/// Errors that occur while hashing file contents or image pixels
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Image is empty or corrupted: {path}")]
    EmptyImage { path: PathBuf },
}

/// Errors that occur during the junk classification walk
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Directory not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Classification was cancelled")]
    Cancelled,
}

impl HashError {
    /// True when the file could not be read at all, as opposed to being
    /// readable but not decodable as an image.
    pub fn is_io(&self) -> bool {
        matches!(self, HashError::Io { .. })
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DeclutterError>;
