//! # Scanner Module
//!
//! Turns directories into a flat [`FileRecord`] inventory for the pipeline.
//!
//! The engine itself only consumes the records it is handed; this collector
//! is the convenience implementation of that contract used by the CLI and
//! the tests. Per-entry failures are captured and returned alongside the
//! records, never raised.

use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

use crate::core::types::{millis_since_epoch, mime_for_path, FileRecord};
use crate::error::ScanError;

/// Configuration for inventory collection.
#[derive(Debug, Clone)]
pub struct InventoryOptions {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
}

impl Default for InventoryOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: false,
            max_depth: None,
        }
    }
}

/// The collected inventory plus everything that could not be read.
#[derive(Debug, Default)]
pub struct InventoryResult {
    pub files: Vec<FileRecord>,
    pub errors: Vec<ScanError>,
}

/// Walk `paths` and snapshot every regular file into a [`FileRecord`].
pub fn collect_inventory(paths: &[PathBuf], options: &InventoryOptions) -> InventoryResult {
    let mut result = InventoryResult::default();

    for root in paths {
        if !root.is_dir() {
            result.errors.push(ScanError::DirectoryNotFound {
                path: root.clone(),
            });
            continue;
        }

        let mut walker = WalkDir::new(root).follow_links(options.follow_symlinks);
        if let Some(depth) = options.max_depth {
            walker = walker.max_depth(depth);
        }

        let include_hidden = options.include_hidden;
        let walker = walker.into_iter().filter_entry(move |entry| {
            if include_hidden || entry.depth() == 0 {
                return true;
            }
            entry
                .file_name()
                .to_str()
                .map(|name| !name.starts_with('.'))
                .unwrap_or(true)
        });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    let error = if e.io_error().map(|io| io.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        ScanError::PermissionDenied { path }
                    } else {
                        ScanError::Read {
                            path,
                            source: std::io::Error::other(e.to_string()),
                        }
                    };
                    result.errors.push(error);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    result.files.push(FileRecord::new(
                        entry.path(),
                        metadata.len(),
                        metadata.modified().map(millis_since_epoch).unwrap_or(0),
                        mime_for_path(entry.path()),
                    ));
                }
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "unreadable metadata");
                    result.errors.push(ScanError::Read {
                        path: entry.path().to_path_buf(),
                        source: std::io::Error::other(e.to_string()),
                    });
                }
            }
        }
    }

    result
}
