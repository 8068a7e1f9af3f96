//! # Classifier Module
//!
//! Walks directory trees and buckets files into junk categories: cache
//! contents, temporary files, obsolete package archives, oversized files,
//! residue of uninstalled apps, and empty folders.
//!
//! ## Walk shape
//! The walk is iterative with an explicit stack of pending directories, so
//! pathologically deep trees cannot overflow the call stack and the
//! cancellation check sits in exactly one place. Every file lands in at most
//! one category; the per-file checks run in a fixed priority order.
//!
//! ## Safety
//! The caller's [`SafetyPolicy`] is consulted before recursing into any
//! directory and before marking anything deletable. A `false` answer is
//! final. The classifier itself never deletes anything.

mod rules;

pub use rules::{
    ArchiveInspector, ArchiveVerdict, JunkPatterns, NoopArchiveInspector, PackageInfo,
    PackageRegistry, PermissiveSafety, SafetyPolicy, StaticPackageRegistry, CACHE_DIR_TOKENS,
    TEMP_EXTENSIONS,
};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::cancel::CancelToken;
use crate::core::types::{millis_since_epoch, JunkCategory, JunkFile, JunkKind};
use crate::events::{EventSender, PartialUpdate, ProgressEvent, ProgressTracker};

/// Tunables for one classification walk.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Files strictly larger than this are oversized (default 100 MiB)
    pub large_file_bytes: u64,
    /// Roots of per-app private data; first component beneath names the
    /// owning package
    pub app_data_roots: Vec<PathBuf>,
    /// Extensions treated as package archives
    pub package_extensions: Vec<String>,
    /// Caller's estimate of total files, for the progress percent; grows on
    /// the fly when absent
    pub estimated_total: Option<usize>,
    /// Minimum wall time between progress emissions
    pub progress_interval: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            large_file_bytes: 100 * 1024 * 1024,
            app_data_roots: Vec::new(),
            package_extensions: vec!["apk".to_string()],
            estimated_total: None,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of one classification walk. Valid even when cancelled: whatever
/// was found before the token fired is kept.
#[derive(Debug)]
pub struct ClassifyResult {
    /// Non-empty categories, ordered by category priority
    pub categories: Vec<JunkCategory>,
    pub scanned_files: usize,
    pub error_count: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ClassifyResult {
    /// Total bytes across all categories.
    pub fn total_junk_bytes(&self) -> u64 {
        self.categories.iter().map(|c| c.total_size).sum()
    }
}

/// Walks directory trees and produces [`JunkCategory`] buckets.
pub struct DirectoryClassifier<'a> {
    config: ClassifierConfig,
    patterns: JunkPatterns,
    safety: &'a dyn SafetyPolicy,
    registry: &'a dyn PackageRegistry,
    inspector: &'a dyn ArchiveInspector,
}

/// Accumulated walk state, threaded through the helpers.
struct WalkState {
    buckets: HashMap<JunkKind, Vec<JunkFile>>,
    scanned: usize,
    errors: usize,
    estimate: usize,
    cancelled: bool,
}

impl WalkState {
    fn add(&mut self, kind: JunkKind, file: JunkFile) {
        self.buckets.entry(kind).or_default().push(file);
    }
}

impl<'a> DirectoryClassifier<'a> {
    pub fn new(
        config: ClassifierConfig,
        safety: &'a dyn SafetyPolicy,
        registry: &'a dyn PackageRegistry,
        inspector: &'a dyn ArchiveInspector,
    ) -> Self {
        Self {
            config,
            patterns: JunkPatterns::new(),
            safety,
            registry,
            inspector,
        }
    }

    /// Walk `roots` and classify everything beneath them.
    ///
    /// Emits throttled progress plus exactly one terminal event, and checks
    /// the cancellation token between every entry.
    pub fn classify(
        &self,
        roots: &[PathBuf],
        events: &EventSender,
        cancel: &CancelToken,
    ) -> ClassifyResult {
        let start = Instant::now();
        let mut tracker =
            ProgressTracker::throttled(events.clone(), self.config.progress_interval);
        tracker.update(ProgressEvent::running(5, "scanning for junk", 0, 0));

        let mut state = WalkState {
            buckets: HashMap::new(),
            scanned: 0,
            errors: 0,
            estimate: self.config.estimated_total.unwrap_or(0),
            cancelled: false,
        };

        let root_set: HashSet<&Path> = roots.iter().map(|p| p.as_path()).collect();
        let mut stack: Vec<PathBuf> = Vec::new();
        for root in roots {
            if root.is_dir() {
                stack.push(root.clone());
            } else {
                warn!(root = %root.display(), "classification root missing or not a directory");
                state.errors += 1;
            }
        }

        'walk: while let Some(dir) = stack.pop() {
            if cancel.is_cancelled() {
                state.cancelled = true;
                break;
            }

            if !self.safety.is_safe_to_scan(&dir) {
                debug!(dir = %dir.display(), "skipping protected directory");
                continue;
            }

            let entries = match std::fs::read_dir(&dir) {
                Ok(iter) => {
                    let mut entries = Vec::new();
                    for entry in iter {
                        match entry {
                            Ok(e) => entries.push(e),
                            Err(_) => state.errors += 1,
                        }
                    }
                    entries
                }
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "failed to read directory");
                    state.errors += 1;
                    continue;
                }
            };

            if entries.is_empty() && !root_set.contains(dir.as_path()) {
                self.record_empty_folder(&dir, &mut state);
                continue;
            }

            for entry in entries {
                if cancel.is_cancelled() {
                    state.cancelled = true;
                    break 'walk;
                }

                let path = entry.path();
                let file_type = match entry.file_type() {
                    Ok(t) => t,
                    Err(_) => {
                        state.errors += 1;
                        continue;
                    }
                };

                if file_type.is_dir() {
                    let name = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default();
                    if !self.safety.is_safe_to_scan(&path) {
                        debug!(dir = %path.display(), "skipping protected directory");
                    } else if self.patterns.is_cache_dir_name(name) {
                        self.collect_cache_subtree(&path, &mut state, cancel);
                        if state.cancelled {
                            break 'walk;
                        }
                    } else {
                        stack.push(path);
                    }
                } else if file_type.is_file() {
                    let junk = self.classify_file(&path, &mut state);
                    self.emit_progress(&mut tracker, &state, junk);
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        let mut categories: Vec<JunkCategory> = state
            .buckets
            .into_iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(kind, files)| JunkCategory::new(kind, files))
            .collect();
        categories.sort_by_key(|c| c.priority);

        if state.cancelled {
            tracker.terminal(ProgressEvent::cancelled(
                tracker.percent(),
                state.scanned,
                state.estimate,
            ));
        } else {
            let junk_count: usize = categories.iter().map(|c| c.files.len()).sum();
            tracker.terminal(ProgressEvent::finished(
                format!("classified {} junk files", junk_count),
                state.scanned,
                state.scanned,
            ));
        }

        ClassifyResult {
            categories,
            scanned_files: state.scanned,
            error_count: state.errors,
            cancelled: state.cancelled,
            duration_ms,
        }
    }

    fn emit_progress(
        &self,
        tracker: &mut ProgressTracker,
        state: &WalkState,
        junk: Option<PartialUpdate>,
    ) {
        let estimate = state.estimate.max(state.scanned + 1);
        // 5-90 band; finalize owns the jump to 100.
        let percent = 5 + (state.scanned * 85 / estimate).min(85) as u8;
        let mut event = ProgressEvent::running(
            percent.min(90),
            "scanning for junk",
            state.scanned,
            estimate,
        );
        if let Some(junk) = junk {
            event = event.with_partial(junk);
        }
        tracker.update(event);
    }

    fn record_empty_folder(&self, dir: &Path, state: &mut WalkState) {
        if !self.safety.is_safe_to_delete(dir) {
            return;
        }
        let modified_ms = std::fs::metadata(dir)
            .and_then(|m| m.modified())
            .map(millis_since_epoch)
            .unwrap_or(0);
        state.add(
            JunkKind::EmptyFolder,
            JunkFile {
                path: dir.to_path_buf(),
                size: 0,
                modified_ms,
                can_delete: true,
                reason: "empty directory".to_string(),
            },
        );
    }

    /// Everything under a cache directory is cache junk; no per-file
    /// heuristics apply inside.
    fn collect_cache_subtree(&self, dir: &Path, state: &mut WalkState, cancel: &CancelToken) {
        for entry in WalkDir::new(dir).into_iter() {
            if cancel.is_cancelled() {
                state.cancelled = true;
                return;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(_) => {
                    state.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => {
                    state.errors += 1;
                    continue;
                }
            };
            state.scanned += 1;
            state.add(
                JunkKind::Cache,
                JunkFile {
                    path: entry.path().to_path_buf(),
                    size: metadata.len(),
                    modified_ms: metadata.modified().map(millis_since_epoch).unwrap_or(0),
                    can_delete: self.safety.is_safe_to_delete(entry.path()),
                    reason: "inside cache directory".to_string(),
                },
            );
        }
    }

    /// Apply the per-file heuristics in priority order; at most one matches.
    /// Returns a partial-update payload when the file was junked.
    fn classify_file(&self, path: &Path, state: &mut WalkState) -> Option<PartialUpdate> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => {
                state.errors += 1;
                return None;
            }
        };
        state.scanned += 1;

        let (kind, reason) = self.file_verdict(path, metadata.len())?;
        let size = metadata.len();
        state.add(
            kind,
            JunkFile {
                path: path.to_path_buf(),
                size,
                modified_ms: metadata.modified().map(millis_since_epoch).unwrap_or(0),
                can_delete: self.safety.is_safe_to_delete(path),
                reason,
            },
        );
        Some(PartialUpdate::JunkFound {
            path: path.to_path_buf(),
            size,
        })
    }

    fn file_verdict(&self, path: &Path, size: u64) -> Option<(JunkKind, String)> {
        if self.patterns.is_temp_file(path) {
            return Some((
                JunkKind::Temp,
                "matches temporary file pattern".to_string(),
            ));
        }

        if self.is_package_archive(path) {
            match self.inspector.inspect(path) {
                ArchiveVerdict::Package(info) => {
                    if let Some(installed) = self.registry.installed_version(&info.name) {
                        if installed >= info.version_code {
                            return Some((
                                JunkKind::ObsoletePackage,
                                format!(
                                    "superseded by installed version {} of {}",
                                    installed, info.name
                                ),
                            ));
                        }
                    }
                }
                ArchiveVerdict::Corrupt => {
                    return Some((JunkKind::ObsoletePackage, "unreadable archive".to_string()));
                }
                ArchiveVerdict::Unsupported => {}
            }
        }

        if size > self.config.large_file_bytes {
            return Some((
                JunkKind::LargeFile,
                format!("larger than {} MiB", self.config.large_file_bytes / (1024 * 1024)),
            ));
        }

        if let Some(owner) = self.residual_owner(path) {
            return Some((
                JunkKind::Residual,
                format!("data left by uninstalled package {}", owner),
            ));
        }

        None
    }

    fn is_package_archive(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let lowered = e.to_ascii_lowercase();
                self.config
                    .package_extensions
                    .iter()
                    .any(|p| p.as_str() == lowered)
            })
            .unwrap_or(false)
    }

    /// The package owning `path` if it lies under an app-data root and that
    /// package is no longer installed.
    fn residual_owner(&self, path: &Path) -> Option<String> {
        for root in &self.config.app_data_roots {
            if let Ok(rest) = path.strip_prefix(root) {
                let owner = rest
                    .components()
                    .next()
                    .and_then(|c| c.as_os_str().to_str())?
                    .to_string();
                if !self.registry.is_installed(&owner) {
                    return Some(owner);
                }
                return None;
            }
        }
        None
    }
}
