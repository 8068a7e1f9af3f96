//! Shared result and inventory records.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// An immutable snapshot of one file, supplied by the caller.
///
/// The engine never re-reads this metadata; if the file changes on disk the
/// caller is responsible for supplying a fresh record (and invalidating any
/// cached hashes for the path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    /// Size in bytes at snapshot time
    pub size: u64,
    /// Last modification time, milliseconds since the Unix epoch
    pub modified_ms: i64,
    /// Mime type, e.g. `image/jpeg`; `application/octet-stream` when unknown
    pub mime_type: String,
}

impl FileRecord {
    pub fn new(
        path: impl Into<PathBuf>,
        size: u64,
        modified_ms: i64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            modified_ms,
            mime_type: mime_type.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// Why a group's members are considered duplicates of one another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKey {
    /// Identical content digest
    ExactHash(String),
    /// Perceptual hashes within the similarity threshold of the seed hash
    Perceptual(String),
    /// Matching (duration, resolution) video signature
    VideoSignature(String),
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKey::ExactHash(h) => write!(f, "exact:{}", h),
            MatchKey::Perceptual(h) => write!(f, "visual:{}", h),
            MatchKey::VideoSignature(s) => write!(f, "video:{}", s),
        }
    }
}

/// A set of two or more files considered copies of one another, with one
/// member designated to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: Uuid,
    pub files: Vec<FileRecord>,
    /// Sum of all member sizes
    pub total_size: u64,
    pub match_key: MatchKey,
    /// Path of the member the selector chose to retain; always one of `files`
    pub keep_file: PathBuf,
}

impl DuplicateGroup {
    /// Build a group. `keep_file` starts as the first member and is replaced
    /// by the selector during finalization.
    pub fn new(files: Vec<FileRecord>, match_key: MatchKey) -> Self {
        debug_assert!(files.len() >= 2);
        let total_size = files.iter().map(|f| f.size).sum();
        let keep_file = files[0].path.clone();
        Self {
            id: Uuid::new_v4(),
            files,
            total_size,
            match_key,
            keep_file,
        }
    }

    /// Members other than the kept one.
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Bytes freed if every member except the kept one were removed.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.path != self.keep_file)
            .map(|f| f.size)
            .sum()
    }
}

/// The junk buckets the classifier produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunkKind {
    Cache,
    Temp,
    ObsoletePackage,
    LargeFile,
    Residual,
    EmptyFolder,
}

impl JunkKind {
    pub fn name(&self) -> &'static str {
        match self {
            JunkKind::Cache => "cache",
            JunkKind::Temp => "temp_files",
            JunkKind::ObsoletePackage => "obsolete_packages",
            JunkKind::LargeFile => "large_files",
            JunkKind::Residual => "residual_files",
            JunkKind::EmptyFolder => "empty_folders",
        }
    }

    /// Display/cleanup ordering; lower is shown first.
    pub fn priority(&self) -> u8 {
        match self {
            JunkKind::Cache => 0,
            JunkKind::Temp => 1,
            JunkKind::ObsoletePackage => 2,
            JunkKind::Residual => 3,
            JunkKind::LargeFile => 4,
            JunkKind::EmptyFolder => 5,
        }
    }

    /// Whether the category is safe to clean without per-file confirmation.
    /// Oversized, residual, and package files stay user-confirmed.
    pub fn can_auto_clean(&self) -> bool {
        matches!(
            self,
            JunkKind::Cache | JunkKind::Temp | JunkKind::EmptyFolder
        )
    }
}

impl std::fmt::Display for JunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One file (or empty directory) inside a junk category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunkFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified_ms: i64,
    /// Verdict of the caller's safety predicate for this path
    pub can_delete: bool,
    /// Human-readable explanation of why the file is here
    pub reason: String,
}

/// A named bucket of cleanup candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunkCategory {
    pub id: Uuid,
    pub kind: JunkKind,
    pub files: Vec<JunkFile>,
    pub total_size: u64,
    pub can_auto_clean: bool,
    pub priority: u8,
}

impl JunkCategory {
    pub fn new(kind: JunkKind, files: Vec<JunkFile>) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        Self {
            id: Uuid::new_v4(),
            kind,
            files,
            total_size,
            can_auto_clean: kind.can_auto_clean(),
            priority: kind.priority(),
        }
    }
}

/// Milliseconds since the Unix epoch, clamped to 0 for pre-epoch times.
pub fn millis_since_epoch(time: std::time::SystemTime) -> i64 {
    time.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Mime type guessed from a file extension.
///
/// Deliberately small: the engine only needs to tell images and videos from
/// everything else, plus recognize package archives.
pub fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" | "heif" => "image/heic",
        "tif" | "tiff" => "image/tiff",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "3gp" => "video/3gpp",
        "apk" => "application/vnd.android.package-archive",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}
