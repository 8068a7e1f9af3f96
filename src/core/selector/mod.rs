//! # Selector Module
//!
//! Deterministic choice of which member of a duplicate group to keep.
//! No randomness anywhere: equal inputs always produce the same keep-file.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::types::FileRecord;

/// Rank of a file's location for keep-preference; lower keeps.
///
/// Canonical camera output ranks highest: of two identical photos, the copy
/// still sitting in the camera roll is the original and the one in a
/// messaging app's media folder is the forward.
pub fn location_priority(path: &Path) -> u8 {
    let lowered = path.to_string_lossy().to_ascii_lowercase();

    const MESSAGING_TOKENS: &[&str] = &["whatsapp", "telegram", "signal", "messenger", "wechat"];

    if lowered.contains("/dcim") || lowered.contains("/camera") {
        0
    } else if lowered.contains("/pictures") || lowered.contains("/photos") {
        1
    } else if lowered.contains("/download") {
        2
    } else if MESSAGING_TOKENS.iter().any(|t| lowered.contains(t)) {
        3
    } else {
        4
    }
}

/// Deterministic keep-file policies.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFileSelector;

impl BestFileSelector {
    pub fn new() -> Self {
        Self
    }

    /// Policy for exact and metadata duplicates: largest first, then newest,
    /// then best location, then lexicographic path as the final tie-break.
    pub fn select_generic<'a>(&self, files: &'a [FileRecord]) -> Option<&'a FileRecord> {
        files.iter().min_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then(b.modified_ms.cmp(&a.modified_ms))
                .then(location_priority(&a.path).cmp(&location_priority(&b.path)))
                .then(a.path.cmp(&b.path))
        })
    }

    /// Policy for visually-similar image groups: quality dominates byte
    /// size, because the largest file of a near-duplicate set may be the
    /// blurry one.
    pub fn select_visual<'a>(
        &self,
        files: &'a [FileRecord],
        quality: &HashMap<PathBuf, f64>,
    ) -> Option<&'a FileRecord> {
        let score = |f: &FileRecord| quality.get(&f.path).copied().unwrap_or(0.0);

        files.iter().min_by(|a, b| {
            score(b)
                .partial_cmp(&score(a))
                .unwrap_or(Ordering::Equal)
                .then(b.size.cmp(&a.size))
                .then(b.modified_ms.cmp(&a.modified_ms))
                .then(a.path.cmp(&b.path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, size: u64, modified_ms: i64) -> FileRecord {
        FileRecord::new(path, size, modified_ms, "image/jpeg")
    }

    #[test]
    fn location_ranking() {
        assert_eq!(location_priority(Path::new("/storage/DCIM/img.jpg")), 0);
        assert_eq!(location_priority(Path::new("/storage/Pictures/img.jpg")), 1);
        assert_eq!(location_priority(Path::new("/storage/Download/img.jpg")), 2);
        assert_eq!(
            location_priority(Path::new("/storage/WhatsApp/Media/img.jpg")),
            3
        );
        assert_eq!(location_priority(Path::new("/var/misc/img.jpg")), 4);
    }

    #[test]
    fn generic_prefers_larger() {
        let files = vec![record("/a.jpg", 100, 0), record("/b.jpg", 200, 0)];
        let keep = BestFileSelector::new().select_generic(&files).unwrap();
        assert_eq!(keep.path, PathBuf::from("/b.jpg"));
    }

    #[test]
    fn generic_breaks_size_tie_by_mtime() {
        let files = vec![record("/old.jpg", 100, 1000), record("/new.jpg", 100, 2000)];
        let keep = BestFileSelector::new().select_generic(&files).unwrap();
        assert_eq!(keep.path, PathBuf::from("/new.jpg"));
    }

    #[test]
    fn generic_breaks_full_tie_by_location() {
        let files = vec![
            record("/storage/Download/img.jpg", 100, 1000),
            record("/storage/DCIM/Camera/img.jpg", 100, 1000),
        ];
        let keep = BestFileSelector::new().select_generic(&files).unwrap();
        assert_eq!(keep.path, PathBuf::from("/storage/DCIM/Camera/img.jpg"));
    }

    #[test]
    fn generic_is_deterministic_on_identical_metadata() {
        let files = vec![record("/b.jpg", 1, 1), record("/a.jpg", 1, 1)];
        let keep = BestFileSelector::new().select_generic(&files).unwrap();
        assert_eq!(keep.path, PathBuf::from("/a.jpg"));
    }

    #[test]
    fn visual_prefers_quality_over_size() {
        let files = vec![record("/big_blurry.jpg", 900, 0), record("/small_sharp.jpg", 100, 0)];
        let quality = HashMap::from([
            (PathBuf::from("/big_blurry.jpg"), 0.3),
            (PathBuf::from("/small_sharp.jpg"), 0.9),
        ]);

        let keep = BestFileSelector::new().select_visual(&files, &quality).unwrap();
        assert_eq!(keep.path, PathBuf::from("/small_sharp.jpg"));
    }

    #[test]
    fn visual_falls_back_to_size_on_equal_quality() {
        let files = vec![record("/a.jpg", 100, 0), record("/b.jpg", 300, 0)];
        let quality = HashMap::new(); // nothing scored; all fall back to 0.0

        let keep = BestFileSelector::new().select_visual(&files, &quality).unwrap();
        assert_eq!(keep.path, PathBuf::from("/b.jpg"));
    }

    #[test]
    fn empty_slice_selects_nothing() {
        assert!(BestFileSelector::new().select_generic(&[]).is_none());
    }
}
