//! # Pipeline Module
//!
//! Orchestrates multi-phase duplicate detection over a caller-supplied file
//! inventory.
//!
//! ## Phases
//! Five ordered phases, each feeding the next, each cancellable, each
//! emitting progress inside its slice of the 0-100 range:
//!
//! | Phase            | Band   | What happens                               |
//! |------------------|--------|--------------------------------------------|
//! | init             | 0-5    | validate input, split by media kind        |
//! | size prefilter   | 5-10   | bucket by exact byte size, drop singletons |
//! | exact hash       | 10-50  | content-hash size buckets, group by digest |
//! | perceptual       | 50-80  | visual clustering of still-ungrouped images|
//! | video metadata   | 80-95  | (duration, resolution) signature grouping  |
//! | finalize         | 95-100 | drop thin groups, pick keep-files          |

mod executor;

pub use executor::DetectionPipeline;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::hasher::DEFAULT_SIMILARITY_THRESHOLD;
use crate::core::types::DuplicateGroup;

/// Tunables for one detection run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum Hamming distance for two images to be "visually similar"
    pub similarity_threshold: u32,
    /// When set, files strictly larger than this are fingerprinted with the
    /// bounded head+tail+size quick hash instead of the full digest. Off by
    /// default; the quick hash trades a small collision risk for bounded
    /// I/O on huge files.
    pub quick_hash_over: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            quick_hash_over: None,
        }
    }
}

/// Outcome of one detection run. Valid on cancellation too: groups formed
/// before the token fired are finalized and returned.
#[derive(Debug)]
pub struct PipelineResult {
    pub groups: Vec<DuplicateGroup>,
    pub total_files: usize,
    /// Per-file failures that were skipped (unreadable, undecodable)
    pub error_count: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Bytes freed if every non-kept member of every group were removed.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.iter().map(|g| g.reclaimable_bytes()).sum()
    }

    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.duplicate_count()).sum()
    }
}

/// A video's grouping signature: duration and frame size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoSignature {
    pub duration_secs: u64,
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for VideoSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s@{}x{}", self.duration_secs, self.width, self.height)
    }
}

/// Caller-supplied video metadata reader. Returning `None` keeps the file
/// out of the video phase.
pub trait VideoProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Option<VideoSignature>;
}

/// A probe for hosts without a media stack; no file gets a signature.
pub struct NullVideoProbe;

impl VideoProbe for NullVideoProbe {
    fn probe(&self, _path: &Path) -> Option<VideoSignature> {
        None
    }
}

/// Frame-level comparison of signature-matched videos.
///
/// The engine only groups by metadata; confirming that two equal-length,
/// equal-resolution videos really show the same content needs frame
/// sampling, which is outside this crate. The default implementation
/// confirms nothing, so metadata-matched videos produce no groups until a
/// host wires in a real comparator.
pub trait FrameComparator: Send + Sync {
    fn confirm(
        &self,
        signature: &VideoSignature,
        candidates: &[crate::core::types::FileRecord],
    ) -> Vec<Vec<crate::core::types::FileRecord>>;
}

/// The default comparator: confirms no matches.
pub struct NullFrameComparator;

impl FrameComparator for NullFrameComparator {
    fn confirm(
        &self,
        _signature: &VideoSignature,
        _candidates: &[crate::core::types::FileRecord],
    ) -> Vec<Vec<crate::core::types::FileRecord>> {
        Vec::new()
    }
}
