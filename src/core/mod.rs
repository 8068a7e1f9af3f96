//! # Core Module
//!
//! The UI-agnostic declutter engine.
//!
//! ## Modules
//! - `scanner` - collects the file inventory from directories
//! - `hasher` - content and perceptual hashing with a shared cache
//! - `quality` - blur and composite quality scoring for images
//! - `classifier` - heuristic junk bucketing over directory trees
//! - `pipeline` - multi-phase duplicate detection
//! - `selector` - deterministic keep-file choice per duplicate group
//! - `cancel` - cooperative cancellation token

pub mod cancel;
pub mod classifier;
pub mod hasher;
pub mod pipeline;
pub mod quality;
pub mod scanner;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use classifier::{ClassifierConfig, ClassifyResult, DirectoryClassifier};
pub use hasher::{ContentHash, HashCache, HashService, PerceptualHash};
pub use pipeline::{DetectionPipeline, PipelineConfig, PipelineResult};
pub use quality::{QualityAnalyzer, QualityReport};
pub use selector::BestFileSelector;
pub use types::{DuplicateGroup, FileRecord, JunkCategory, JunkFile, JunkKind, MatchKey};
