//! Pipeline execution.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

use super::{
    FrameComparator, NullFrameComparator, NullVideoProbe, PipelineConfig, PipelineResult,
    VideoProbe, VideoSignature,
};
use crate::core::cancel::CancelToken;
use crate::core::hasher::{HashCache, HashService};
use crate::core::quality::QualityAnalyzer;
use crate::core::selector::BestFileSelector;
use crate::core::types::{DuplicateGroup, FileRecord, MatchKey};
use crate::events::{null_sender, EventSender, PartialUpdate, ProgressEvent, ProgressTracker};

/// Builder for [`DetectionPipeline`].
pub struct DetectionPipelineBuilder {
    config: PipelineConfig,
    hashes: Option<Arc<HashService>>,
    quality: QualityAnalyzer,
    video: Box<dyn VideoProbe>,
    frames: Box<dyn FrameComparator>,
}

impl DetectionPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            hashes: None,
            quality: QualityAnalyzer::default(),
            video: Box::new(NullVideoProbe),
            frames: Box::new(NullFrameComparator),
        }
    }

    pub fn similarity_threshold(mut self, threshold: u32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Use the bounded quick hash for files larger than `bytes`.
    pub fn quick_hash_over(mut self, bytes: u64) -> Self {
        self.config.quick_hash_over = Some(bytes);
        self
    }

    /// Share a hash service (and its cache) with other invocations.
    pub fn hash_service(mut self, hashes: Arc<HashService>) -> Self {
        self.hashes = Some(hashes);
        self
    }

    pub fn quality_analyzer(mut self, quality: QualityAnalyzer) -> Self {
        self.quality = quality;
        self
    }

    pub fn video_probe(mut self, probe: Box<dyn VideoProbe>) -> Self {
        self.video = probe;
        self
    }

    pub fn frame_comparator(mut self, frames: Box<dyn FrameComparator>) -> Self {
        self.frames = frames;
        self
    }

    pub fn build(self) -> DetectionPipeline {
        DetectionPipeline {
            config: self.config,
            hashes: self
                .hashes
                .unwrap_or_else(|| Arc::new(HashService::new(Arc::new(HashCache::new())))),
            quality: self.quality,
            selector: BestFileSelector::new(),
            video: self.video,
            frames: self.frames,
        }
    }
}

impl Default for DetectionPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The multi-phase duplicate detector.
pub struct DetectionPipeline {
    config: PipelineConfig,
    hashes: Arc<HashService>,
    quality: QualityAnalyzer,
    selector: BestFileSelector,
    video: Box<dyn VideoProbe>,
    frames: Box<dyn FrameComparator>,
}

fn update(tracker: &Mutex<ProgressTracker>, event: ProgressEvent) {
    if let Ok(mut t) = tracker.lock() {
        t.update(event);
    }
}

fn terminal(tracker: &Mutex<ProgressTracker>, event: ProgressEvent) {
    if let Ok(mut t) = tracker.lock() {
        t.terminal(event);
    }
}

fn current_percent(tracker: &Mutex<ProgressTracker>) -> u8 {
    tracker.lock().map(|t| t.percent()).unwrap_or(0)
}

impl DetectionPipeline {
    pub fn builder() -> DetectionPipelineBuilder {
        DetectionPipelineBuilder::new()
    }

    /// Run without progress reporting or cancellation.
    pub fn run(&self, files: &[FileRecord]) -> PipelineResult {
        self.run_with_events(files, &null_sender(), &CancelToken::new())
    }

    /// Run the five phases over `files`, streaming progress to `events`.
    ///
    /// Per-file failures are counted and skipped; the run itself always
    /// produces a result and always ends with a terminal event.
    pub fn run_with_events(
        &self,
        files: &[FileRecord],
        events: &EventSender,
        cancel: &CancelToken,
    ) -> PipelineResult {
        let start = Instant::now();
        let tracker = Mutex::new(ProgressTracker::new(events.clone()));
        let total = files.len();
        let mut errors = 0usize;
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut grouped: HashSet<PathBuf> = HashSet::new();

        update(
            &tracker,
            ProgressEvent::running(0, "starting duplicate scan", 0, total),
        );

        if files.is_empty() {
            terminal(&tracker, ProgressEvent::finished("nothing to scan", 0, 0));
            return PipelineResult {
                groups,
                total_files: 0,
                error_count: 0,
                cancelled: false,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        // Phase 1 (5-10): only files sharing an exact byte size can be
        // exact duplicates.
        update(
            &tracker,
            ProgressEvent::running(5, "bucketing by size", 0, total),
        );

        let mut by_size: HashMap<u64, Vec<&FileRecord>> = HashMap::new();
        for file in files {
            by_size.entry(file.size).or_default().push(file);
        }
        let candidates: Vec<&FileRecord> = by_size
            .values()
            .filter(|bucket| bucket.len() >= 2)
            .flat_map(|bucket| bucket.iter().copied())
            .collect();

        update(
            &tracker,
            ProgressEvent::running(
                10,
                format!("{} files share a size", candidates.len()),
                candidates.len(),
                total,
            ),
        );

        if cancel.is_cancelled() {
            return self.finish_cancelled(groups, &tracker, start, total, errors);
        }

        // Phase 2 (10-50): content-hash the candidates in parallel and
        // group by digest.
        let processed = AtomicUsize::new(0);
        let hash_errors = AtomicUsize::new(0);
        let candidate_count = candidates.len().max(1);
        let emit_every = (candidate_count / 32).max(1);

        let hashed: Vec<(FileRecord, String)> = candidates
            .par_iter()
            .filter_map(|file| {
                if cancel.is_cancelled() {
                    return None;
                }

                let use_quick = self
                    .config
                    .quick_hash_over
                    .map(|limit| file.size > limit)
                    .unwrap_or(false);
                let result = if use_quick {
                    self.hashes.quick_content_hash(&file.path)
                } else {
                    self.hashes.content_hash(&file.path)
                };

                let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % emit_every == 0 {
                    update(
                        &tracker,
                        ProgressEvent::running(
                            10 + (done * 40 / candidate_count) as u8,
                            "hashing candidate files",
                            done,
                            candidate_count,
                        ),
                    );
                }

                match result {
                    Ok(hash) => {
                        // Quick and full digests live in separate keyspaces
                        // so the two flavours can never form one group.
                        let key = if use_quick {
                            format!("quick:{}", hash)
                        } else {
                            hash.as_str().to_string()
                        };
                        Some(((*file).clone(), key))
                    }
                    Err(e) => {
                        debug!(path = %file.path.display(), error = %e, "skipping unhashable file");
                        hash_errors.fetch_add(1, Ordering::SeqCst);
                        None
                    }
                }
            })
            .collect();
        errors += hash_errors.load(Ordering::SeqCst);

        if cancel.is_cancelled() {
            return self.finish_cancelled(groups, &tracker, start, total, errors);
        }

        let mut by_hash: HashMap<String, Vec<FileRecord>> = HashMap::new();
        for (file, key) in hashed {
            by_hash.entry(key).or_default().push(file);
        }
        for (key, members) in by_hash {
            if members.len() < 2 {
                continue;
            }
            grouped.extend(members.iter().map(|f| f.path.clone()));
            let group = DuplicateGroup::new(members, MatchKey::ExactHash(key));
            update(
                &tracker,
                ProgressEvent::running(50, "exact duplicates grouped", 0, total).with_partial(
                    PartialUpdate::GroupFound {
                        group_id: group.id.to_string(),
                        file_count: group.files.len(),
                        total_size: group.total_size,
                    },
                ),
            );
            groups.push(group);
        }

        update(
            &tracker,
            ProgressEvent::running(50, "comparing image fingerprints", 0, total),
        );

        // Phase 3 (50-80): visual clustering of images the exact phase did
        // not claim.
        let images: Vec<&FileRecord> = files
            .iter()
            .filter(|f| f.is_image() && !grouped.contains(&f.path))
            .collect();
        let image_count = images.len().max(1);

        let mut fingerprints = Vec::with_capacity(images.len());
        for (i, file) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(groups, &tracker, start, total, errors);
            }
            match self.hashes.perceptual_hash(&file.path) {
                Ok(hash) => fingerprints.push((*file, hash)),
                Err(e) => {
                    debug!(path = %file.path.display(), error = %e, "skipping undecodable image");
                    errors += 1;
                }
            }
            update(
                &tracker,
                ProgressEvent::running(
                    50 + ((i + 1) * 25 / image_count) as u8,
                    "fingerprinting images",
                    i + 1,
                    image_count,
                ),
            );
        }

        // Pairwise Hamming comparison; quadratic by design, bounded by
        // device photo counts rather than arbitrary inventories.
        let mut claimed = vec![false; fingerprints.len()];
        for i in 0..fingerprints.len() {
            if claimed[i] {
                continue;
            }
            if cancel.is_cancelled() {
                return self.finish_cancelled(groups, &tracker, start, total, errors);
            }

            let mut members = vec![fingerprints[i].0.clone()];
            for j in (i + 1)..fingerprints.len() {
                if !claimed[j]
                    && fingerprints[i]
                        .1
                        .is_similar(&fingerprints[j].1, self.config.similarity_threshold)
                {
                    claimed[j] = true;
                    members.push(fingerprints[j].0.clone());
                }
            }

            if members.len() >= 2 {
                claimed[i] = true;
                grouped.extend(members.iter().map(|f| f.path.clone()));
                let group =
                    DuplicateGroup::new(members, MatchKey::Perceptual(fingerprints[i].1.to_hex()));
                update(
                    &tracker,
                    ProgressEvent::running(80, "similar images grouped", 0, total).with_partial(
                        PartialUpdate::GroupFound {
                            group_id: group.id.to_string(),
                            file_count: group.files.len(),
                            total_size: group.total_size,
                        },
                    ),
                );
                groups.push(group);
            }
        }

        update(
            &tracker,
            ProgressEvent::running(80, "grouping videos by signature", 0, total),
        );

        // Phase 4 (80-95): metadata-first video grouping. Signature matches
        // are only candidates; the frame comparator has the final word, and
        // the default comparator confirms nothing.
        let videos: Vec<&FileRecord> = files
            .iter()
            .filter(|f| f.is_video() && !grouped.contains(&f.path))
            .collect();
        let video_count = videos.len().max(1);

        let mut by_signature: HashMap<VideoSignature, Vec<FileRecord>> = HashMap::new();
        for (i, file) in videos.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish_cancelled(groups, &tracker, start, total, errors);
            }
            if let Some(signature) = self.video.probe(&file.path) {
                by_signature.entry(signature).or_default().push((*file).clone());
            }
            update(
                &tracker,
                ProgressEvent::running(
                    80 + ((i + 1) * 15 / video_count) as u8,
                    "probing video metadata",
                    i + 1,
                    video_count,
                ),
            );
        }

        for (signature, members) in by_signature {
            if members.len() < 2 {
                continue;
            }
            for cluster in self.frames.confirm(&signature, &members) {
                if cluster.len() < 2 {
                    continue;
                }
                grouped.extend(cluster.iter().map(|f| f.path.clone()));
                groups.push(DuplicateGroup::new(
                    cluster,
                    MatchKey::VideoSignature(signature.to_string()),
                ));
            }
        }

        update(
            &tracker,
            ProgressEvent::running(95, "selecting files to keep", groups.len(), groups.len()),
        );

        // Phase 5 (95-100): enforce the >=2 invariant and pick keep-files.
        groups.retain(|g| g.files.len() >= 2);
        self.assign_keep_files(&mut groups, true);
        groups.sort_by(|a, b| {
            b.total_size
                .cmp(&a.total_size)
                .then(a.keep_file.cmp(&b.keep_file))
        });

        if cancel.is_cancelled() {
            return self.finish_cancelled(groups, &tracker, start, total, errors);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            groups = groups.len(),
            errors, duration_ms, "duplicate scan complete"
        );
        terminal(
            &tracker,
            ProgressEvent::finished(
                format!("{} duplicate groups found", groups.len()),
                total,
                total,
            ),
        );

        PipelineResult {
            groups,
            total_files: total,
            error_count: errors,
            cancelled: false,
            duration_ms,
        }
    }

    /// Visual groups keep the highest-quality member; everything else keeps
    /// by size, recency, and location. `use_visual` is false on cancelled
    /// runs, where decoding every group member for quality scores would
    /// delay the stop.
    fn assign_keep_files(&self, groups: &mut [DuplicateGroup], use_visual: bool) {
        for group in groups.iter_mut() {
            let keep = match &group.match_key {
                MatchKey::Perceptual(_) if use_visual => {
                    let mut scores = HashMap::new();
                    for file in &group.files {
                        let score = self
                            .quality
                            .analyze_file(&file.path)
                            .map(|report| report.overall)
                            .unwrap_or(0.0);
                        scores.insert(file.path.clone(), score);
                    }
                    self.selector.select_visual(&group.files, &scores)
                }
                _ => self.selector.select_generic(&group.files),
            };
            if let Some(keep) = keep {
                group.keep_file = keep.path.clone();
            }
        }
    }

    /// Terminal path for cancelled runs: keep-files are still assigned (via
    /// the cheap generic policy where needed) so the group invariant holds,
    /// and whatever was accumulated is returned.
    fn finish_cancelled(
        &self,
        mut groups: Vec<DuplicateGroup>,
        tracker: &Mutex<ProgressTracker>,
        start: Instant,
        total: usize,
        errors: usize,
    ) -> PipelineResult {
        self.assign_keep_files(&mut groups, false);

        terminal(
            tracker,
            ProgressEvent::cancelled(current_percent(tracker), 0, total),
        );

        PipelineResult {
            groups,
            total_files: total,
            error_count: errors,
            cancelled: true,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::mime_for_path;
    use crate::events::EventChannel;
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_bytes(path: &Path, bytes: &[u8]) {
        let mut file = File::create(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    fn record(path: &Path, modified_ms: i64) -> FileRecord {
        let size = std::fs::metadata(path).unwrap().len();
        FileRecord::new(path, size, modified_ms, mime_for_path(path))
    }

    fn half_split(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn empty_inventory_completes_immediately() {
        let (sender, receiver) = EventChannel::new();
        let pipeline = DetectionPipeline::builder().build();

        let result = pipeline.run_with_events(&[], &sender, &CancelToken::new());
        drop(sender);

        assert_eq!(result.total_files, 0);
        assert!(result.groups.is_empty());
        let events: Vec<_> = receiver.iter().collect();
        assert!(events.last().unwrap().is_terminal);
        assert_eq!(events.last().unwrap().percent, 100);
    }

    #[test]
    fn identical_files_form_one_group_with_camera_keep() {
        let dir = TempDir::new().unwrap();
        let camera = dir.path().join("DCIM").join("Camera");
        let downloads = dir.path().join("Download");
        let misc = dir.path().join("misc");
        for d in [&camera, &downloads, &misc] {
            std::fs::create_dir_all(d).unwrap();
        }

        let body = vec![7u8; 1024];
        let paths = [
            camera.join("img.jpg"),
            downloads.join("img.jpg"),
            misc.join("img.jpg"),
        ];
        for p in &paths {
            write_bytes(p, &body);
        }

        // Equal sizes and equal mtimes: the location tie-break decides.
        let files: Vec<FileRecord> = paths.iter().map(|p| record(p, 1_000)).collect();

        let pipeline = DetectionPipeline::builder().build();
        let result = pipeline.run(&files);

        assert_eq!(result.groups.len(), 1);
        let group = &result.groups[0];
        assert_eq!(group.files.len(), 3);
        assert_eq!(group.total_size, 3072);
        assert!(matches!(group.match_key, MatchKey::ExactHash(_)));
        assert_eq!(group.keep_file, paths[0]);
        assert!(group.files.iter().any(|f| f.path == group.keep_file));
    }

    #[test]
    fn different_sizes_never_group() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        write_bytes(&a, &[1u8; 100]);
        write_bytes(&b, &[1u8; 200]);

        let files = vec![record(&a, 0), record(&b, 0)];
        let result = DetectionPipeline::builder().build().run(&files);

        assert!(result.groups.is_empty());
    }

    #[test]
    fn unreadable_file_is_counted_not_fatal() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        write_bytes(&a, &[1u8; 512]);
        write_bytes(&b, &[1u8; 512]);

        let mut files = vec![record(&a, 0), record(&b, 0)];
        // A third record with the same claimed size whose file is gone.
        files.push(FileRecord::new(
            dir.path().join("vanished.bin"),
            512,
            0,
            "application/octet-stream",
        ));

        let result = DetectionPipeline::builder().build().run(&files);

        assert_eq!(result.error_count, 1);
        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.groups[0].files.len(), 2);
    }

    #[test]
    fn visually_identical_images_group_perceptually() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        // Same pattern at different resolutions: different bytes and sizes,
        // so only the perceptual phase can pair them.
        half_split(128, 96).save(&a).unwrap();
        half_split(160, 120).save(&b).unwrap();

        let files = vec![record(&a, 0), record(&b, 0)];
        let result = DetectionPipeline::builder().build().run(&files);

        assert_eq!(result.groups.len(), 1);
        assert!(matches!(result.groups[0].match_key, MatchKey::Perceptual(_)));
    }

    #[test]
    fn no_group_has_fewer_than_two_members() {
        let dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..4 {
            let path = dir.path().join(format!("f{}.bin", i));
            write_bytes(&path, &vec![i as u8; 64 + i as usize]);
            files.push(record(&path, 0));
        }

        let result = DetectionPipeline::builder().build().run(&files);
        assert!(result.groups.iter().all(|g| g.files.len() >= 2));
    }

    #[test]
    fn progress_is_monotonic_and_ends_at_100() {
        let dir = TempDir::new().unwrap();
        let mut files = Vec::new();
        for i in 0..6 {
            let path = dir.path().join(format!("f{}.bin", i));
            write_bytes(&path, &[9u8; 256]);
            files.push(record(&path, i));
        }

        let (sender, receiver) = EventChannel::new();
        let pipeline = DetectionPipeline::builder().build();
        pipeline.run_with_events(&files, &sender, &CancelToken::new());
        drop(sender);

        let events: Vec<_> = receiver.iter().collect();
        let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
        assert_eq!(*percents.last().unwrap(), 100);
        assert_eq!(events.iter().filter(|e| e.is_terminal).count(), 1);
    }

    #[test]
    fn cancelled_run_emits_terminal_below_100() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        write_bytes(&a, &[1u8; 64]);
        let files = vec![record(&a, 0), record(&a, 0)];

        let token = CancelToken::new();
        token.cancel();

        let (sender, receiver) = EventChannel::new();
        let result = DetectionPipeline::builder()
            .build()
            .run_with_events(&files, &sender, &token);
        drop(sender);

        assert!(result.cancelled);
        let last = receiver.iter().last().unwrap();
        assert!(last.is_terminal);
        assert!(last.percent < 100);
    }

    #[test]
    fn quick_hash_mode_still_groups_large_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let body = vec![3u8; 32 * 1024];
        write_bytes(&a, &body);
        write_bytes(&b, &body);

        let files = vec![record(&a, 0), record(&b, 0)];
        let result = DetectionPipeline::builder()
            .quick_hash_over(1024)
            .build()
            .run(&files);

        assert_eq!(result.groups.len(), 1);
        match &result.groups[0].match_key {
            MatchKey::ExactHash(key) => assert!(key.starts_with("quick:")),
            other => panic!("expected exact-hash key, got {:?}", other),
        }
    }

    #[test]
    fn video_signature_match_without_comparator_confirms_nothing() {
        struct FixedProbe;
        impl VideoProbe for FixedProbe {
            fn probe(&self, _path: &Path) -> Option<VideoSignature> {
                Some(VideoSignature {
                    duration_secs: 60,
                    width: 1280,
                    height: 720,
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        write_bytes(&a, &[1u8; 100]);
        write_bytes(&b, &[2u8; 200]);

        let files = vec![record(&a, 0), record(&b, 0)];
        let result = DetectionPipeline::builder()
            .video_probe(Box::new(FixedProbe))
            .build()
            .run(&files);

        // Same signature, but the default frame comparator confirms nothing.
        assert!(result.groups.is_empty());
    }

    #[test]
    fn confirmed_video_clusters_become_groups() {
        struct FixedProbe;
        impl VideoProbe for FixedProbe {
            fn probe(&self, _path: &Path) -> Option<VideoSignature> {
                Some(VideoSignature {
                    duration_secs: 60,
                    width: 1280,
                    height: 720,
                })
            }
        }

        struct ConfirmAll;
        impl FrameComparator for ConfirmAll {
            fn confirm(
                &self,
                _signature: &VideoSignature,
                candidates: &[FileRecord],
            ) -> Vec<Vec<FileRecord>> {
                vec![candidates.to_vec()]
            }
        }

        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.mp4");
        let b = dir.path().join("b.mp4");
        write_bytes(&a, &[1u8; 100]);
        write_bytes(&b, &[2u8; 200]);

        let files = vec![record(&a, 0), record(&b, 0)];
        let result = DetectionPipeline::builder()
            .video_probe(Box::new(FixedProbe))
            .frame_comparator(Box::new(ConfirmAll))
            .build()
            .run(&files);

        assert_eq!(result.groups.len(), 1);
        assert!(matches!(
            result.groups[0].match_key,
            MatchKey::VideoSignature(_)
        ));
        // Larger file kept on the generic policy.
        assert_eq!(result.groups[0].keep_file, b);
    }

    #[test]
    fn shared_hash_service_reuses_cached_digests() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        write_bytes(&a, &[5u8; 128]);
        write_bytes(&b, &[5u8; 128]);

        let service = Arc::new(HashService::new(Arc::new(HashCache::new())));
        let files = vec![record(&a, 0), record(&b, 0)];

        let pipeline = DetectionPipeline::builder()
            .hash_service(Arc::clone(&service))
            .build();
        pipeline.run(&files);

        assert!(service.cache().len() >= 2);
    }
}
