//! # Hasher Module
//!
//! Content and perceptual hashing with a process-lifetime cache.
//!
//! ## Two fingerprints per file
//! - **Content hash** - a blake3 digest of the full byte stream, used for
//!   exact-duplicate grouping.
//! - **Perceptual hash** - a coarse visual fingerprint: the image is
//!   area-averaged into a small grayscale grid and each cell is thresholded
//!   against the grid's mean luminance. Two hashes within a small Hamming
//!   distance of each other describe visually similar images.
//!
//! ## Caching
//! Both hashes are memoized per absolute path in a concurrent map owned by
//! an explicitly constructed [`HashCache`]. Nothing invalidates entries
//! automatically - a caller that knows a file changed must call
//! [`HashCache::invalidate`]. Two threads hashing the same path at once may
//! both do the work; the second insert wins and the results are identical.

use dashmap::DashMap;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

use crate::error::HashError;

/// Read granularity for streaming the content digest.
const CHUNK_SIZE: usize = 64 * 1024;

/// Bytes sampled from each end of the file by the quick hash.
const QUICK_SAMPLE: usize = 8 * 1024;

/// Default perceptual grid edge; 32x32 cells = 1024 hash bits.
pub const DEFAULT_GRID_SIZE: u32 = 32;

/// Default Hamming-distance threshold for "visually similar".
pub const DEFAULT_SIMILARITY_THRESHOLD: u32 = 5;

/// Hex digest of a file's byte content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A packed bit-string visual fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHash {
    bits: Vec<u8>,
    bit_len: u32,
}

impl PerceptualHash {
    fn new(bits: Vec<u8>, bit_len: u32) -> Self {
        Self { bits, bit_len }
    }

    /// Number of differing bits between two hashes.
    ///
    /// Hashes from different grid sizes never legitimately meet; if they do,
    /// the missing bits all count as differing.
    pub fn distance(&self, other: &Self) -> u32 {
        let common: u32 = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        common + self.bit_len.abs_diff(other.bit_len)
    }

    pub fn is_similar(&self, other: &Self, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }

    pub fn bit_len(&self) -> u32 {
        self.bit_len
    }

    pub fn to_hex(&self) -> String {
        self.bits.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Process-lifetime hash memoization, keyed by absolute path.
///
/// Construct one per session and share it via `Arc`; there is no ambient
/// singleton. Entries are never invalidated automatically (a known staleness
/// risk the caller owns).
#[derive(Default)]
pub struct HashCache {
    content: DashMap<PathBuf, ContentHash>,
    quick: DashMap<PathBuf, ContentHash>,
    perceptual: DashMap<PathBuf, PerceptualHash>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached hash for `path`, in all flavours.
    pub fn invalidate(&self, path: &Path) {
        let key = canonical_key(path);
        self.content.remove(&key);
        self.quick.remove(&key);
        self.perceptual.remove(&key);
    }

    pub fn clear(&self) {
        self.content.clear();
        self.quick.clear();
        self.perceptual.clear();
    }

    /// Total cached entries across all flavours.
    pub fn len(&self) -> usize {
        self.content.len() + self.quick.len() + self.perceptual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Computes and memoizes content and perceptual hashes.
pub struct HashService {
    cache: Arc<HashCache>,
    grid_size: u32,
}

impl HashService {
    pub fn new(cache: Arc<HashCache>) -> Self {
        Self {
            cache,
            grid_size: DEFAULT_GRID_SIZE,
        }
    }

    /// Override the perceptual grid edge (hash length = size^2 bits).
    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        debug_assert!(grid_size >= 2);
        self.grid_size = grid_size;
        self
    }

    pub fn cache(&self) -> &Arc<HashCache> {
        &self.cache
    }

    /// Blake3 digest of the full file, streamed in fixed-size chunks.
    pub fn content_hash(&self, path: &Path) -> Result<ContentHash, HashError> {
        let key = canonical_key(path);
        if let Some(hit) = self.cache.content.get(&key) {
            trace!(path = %path.display(), "content hash cache hit");
            return Ok(hit.clone());
        }

        let mut file = File::open(path).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = file.read(&mut buf).map_err(|source| HashError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }

        let hash = ContentHash(hasher.finalize().to_hex().to_string());
        self.cache.content.insert(key, hash.clone());
        Ok(hash)
    }

    /// Digest of the first 8 KiB + last 8 KiB + the file size.
    ///
    /// Bounded I/O for very large files at the cost of a small collision
    /// risk: two files that differ only in their middle bytes but share head,
    /// tail, and size will collide. Quick hashes are cached separately from
    /// full content hashes and the two must not be mixed within one grouping
    /// run.
    pub fn quick_content_hash(&self, path: &Path) -> Result<ContentHash, HashError> {
        let key = canonical_key(path);
        if let Some(hit) = self.cache.quick.get(&key) {
            return Ok(hit.clone());
        }

        let io_err = |source| HashError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();

        let mut hasher = blake3::Hasher::new();
        let mut head = vec![0u8; QUICK_SAMPLE.min(len as usize)];
        file.read_exact(&mut head).map_err(io_err)?;
        hasher.update(&head);

        if len as usize > QUICK_SAMPLE {
            let tail_start = len - QUICK_SAMPLE.min(len as usize) as u64;
            file.seek(SeekFrom::Start(tail_start)).map_err(io_err)?;
            let mut tail = vec![0u8; QUICK_SAMPLE.min(len as usize)];
            file.read_exact(&mut tail).map_err(io_err)?;
            hasher.update(&tail);
        }

        hasher.update(len.to_string().as_bytes());

        let hash = ContentHash(hasher.finalize().to_hex().to_string());
        self.cache.quick.insert(key, hash.clone());
        Ok(hash)
    }

    /// Grid-luminance perceptual hash of a raster image.
    pub fn perceptual_hash(&self, path: &Path) -> Result<PerceptualHash, HashError> {
        let key = canonical_key(path);
        if let Some(hit) = self.cache.perceptual.get(&key) {
            trace!(path = %path.display(), "perceptual hash cache hit");
            return Ok(hit.clone());
        }

        let image = image::open(path).map_err(|e| HashError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(HashError::EmptyImage {
                path: path.to_path_buf(),
            });
        }

        let hash = grid_hash(&image.to_rgb8(), self.grid_size);
        self.cache.perceptual.insert(key, hash.clone());
        Ok(hash)
    }
}

/// Area-average the image into `grid` x `grid` luminance cells and threshold
/// each against the grid mean.
fn grid_hash(rgb: &image::RgbImage, grid: u32) -> PerceptualHash {
    let (width, height) = rgb.dimensions();
    let cells = (grid * grid) as usize;
    let mut luma = vec![0f64; cells];

    for cy in 0..grid {
        let y0 = (cy as u64 * height as u64 / grid as u64) as u32;
        let mut y1 = ((cy as u64 + 1) * height as u64 / grid as u64) as u32;
        y1 = y1.max(y0 + 1).min(height);
        let y0 = y0.min(height - 1);

        for cx in 0..grid {
            let x0 = (cx as u64 * width as u64 / grid as u64) as u32;
            let mut x1 = ((cx as u64 + 1) * width as u64 / grid as u64) as u32;
            x1 = x1.max(x0 + 1).min(width);
            let x0 = x0.min(width - 1);

            let mut sum = 0f64;
            let mut count = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let p = rgb.get_pixel(x, y);
                    sum += 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64;
                    count += 1;
                }
            }
            luma[(cy * grid + cx) as usize] = sum / count as f64;
        }
    }

    let mean = luma.iter().sum::<f64>() / cells as f64;

    let mut bits = vec![0u8; cells.div_ceil(8)];
    for (i, &cell) in luma.iter().enumerate() {
        if cell > mean {
            bits[i / 8] |= 1 << (7 - (i % 8));
        }
    }

    PerceptualHash::new(bits, grid * grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, RgbImage};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    fn half_split_image(width: u32, height: u32, vertical: bool) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let dark = if vertical { x < width / 2 } else { y < height / 2 };
            if dark {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn service() -> HashService {
        HashService::new(Arc::new(HashCache::new()))
    }

    #[test]
    fn content_hash_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.bin", b"identical bytes");

        let svc = service();
        let first = svc.content_hash(&path).unwrap();
        svc.cache().invalidate(&path);
        let second = svc.content_hash(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn identical_bytes_produce_identical_hashes() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"same");
        let b = write_file(&dir, "b.bin", b"same");

        let svc = service();
        assert_eq!(svc.content_hash(&a).unwrap(), svc.content_hash(&b).unwrap());
    }

    #[test]
    fn different_bytes_produce_different_hashes() {
        let dir = TempDir::new().unwrap();
        let a = write_file(&dir, "a.bin", b"alpha");
        let b = write_file(&dir, "b.bin", b"bravo");

        let svc = service();
        assert_ne!(svc.content_hash(&a).unwrap(), svc.content_hash(&b).unwrap());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let svc = service();
        let err = svc.content_hash(Path::new("/nonexistent/file")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn quick_hash_differs_from_full_hash() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.bin", b"some payload");

        let svc = service();
        let full = svc.content_hash(&path).unwrap();
        let quick = svc.quick_content_hash(&path).unwrap();

        // Different input framing means the flavours never collide.
        assert_ne!(full, quick);
    }

    #[test]
    fn quick_hash_ignores_middle_bytes() {
        let dir = TempDir::new().unwrap();
        let mut body_a = vec![0u8; 64 * 1024];
        let mut body_b = vec![0u8; 64 * 1024];
        body_a[32 * 1024] = 1;
        body_b[32 * 1024] = 2;
        let a = write_file(&dir, "a.bin", &body_a);
        let b = write_file(&dir, "b.bin", &body_b);

        let svc = service();
        // The documented collision: same head, tail, and size.
        assert_eq!(
            svc.quick_content_hash(&a).unwrap(),
            svc.quick_content_hash(&b).unwrap()
        );
        assert_ne!(svc.content_hash(&a).unwrap(), svc.content_hash(&b).unwrap());
    }

    #[test]
    fn cache_returns_same_value_without_recompute() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "a.bin", b"cache me");

        let svc = service();
        let first = svc.content_hash(&path).unwrap();

        // Change the bytes behind the cache's back; the stale entry wins
        // until the caller invalidates.
        std::fs::write(&path, b"changed!").unwrap();
        let stale = svc.content_hash(&path).unwrap();
        assert_eq!(first, stale);

        svc.cache().invalidate(&path);
        let fresh = svc.content_hash(&path).unwrap();
        assert_ne!(first, fresh);
    }

    #[test]
    fn perceptual_hash_of_identical_images_is_zero_distance() {
        let dir = TempDir::new().unwrap();
        let img = half_split_image(128, 96, true);
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        img.save(&a).unwrap();
        img.save(&b).unwrap();

        let svc = service();
        let ha = svc.perceptual_hash(&a).unwrap();
        let hb = svc.perceptual_hash(&b).unwrap();

        assert_eq!(ha.distance(&hb), 0);
        assert_eq!(ha.bit_len(), 1024);
    }

    #[test]
    fn materially_different_images_are_far_apart() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        half_split_image(128, 96, true).save(&a).unwrap();
        half_split_image(128, 96, false).save(&b).unwrap();

        let svc = service();
        let ha = svc.perceptual_hash(&a).unwrap();
        let hb = svc.perceptual_hash(&b).unwrap();

        assert!(ha.distance(&hb) > DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn non_image_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "not_an_image.jpg", b"plain text");

        let svc = service();
        let err = svc.perceptual_hash(&path).unwrap_err();
        assert!(matches!(err, HashError::Decode { .. }));
    }

    #[test]
    fn tiny_images_still_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.png");
        half_split_image(2, 2, true).save(&path).unwrap();

        let svc = service();
        let hash = svc.perceptual_hash(&path).unwrap();
        assert_eq!(hash.bit_len(), 1024);
    }

    #[test]
    fn hamming_distance_algebra() {
        let a = PerceptualHash::new(vec![0b1111_1111], 8);
        let b = PerceptualHash::new(vec![0b0000_0000], 8);

        assert_eq!(a.distance(&a), 0);
        assert_eq!(a.distance(&b), 8);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert!(a.is_similar(&a, 0));
        assert!(!a.is_similar(&b, 7));
    }

    #[test]
    fn to_hex_renders_bytes() {
        let hash = PerceptualHash::new(vec![0xDE, 0xAD], 16);
        assert_eq!(hash.to_hex(), "dead");
    }
}
