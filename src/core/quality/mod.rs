//! # Quality Analysis Module
//!
//! Blur and composite quality scoring for images. Used by the selector to
//! pick which member of a visually-similar group to keep.
//!
//! Blur detection uses Laplacian variance: the Laplacian operator responds
//! to local intensity change, so sharp images produce high-variance
//! responses and blurry ones produce flat, low-variance responses.

use image::{DynamicImage, GenericImageView, GrayImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::HashError;

/// Rows/columns skipped between samples for the brightness, contrast, and
/// entropy factors. A documented approximation, not a bug: sampling every
/// 4th pixel changes the factors by well under the precision that matters.
const SAMPLE_STRIDE: u32 = 4;

/// Blur scores below this mean "blurry".
pub const DEFAULT_BLUR_THRESHOLD: f64 = 100.0;

/// Composite scores below this mean "low quality".
pub const DEFAULT_LOW_QUALITY_THRESHOLD: f64 = 0.6;

/// EXIF fields that influence the quality score when present.
#[derive(Debug, Clone, Default)]
pub struct ExifSummary {
    pub camera_model: Option<String>,
    pub iso: Option<u32>,
    pub flash_fired: Option<bool>,
}

impl ExifSummary {
    pub fn has_data(&self) -> bool {
        self.camera_model.is_some() || self.iso.is_some() || self.flash_fired.is_some()
    }
}

/// Component metrics plus the composite score, so callers can explain why a
/// file scored the way it did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    /// Laplacian variance; unbounded positive, lower = blurrier
    pub blur: f64,
    /// Resolution tier factor in [0,1]
    pub resolution: f64,
    /// Closeness of mean luminance to mid-gray, in [0,1]
    pub brightness: f64,
    /// Normalized min-max luminance range, in [0,1]
    pub contrast: f64,
    /// Normalized Shannon entropy of the luminance histogram, in [0,1]
    pub entropy: f64,
    /// EXIF-derived delta applied to the composite, when EXIF was present
    pub exif_adjustment: Option<f64>,
    /// Composite score in [0,1]
    pub overall: f64,
}

/// Computes blur and composite quality scores.
///
/// Scores are computed fresh on every call - only hashes are memoized by the
/// engine, not quality metrics.
#[derive(Debug, Clone)]
pub struct QualityAnalyzer {
    blur_threshold: f64,
    low_quality_threshold: f64,
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self {
            blur_threshold: DEFAULT_BLUR_THRESHOLD,
            low_quality_threshold: DEFAULT_LOW_QUALITY_THRESHOLD,
        }
    }
}

impl QualityAnalyzer {
    pub fn new(blur_threshold: f64, low_quality_threshold: f64) -> Self {
        Self {
            blur_threshold,
            low_quality_threshold,
        }
    }

    /// Decode `path`, read its EXIF if any, and score it. The decoded buffer
    /// is scoped to this call and freed on every exit path.
    pub fn analyze_file(&self, path: &Path) -> Result<QualityReport, HashError> {
        let image = image::open(path).map_err(|e| HashError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let exif = read_exif(path);
        Ok(self.analyze_image(&image, exif.as_ref()))
    }

    /// Score an already-decoded image.
    pub fn analyze_image(
        &self,
        image: &DynamicImage,
        exif: Option<&ExifSummary>,
    ) -> QualityReport {
        let (width, height) = image.dimensions();
        let gray = image.to_luma8();

        let blur = self.blur_score(&gray);
        let resolution = resolution_tier(width, height);
        let (brightness, contrast, entropy) = sampled_factors(&gray);

        let base = (resolution + brightness + contrast + entropy) / 4.0;

        let exif_adjustment = exif.filter(|e| e.has_data()).map(exif_adjustment);
        let overall = (base + exif_adjustment.unwrap_or(0.0)).clamp(0.0, 1.0);

        QualityReport {
            blur,
            resolution,
            brightness,
            contrast,
            entropy,
            exif_adjustment,
            overall,
        }
    }

    /// Laplacian variance over the interior pixels of a grayscale image.
    ///
    /// Kernel: center 4, four neighbors -1. Accumulates the running sum and
    /// sum-of-squares of the absolute response, then
    /// variance = E[x^2] - E[x]^2.
    pub fn blur_score(&self, gray: &GrayImage) -> f64 {
        let (width, height) = gray.dimensions();
        if width < 3 || height < 3 {
            return 0.0;
        }

        let mut sum = 0f64;
        let mut sum_sq = 0f64;
        let mut count = 0u64;

        for y in 1..height - 1 {
            for x in 1..width - 1 {
                let center = gray.get_pixel(x, y)[0] as f64;
                let top = gray.get_pixel(x, y - 1)[0] as f64;
                let bottom = gray.get_pixel(x, y + 1)[0] as f64;
                let left = gray.get_pixel(x - 1, y)[0] as f64;
                let right = gray.get_pixel(x + 1, y)[0] as f64;

                let response = (4.0 * center - top - bottom - left - right).abs();
                sum += response;
                sum_sq += response * response;
                count += 1;
            }
        }

        let n = count as f64;
        let mean = sum / n;
        sum_sq / n - mean * mean
    }

    pub fn is_blurry(&self, blur: f64) -> bool {
        blur < self.blur_threshold
    }

    pub fn is_low_quality(&self, report: &QualityReport) -> bool {
        report.overall < self.low_quality_threshold
    }
}

/// Four resolution buckets, full HD and up scoring 1.0.
fn resolution_tier(width: u32, height: u32) -> f64 {
    let (long, short) = if width >= height {
        (width, height)
    } else {
        (height, width)
    };

    if long >= 1920 && short >= 1080 {
        1.0
    } else if long >= 1280 && short >= 720 {
        0.8
    } else if long >= 640 && short >= 480 {
        0.6
    } else {
        0.4
    }
}

/// Brightness, contrast, and entropy from a strided sample of the gray
/// buffer, all normalized into [0,1].
fn sampled_factors(gray: &GrayImage) -> (f64, f64, f64) {
    let (width, height) = gray.dimensions();

    let mut histogram = [0u64; 256];
    let mut sum = 0u64;
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    let mut count = 0u64;

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let v = gray.get_pixel(x, y)[0];
            histogram[v as usize] += 1;
            sum += v as u64;
            min = min.min(v);
            max = max.max(v);
            count += 1;
            x += SAMPLE_STRIDE;
        }
        y += SAMPLE_STRIDE;
    }

    if count == 0 {
        return (0.0, 0.0, 0.0);
    }

    let mean = sum as f64 / count as f64;
    let brightness = 1.0 - (mean - 128.0).abs() / 128.0;
    let contrast = (max - min) as f64 / 255.0;

    let mut entropy = 0f64;
    for &bucket in &histogram {
        if bucket > 0 {
            let p = bucket as f64 / count as f64;
            entropy -= p * p.ln();
        }
    }
    let entropy = entropy / 256f64.ln();

    (brightness, contrast, entropy)
}

/// Camera-tier bonus, ISO bonus/penalty, and flash bonus, summed into a
/// small delta on the composite score.
fn exif_adjustment(exif: &ExifSummary) -> f64 {
    let mut delta = 0.0;

    if let Some(model) = &exif.camera_model {
        let model = model.to_ascii_lowercase();
        const DEDICATED_CAMERA_MAKERS: &[&str] =
            &["canon", "nikon", "sony", "fujifilm", "leica", "hasselblad"];
        if DEDICATED_CAMERA_MAKERS.iter().any(|m| model.contains(m)) {
            delta += 0.05;
        }
    }

    if let Some(iso) = exif.iso {
        if iso <= 200 {
            delta += 0.05;
        } else if iso >= 1600 {
            delta -= 0.05;
        }
    }

    if exif.flash_fired == Some(true) {
        delta += 0.02;
    }

    delta
}

/// Pull the quality-relevant EXIF fields out of a file, or `None` when the
/// file carries no readable EXIF. Absence is normal, never an error.
pub fn read_exif(path: &Path) -> Option<ExifSummary> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(&file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    let mut summary = ExifSummary::default();

    if let Some(field) = exif.get_field(exif::Tag::Model, exif::In::PRIMARY) {
        summary.camera_model = Some(field.display_value().to_string().trim_matches('"').to_string());
    }
    if let Some(field) = exif.get_field(exif::Tag::PhotographicSensitivity, exif::In::PRIMARY) {
        summary.iso = field.value.get_uint(0);
    }
    if let Some(field) = exif.get_field(exif::Tag::Flash, exif::In::PRIMARY) {
        // Bit 0 of the Flash tag is "flash fired".
        summary.flash_fired = field.value.get_uint(0).map(|v| v & 1 == 1);
    }

    summary.has_data().then_some(summary)
}
