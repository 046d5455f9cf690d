//! Image preprocessing for OCR
//!
//! Cleans a grayscale scan before text extraction. Steps run in a fixed
//! order and each one reports whether it ran, how long it took and what
//! it decided:
//! 1. Normalization: linear contrast stretch to 0-255
//! 2. Noise removal: Gaussian blur
//! 3. Thresholding: Otsu binarization
//! 4. Deskew: projection-profile rotation search

use image::{GrayImage, Luma};
use imageproc::contrast::{otsu_level, stretch_contrast, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::debug;

use crate::config::PreprocessingConfig;

/// Pixels darker than this count as ink when estimating skew
const INK_LEVEL: u8 = 128;

/// A preprocessing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessStep {
    Normalization,
    NoiseRemoval,
    Thresholding,
    Deskew,
}

impl PreprocessStep {
    /// Execution order
    pub const ALL: [PreprocessStep; 4] = [
        PreprocessStep::Normalization,
        PreprocessStep::NoiseRemoval,
        PreprocessStep::Thresholding,
        PreprocessStep::Deskew,
    ];

    fn enabled_in(self, config: &PreprocessingConfig) -> bool {
        match self {
            PreprocessStep::Normalization => config.normalization,
            PreprocessStep::NoiseRemoval => config.noise_removal,
            PreprocessStep::Thresholding => config.thresholding,
            PreprocessStep::Deskew => config.deskew,
        }
    }
}

impl fmt::Display for PreprocessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreprocessStep::Normalization => "Normalization",
            PreprocessStep::NoiseRemoval => "Noise Removal",
            PreprocessStep::Thresholding => "Thresholding",
            PreprocessStep::Deskew => "Deskew",
        };
        f.write_str(name)
    }
}

/// What one step did
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: PreprocessStep,
    /// Whether the step ran
    pub applied: bool,
    pub duration_ms: f64,
    /// Parameters chosen by the step, or why it was skipped
    pub detail: String,
}

impl StepReport {
    fn skipped(step: PreprocessStep, reason: &str) -> Self {
        Self {
            step,
            applied: false,
            duration_ms: 0.0,
            detail: reason.to_string(),
        }
    }
}

/// Cleaned image and per-step reports
#[derive(Debug, Clone)]
pub struct PreprocessOutcome {
    pub image: GrayImage,
    pub steps: Vec<StepReport>,
}

impl PreprocessOutcome {
    /// Whether any step changed the pipeline's image
    pub fn any_applied(&self) -> bool {
        self.steps.iter().any(|s| s.applied)
    }
}

/// Run the enabled preprocessing steps over `image`
pub fn preprocess(image: GrayImage, config: &PreprocessingConfig) -> PreprocessOutcome {
    if !config.enabled {
        return PreprocessOutcome {
            image,
            steps: PreprocessStep::ALL
                .iter()
                .map(|&s| StepReport::skipped(s, "preprocessing disabled"))
                .collect(),
        };
    }

    if image.width() == 0 || image.height() == 0 {
        return PreprocessOutcome {
            image,
            steps: PreprocessStep::ALL
                .iter()
                .map(|&s| StepReport::skipped(s, "empty image"))
                .collect(),
        };
    }

    let mut image = image;
    let mut steps = Vec::with_capacity(PreprocessStep::ALL.len());

    for step in PreprocessStep::ALL {
        if !step.enabled_in(config) {
            steps.push(StepReport::skipped(step, "disabled"));
            continue;
        }

        let start = Instant::now();
        let (next, detail) = run_step(step, image, config);
        image = next;

        let report = StepReport {
            step,
            applied: true,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            detail,
        };
        debug!("{} done in {:.2} ms: {}", step, report.duration_ms, report.detail);
        steps.push(report);
    }

    PreprocessOutcome { image, steps }
}

fn run_step(step: PreprocessStep, image: GrayImage, config: &PreprocessingConfig) -> (GrayImage, String) {
    match step {
        PreprocessStep::Normalization => {
            let (min, max) = intensity_range(&image);
            let detail = format!("input range {}-{}", min, max);
            if max <= min {
                (image, detail)
            } else {
                (stretch_contrast(&image, min, max, 0, 255), detail)
            }
        }
        PreprocessStep::NoiseRemoval => {
            if config.blur_sigma <= 0.0 {
                (image, "sigma 0, nothing to blur".to_string())
            } else if image.width() < 3 || image.height() < 3 {
                (image, "image too small to blur".to_string())
            } else {
                (
                    gaussian_blur_f32(&image, config.blur_sigma),
                    format!("gaussian sigma {:.2}", config.blur_sigma),
                )
            }
        }
        PreprocessStep::Thresholding => {
            let level = otsu_level(&image);
            (
                threshold(&image, level, ThresholdType::Binary),
                format!("otsu level {}", level),
            )
        }
        PreprocessStep::Deskew => {
            let angle = estimate_skew(&image, config.max_deskew_degrees, config.deskew_step_degrees);
            if angle == 0.0 {
                (image, "angle 0.0°".to_string())
            } else {
                (rotate(&image, angle), format!("angle {:.1}°", angle))
            }
        }
    }
}

/// Darkest and brightest values
fn intensity_range(image: &GrayImage) -> (u8, u8) {
    image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])))
}

/// Find the rotation in degrees that best aligns ink into horizontal rows
///
/// Candidates are searched from 0 outwards, so the smallest angle wins a
/// tie. Returns 0 for images without ink.
pub fn estimate_skew(image: &GrayImage, max_degrees: f32, step_degrees: f32) -> f32 {
    let (cx, cy) = center(image);
    let ink: Vec<(f32, f32)> = image
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] < INK_LEVEL)
        .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
        .collect();

    if ink.is_empty() || max_degrees <= 0.0 || step_degrees <= 0.0 {
        return 0.0;
    }

    let diagonal = ((image.width() as f32).hypot(image.height() as f32)).ceil() as usize + 2;
    let offset = diagonal as f32 / 2.0;
    let steps = (max_degrees / step_degrees).floor() as i32;

    let mut best_angle = 0.0;
    let mut best_score = projection_score(&ink, 0.0, diagonal, offset);

    for i in 1..=steps {
        for angle in [i as f32 * step_degrees, -(i as f32) * step_degrees] {
            let score = projection_score(&ink, angle, diagonal, offset);
            if score > best_score {
                best_score = score;
                best_angle = angle;
            }
        }
    }

    best_angle
}

/// Sum of squared row counts after rotating the ink by `degrees`
///
/// Peaks when text lines fall into as few rows as possible.
fn projection_score(ink: &[(f32, f32)], degrees: f32, rows: usize, offset: f32) -> f64 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let mut histogram = vec![0u64; rows];

    for &(x, y) in ink {
        let row = (x * sin + y * cos + offset).round();
        if row >= 0.0 && (row as usize) < rows {
            histogram[row as usize] += 1;
        }
    }

    histogram.iter().map(|&c| (c * c) as f64).sum()
}

fn center(image: &GrayImage) -> (f32, f32) {
    (
        (image.width() as f32 - 1.0) / 2.0,
        (image.height() as f32 - 1.0) / 2.0,
    )
}

/// Rotate about the center by `degrees`, filling uncovered areas with white
pub fn rotate(image: &GrayImage, degrees: f32) -> GrayImage {
    rotate_about_center(image, degrees.to_radians(), Interpolation::Nearest, Luma([255]))
}
