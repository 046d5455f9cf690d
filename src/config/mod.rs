//! Application Configuration
//!
//! User settings stored in TOML format. Every section has defaults, so a
//! config file only needs the keys it changes.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::ConfidenceCurve;
use crate::vision::OcrBackend;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Classification settings
    pub classifier: ClassifierSettings,
    /// Text extraction settings
    pub ocr: OcrSettings,
    /// Image cleanup before OCR
    pub preprocessing: PreprocessingConfig,
    /// Whole-run settings
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        self.classifier.curve()?;
        self.preprocessing.validate()?;
        Ok(())
    }
}

/// Classification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// External lexicon file (.toml or .json); the built-in one when unset
    pub lexicon_path: Option<PathBuf>,
    /// How quickly confidence rises with weighted hits per word
    pub confidence_steepness: f64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            lexicon_path: None,
            confidence_steepness: ConfidenceCurve::DEFAULT_STEEPNESS,
        }
    }
}

impl ClassifierSettings {
    pub fn curve(&self) -> Result<ConfidenceCurve> {
        ConfidenceCurve::new(self.confidence_steepness).ok_or_else(|| {
            anyhow!(
                "classifier.confidence_steepness must be a finite positive number, got {}",
                self.confidence_steepness
            )
        })
    }
}

/// Text extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Which text source to use
    pub backend: OcrBackend,
    /// Path or name of the tesseract executable
    pub tesseract_path: String,
    /// Tesseract language code (e.g., "eng")
    pub language: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Tesseract,
            tesseract_path: "tesseract".to_string(),
            language: "eng".to_string(),
        }
    }
}

/// Image preprocessing settings for OCR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Master switch for all steps
    pub enabled: bool,
    /// Gaussian blur to suppress speckle noise
    pub noise_removal: bool,
    /// Blur sigma in pixels
    pub blur_sigma: f32,
    /// Otsu binarization
    pub thresholding: bool,
    /// Straighten rotated scans
    pub deskew: bool,
    /// Largest rotation searched, in degrees either way
    pub max_deskew_degrees: f32,
    /// Search step in degrees
    pub deskew_step_degrees: f32,
    /// Stretch intensities to the full 0-255 range
    pub normalization: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            noise_removal: true,
            blur_sigma: 0.8,
            thresholding: true,
            deskew: true,
            max_deskew_degrees: 5.0,
            deskew_step_degrees: 0.5,
            normalization: true,
        }
    }
}

impl PreprocessingConfig {
    /// All steps off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(anyhow!("preprocessing.blur_sigma must be >= 0, got {}", self.blur_sigma));
        }
        if !self.max_deskew_degrees.is_finite() || !(0.0..=45.0).contains(&self.max_deskew_degrees) {
            return Err(anyhow!(
                "preprocessing.max_deskew_degrees must be within 0-45, got {}",
                self.max_deskew_degrees
            ));
        }
        if !self.deskew_step_degrees.is_finite() || self.deskew_step_degrees <= 0.0 {
            return Err(anyhow!(
                "preprocessing.deskew_step_degrees must be > 0, got {}",
                self.deskew_step_degrees
            ));
        }
        Ok(())
    }
}

/// Whole-run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Time budget for one image; exceeding it is reported, not enforced
    pub processing_budget_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            processing_budget_ms: 10_000,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
