//! Image to document-type pipeline
//!
//! Decodes an image, preprocesses it, extracts text through the injected
//! [`TextSource`] and classifies the text. The text source and classifier
//! are built once by the caller and handed in; the pipeline owns no
//! global state.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::classify::{ClassificationResult, Classifier, Lexicon};
use crate::config::{AppConfig, ClassifierSettings, PreprocessingConfig};
use crate::vision::{preprocess, text_source_from_settings, StepReport, TextSource};

/// Time spent in each stage, in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTimings {
    pub decode_ms: u64,
    pub preprocess_ms: u64,
    pub extract_ms: u64,
    pub classify_ms: u64,
    pub total_ms: u64,
}

/// Everything produced for one image
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub image: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Name of the text source that produced `extracted_text`
    pub text_source: String,
    pub preprocessing: Vec<StepReport>,
    pub extracted_text: String,
    pub result: ClassificationResult,
    /// Confidence as a whole percentage
    pub confidence_percent: u8,
    pub timings: StageTimings,
    /// Whether the run took longer than the processing budget
    pub over_budget: bool,
}

/// Build the classifier described by the settings
///
/// Lexicon problems are fatal here so they surface at startup.
pub fn load_classifier(settings: &ClassifierSettings) -> Result<Classifier> {
    let lexicon = match &settings.lexicon_path {
        Some(path) => Lexicon::load(path).with_context(|| format!("Failed to load lexicon {:?}", path))?,
        None => Lexicon::builtin().context("Built-in lexicon is invalid")?,
    };
    let curve = settings.curve()?;

    info!(
        "Classifier ready: {} document types, fallback {:?}",
        lexicon.entries().len(),
        lexicon.fallback()
    );
    Ok(Classifier::new(lexicon, curve))
}

/// Preprocess, extract and classify
pub struct Pipeline {
    source: Box<dyn TextSource>,
    classifier: Arc<Classifier>,
    preprocessing: PreprocessingConfig,
    budget: Duration,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn TextSource>,
        classifier: Arc<Classifier>,
        preprocessing: PreprocessingConfig,
        budget: Duration,
    ) -> Self {
        Self {
            source,
            classifier,
            preprocessing,
            budget,
        }
    }

    /// Build every stage from the application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let classifier = Arc::new(load_classifier(&config.classifier)?);
        Ok(Self::new(
            text_source_from_settings(&config.ocr),
            classifier,
            config.preprocessing.clone(),
            Duration::from_millis(config.pipeline.processing_budget_ms),
        ))
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn text_source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Classify text that arrived without an image
    pub fn classify_text(&self, text: &str) -> ClassificationResult {
        self.classifier.classify(text)
    }

    /// Run every stage for the image at `path`
    pub fn run(&self, path: &Path) -> Result<PipelineReport> {
        let total_start = Instant::now();
        let mut timings = StageTimings::default();

        let start = Instant::now();
        let decoded = image::open(path).with_context(|| format!("Failed to decode image {:?}", path))?;
        let grayscale = decoded.to_luma8();
        let (width, height) = grayscale.dimensions();
        timings.decode_ms = start.elapsed().as_millis() as u64;
        debug!("Decoded {:?}: {}x{}", path, width, height);

        let start = Instant::now();
        let outcome = preprocess(grayscale, &self.preprocessing);
        timings.preprocess_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        // Sources that read pixels get the cleaned image, others the original path
        let extraction = if self.source.reads_pixels() && outcome.any_applied() {
            let scratch = tempfile::TempDir::new().context("Failed to create scratch directory")?;
            let prepared = scratch.path().join("prepared.png");
            outcome
                .image
                .save_with_format(&prepared, image::ImageFormat::Png)
                .with_context(|| format!("Failed to write preprocessed image {:?}", prepared))?;
            self.source.extract(&prepared)
        } else {
            self.source.extract(path)
        };
        let extracted_text = extraction
            .with_context(|| format!("{} could not extract text from {:?}", self.source.name(), path))?;
        timings.extract_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let result = self.classifier.classify(&extracted_text);
        timings.classify_ms = start.elapsed().as_millis() as u64;

        let elapsed = total_start.elapsed();
        timings.total_ms = elapsed.as_millis() as u64;

        let over_budget = elapsed > self.budget;
        if over_budget {
            warn!(
                "Processing {:?} took {} ms, over the {} ms budget",
                path,
                timings.total_ms,
                self.budget.as_millis()
            );
        }

        info!(
            "Processed {:?} in {} ms: {} ({}%)",
            path,
            timings.total_ms,
            result.label,
            result.confidence_percent()
        );

        Ok(PipelineReport {
            image: path.to_path_buf(),
            width,
            height,
            text_source: self.source.name().to_string(),
            preprocessing: outcome.steps,
            extracted_text,
            confidence_percent: result.confidence_percent(),
            result,
            timings,
            over_budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BASELINE_CONFIDENCE;
    use crate::vision::{ExtractError, SidecarText};
    use image::{GrayImage, Luma};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns fixed text and remembers the path it was given
    struct FixedText {
        text: String,
        seen: Mutex<Option<PathBuf>>,
    }

    impl FixedText {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_string(),
                seen: Mutex::new(None),
            }
        }
    }

    impl TextSource for FixedText {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract(&self, image: &Path) -> Result<String, ExtractError> {
            assert!(image.is_file(), "text source was given a missing file {:?}", image);
            *self.seen.lock().unwrap() = Some(image.to_path_buf());
            Ok(self.text.clone())
        }
    }

    struct Failing;

    impl TextSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn extract(&self, image: &Path) -> Result<String, ExtractError> {
            Err(ExtractError::MissingSidecar {
                image: image.to_path_buf(),
                candidates: vec![],
            })
        }
    }

    fn write_page(dir: &Path) -> PathBuf {
        let page = GrayImage::from_fn(64, 48, |x, y| {
            if y % 12 < 2 && (8..56).contains(&x) {
                Luma([20])
            } else {
                Luma([235])
            }
        });
        let path = dir.join("page.png");
        page.save(&path).unwrap();
        path
    }

    fn pipeline(source: Box<dyn TextSource>, preprocessing: PreprocessingConfig) -> Pipeline {
        Pipeline::new(
            source,
            Arc::new(Classifier::with_defaults().unwrap()),
            preprocessing,
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_run_with_sidecar_text() {
        let dir = TempDir::new().unwrap();
        let image = write_page(dir.path());
        std::fs::write(
            dir.path().join("page.png.txt"),
            "INVOICE\nInvoice number 1042\nSubtotal 40.00\nTax 4.00\nTotal 44.00\nDue date: 2024-05-01",
        )
        .unwrap();

        let report = pipeline(Box::new(SidecarText::new()), PreprocessingConfig::default())
            .run(&image)
            .unwrap();

        assert_eq!((report.width, report.height), (64, 48));
        assert_eq!(report.text_source, "sidecar");
        assert_eq!(report.preprocessing.len(), 4);
        assert!(report.preprocessing.iter().all(|s| s.applied));
        assert_eq!(report.result.label, "Invoice");
        assert!(report.result.confidence > BASELINE_CONFIDENCE);
        assert_eq!(report.confidence_percent, report.result.confidence_percent());
        assert!(!report.over_budget);
    }

    #[test]
    fn test_pixel_sources_get_preprocessed_copy() {
        let dir = TempDir::new().unwrap();
        let image = write_page(dir.path());

        let source = Arc::new(FixedText::new("Dear Sir, kind regards"));
        let pipeline = pipeline(Box::new(SharedSource(Arc::clone(&source))), PreprocessingConfig::default());
        let report = pipeline.run(&image).unwrap();

        let seen = source.seen.lock().unwrap().clone().unwrap();
        assert_ne!(seen, image);
        assert_eq!(report.result.label, "Letter");
    }

    #[test]
    fn test_disabled_preprocessing_uses_original_image() {
        let dir = TempDir::new().unwrap();
        let image = write_page(dir.path());

        let source = Arc::new(FixedText::new(""));
        let pipeline = pipeline(Box::new(SharedSource(Arc::clone(&source))), PreprocessingConfig::disabled());
        let report = pipeline.run(&image).unwrap();

        assert_eq!(source.seen.lock().unwrap().as_deref(), Some(image.as_path()));
        assert_eq!(report.result.label, "Text Document");
        assert_eq!(report.result.confidence, BASELINE_CONFIDENCE);
    }

    #[test]
    fn test_extraction_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let image = write_page(dir.path());

        let result = pipeline(Box::new(Failing), PreprocessingConfig::default()).run(&image);
        assert!(result.is_err());
    }

    #[test]
    fn test_undecodable_image_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let result = pipeline(Box::new(FixedText::new("x")), PreprocessingConfig::default()).run(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_over_budget_is_reported() {
        let dir = TempDir::new().unwrap();
        let image = write_page(dir.path());

        let pipeline = Pipeline::new(
            Box::new(FixedText::new("receipt")),
            Arc::new(Classifier::with_defaults().unwrap()),
            PreprocessingConfig::default(),
            Duration::ZERO,
        );
        let report = pipeline.run(&image).unwrap();
        assert!(report.over_budget);
        assert_eq!(report.result.label, "Receipt");
    }

    #[test]
    fn test_from_config_and_classify_text() {
        let mut config = AppConfig::default();
        config.ocr.backend = crate::vision::OcrBackend::Sidecar;

        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.text_source_name(), "sidecar");
        assert_eq!(pipeline.classify_text("Receipt. Cash. Change.").label, "Receipt");
    }

    #[test]
    fn test_from_config_runs_with_overrides() {
        let dir = TempDir::new().unwrap();
        let image = write_page(dir.path());
        std::fs::write(dir.path().join("page.txt"), "Thank you for your purchase. Cash paid, change due.").unwrap();

        let mut config = AppConfig::default();
        config.ocr.backend = crate::vision::OcrBackend::Sidecar;
        config.preprocessing = PreprocessingConfig::disabled();

        let report = Pipeline::from_config(&config).unwrap().run(&image).unwrap();
        assert!(report.preprocessing.iter().all(|s| !s.applied));
        assert_eq!(report.text_source, "sidecar");
        assert_eq!(report.result.label, "Receipt");
    }

    #[test]
    fn test_from_config_with_bad_lexicon_path() {
        let mut config = AppConfig::default();
        config.classifier.lexicon_path = Some(PathBuf::from("/nonexistent/lexicon.json"));
        assert!(Pipeline::from_config(&config).is_err());
    }

    #[test]
    fn test_load_classifier_with_bad_lexicon_path() {
        let settings = ClassifierSettings {
            lexicon_path: Some(PathBuf::from("/nonexistent/lexicon.toml")),
            ..Default::default()
        };
        assert!(load_classifier(&settings).is_err());
    }

    /// Lets a test keep a handle on a source owned by the pipeline
    struct SharedSource(Arc<FixedText>);

    impl TextSource for SharedSource {
        fn name(&self) -> &'static str {
            self.0.name()
        }

        fn extract(&self, image: &Path) -> Result<String, ExtractError> {
            self.0.extract(image)
        }
    }
}
