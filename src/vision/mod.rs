//! Vision/OCR Layer
//!
//! Turns an image into text for the classifier. Text extraction sits
//! behind the [`TextSource`] trait so the OCR resource is built once at
//! startup and injected into the pipeline. Supported backends:
//! - Tesseract command-line OCR
//! - Sidecar text files stored next to the image

pub mod ocr;
pub mod preprocess;
pub mod sidecar;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::OcrSettings;

pub use ocr::TesseractCli;
pub use preprocess::{preprocess, PreprocessOutcome, PreprocessStep, StepReport};
pub use sidecar::SidecarText;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// External tesseract executable
    #[default]
    Tesseract,
    /// `<image>.txt` next to the image
    Sidecar,
}

/// Errors raised by a text source
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program:?} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("no sidecar text for {image:?} (looked for {candidates:?})")]
    MissingSidecar {
        image: PathBuf,
        candidates: Vec<PathBuf>,
    },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR output is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Produces the text contained in an image
///
/// Implementations may return an empty string when nothing was recognized.
pub trait TextSource: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Whether the source looks at the pixels it is given
    ///
    /// Sources that read stored text instead must be handed the original
    /// image path rather than a preprocessed copy.
    fn reads_pixels(&self) -> bool {
        true
    }

    /// Extract text from the image at `image`
    fn extract(&self, image: &Path) -> Result<String, ExtractError>;
}

/// Build the text source selected in the configuration
pub fn text_source_from_settings(settings: &OcrSettings) -> Box<dyn TextSource> {
    match settings.backend {
        OcrBackend::Tesseract => Box::new(TesseractCli::new(&settings.tesseract_path, &settings.language)),
        OcrBackend::Sidecar => Box::new(SidecarText::new()),
    }
}
