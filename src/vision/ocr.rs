//! Tesseract OCR backend
//!
//! Runs the tesseract executable as a child process and reads the
//! recognized text from its stdout.

use std::path::Path;
use std::process::Command;
use tracing::debug;

use super::{ExtractError, TextSource};

/// OCR engine backed by the tesseract command-line tool
#[derive(Debug, Clone)]
pub struct TesseractCli {
    program: String,
    language: String,
}

impl TesseractCli {
    /// Create a backend that runs `program` with the given language code
    pub fn new(program: &str, language: &str) -> Self {
        debug!("Using tesseract OCR backend: {} (language: {})", program, language);
        Self {
            program: program.to_string(),
            language: language.to_string(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl TextSource for TesseractCli {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn extract(&self, image: &Path) -> Result<String, ExtractError> {
        debug!("Running {} on {:?}", self.program, image);

        let output = Command::new(&self.program)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractError::Failed {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8(output.stdout)?;
        Ok(text.trim().to_string())
    }
}
