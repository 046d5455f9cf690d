//! Sidecar text backend
//!
//! Reads text that was recognized earlier and stored next to the image,
//! either as `scan.png.txt` or `scan.txt`.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ExtractError, TextSource};

/// Text source that reads a `.txt` file stored beside the image
#[derive(Debug, Clone, Default)]
pub struct SidecarText;

impl SidecarText {
    pub fn new() -> Self {
        Self
    }

    /// Paths checked for `image`, in order
    pub fn candidates(image: &Path) -> Vec<PathBuf> {
        let mut appended = image.as_os_str().to_owned();
        appended.push(".txt");

        let mut candidates = vec![PathBuf::from(appended)];
        let replaced = image.with_extension("txt");
        if replaced != image && !candidates.contains(&replaced) {
            candidates.push(replaced);
        }
        candidates
    }
}

impl TextSource for SidecarText {
    fn name(&self) -> &'static str {
        "sidecar"
    }

    fn reads_pixels(&self) -> bool {
        false
    }

    fn extract(&self, image: &Path) -> Result<String, ExtractError> {
        let candidates = Self::candidates(image);

        let found = candidates.iter().find(|p| p.is_file()).cloned();
        let Some(path) = found else {
            return Err(ExtractError::MissingSidecar {
                image: image.to_path_buf(),
                candidates,
            });
        };

        debug!("Reading sidecar text {:?}", path);
        std::fs::read_to_string(&path).map_err(|source| ExtractError::Io { path, source })
    }
}
