//! Document-type lexicon
//!
//! The lexicon is read-only configuration data: a fallback label plus a
//! list of document types, each with signal keywords and a weight. It is
//! validated once when loaded and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::tokenize;

/// Label returned when no document type wins
pub const DEFAULT_FALLBACK_LABEL: &str = "Text Document";

/// Lexicon shipped inside the binary
const BUILTIN_LEXICON: &str = include_str!("../../assets/lexicon.toml");

/// Errors raised while loading or validating a lexicon
#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("failed to read lexicon {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML lexicon: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON lexicon: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported lexicon format {0:?} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("lexicon has no entries")]
    Empty,
    #[error("fallback label must not be empty")]
    EmptyFallback,
    #[error("entry {index} has an empty document type")]
    EmptyDocumentType { index: usize },
    #[error("duplicate document type {0:?}")]
    DuplicateDocumentType(String),
    #[error("document type {0:?} has no keywords")]
    NoKeywords(String),
    #[error("document type {document_type:?} has keyword {keyword:?} with no letters or digits")]
    BlankKeyword {
        document_type: String,
        keyword: String,
    },
    #[error("document type {document_type:?} has weight {weight}, expected a finite positive number")]
    InvalidWeight { document_type: String, weight: f64 },
}

/// One document type and the keywords that signal it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    /// Label reported when this type wins
    pub document_type: String,
    /// Case-insensitive words or phrases, matched on word boundaries
    pub keywords: Vec<String>,
    /// Multiplier applied to this type's hit count
    pub weight: f64,
}

impl LexiconEntry {
    pub fn new(document_type: &str, keywords: &[&str], weight: f64) -> Self {
        Self {
            document_type: document_type.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            weight,
        }
    }
}

/// On-disk shape of a lexicon file
#[derive(Debug, Serialize, Deserialize)]
struct LexiconFile {
    #[serde(default = "default_fallback")]
    fallback: String,
    #[serde(default)]
    entries: Vec<LexiconEntry>,
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK_LABEL.to_string()
}

/// Validated, immutable lexicon
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicon {
    fallback: String,
    entries: Vec<LexiconEntry>,
}

impl Lexicon {
    /// Build a lexicon from entries, validating and normalizing them
    ///
    /// Labels and keywords are trimmed. Keywords that are equal after
    /// normalization are collapsed, keeping the first.
    pub fn new(fallback: &str, entries: Vec<LexiconEntry>) -> Result<Self, LexiconError> {
        let fallback = fallback.trim();
        if fallback.is_empty() {
            return Err(LexiconError::EmptyFallback);
        }
        if entries.is_empty() {
            return Err(LexiconError::Empty);
        }

        let mut seen_types = HashSet::new();
        let mut validated = Vec::with_capacity(entries.len());

        for (index, entry) in entries.into_iter().enumerate() {
            let document_type = entry.document_type.trim().to_string();
            if document_type.is_empty() {
                return Err(LexiconError::EmptyDocumentType { index });
            }
            // Labels that differ only in case would read as the same type
            if !seen_types.insert(document_type.to_lowercase()) {
                return Err(LexiconError::DuplicateDocumentType(document_type));
            }
            if !entry.weight.is_finite() || entry.weight <= 0.0 {
                return Err(LexiconError::InvalidWeight {
                    document_type,
                    weight: entry.weight,
                });
            }
            if entry.keywords.is_empty() {
                return Err(LexiconError::NoKeywords(document_type));
            }

            let mut seen_keywords = HashSet::new();
            let mut keywords = Vec::with_capacity(entry.keywords.len());
            for keyword in entry.keywords {
                let normalized = tokenize::words(&keyword);
                if normalized.is_empty() {
                    return Err(LexiconError::BlankKeyword {
                        document_type,
                        keyword,
                    });
                }
                if seen_keywords.insert(normalized.join(" ")) {
                    keywords.push(keyword.trim().to_string());
                } else {
                    debug!("Dropping duplicate keyword {:?} for {}", keyword, document_type);
                }
            }

            validated.push(LexiconEntry {
                document_type,
                keywords,
                weight: entry.weight,
            });
        }

        Ok(Self {
            fallback: fallback.to_string(),
            entries: validated,
        })
    }

    /// The lexicon embedded in the binary
    pub fn builtin() -> Result<Self, LexiconError> {
        Self::from_toml_str(BUILTIN_LEXICON)
    }

    /// Parse a lexicon from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, LexiconError> {
        let file: LexiconFile = toml::from_str(content)?;
        Self::new(&file.fallback, file.entries)
    }

    /// Parse a lexicon from JSON text
    pub fn from_json_str(content: &str) -> Result<Self, LexiconError> {
        let file: LexiconFile = serde_json::from_str(content)?;
        Self::new(&file.fallback, file.entries)
    }

    /// Load a lexicon file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let content = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let lexicon = match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            _ => return Err(LexiconError::UnsupportedFormat(path.to_path_buf())),
        };

        info!(
            "Loaded lexicon from {:?}: {} document types",
            path,
            lexicon.entries.len()
        );
        Ok(lexicon)
    }

    /// Serialize back to the TOML file format
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&LexiconFile {
            fallback: self.fallback.clone(),
            entries: self.entries.clone(),
        })
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }
}
