//! OCR Lab - image to text to document type
//!
//! Extracts text from a scanned image and classifies the document type
//! with an explainable, deterministic keyword classifier.

pub mod classify;
pub mod config;
pub mod pipeline;
pub mod storage;
pub mod vision;

pub use classify::{ClassificationResult, Classifier};
pub use pipeline::{Pipeline, PipelineReport};
