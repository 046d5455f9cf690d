//! Document Classification
//!
//! Maps extracted text to a document-type label and a confidence score
//! using weighted keyword hits over a static lexicon. Deterministic and
//! explainable: the same text always yields the same result, and
//! [`Classifier::explain`] shows which keywords drove it.

pub mod engine;
pub mod lexicon;
pub mod tokenize;

pub use engine::{
    ClassificationResult, Classifier, ConfidenceCurve, Explanation, KeywordHit, TypeScore,
    BASELINE_CONFIDENCE, MAX_CONFIDENCE,
};
pub use lexicon::{Lexicon, LexiconEntry, LexiconError, DEFAULT_FALLBACK_LABEL};
