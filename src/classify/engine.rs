//! Weighted keyword classification engine
//!
//! Scores every lexicon entry against the text, picks the strictly highest
//! weighted score and turns it into a bounded confidence. Ties and texts
//! without evidence resolve to the lexicon's fallback label.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::lexicon::{Lexicon, LexiconError};
use super::tokenize;

/// Confidence reported for the fallback label and the floor for every result
pub const BASELINE_CONFIDENCE: f64 = 0.1;

/// Ceiling for every result
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Relative tolerance under which two weighted scores count as tied
const TIE_TOLERANCE: f64 = 1e-9;

/// Label and confidence for one piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Winning document type, or the fallback label
    pub label: String,
    /// Confidence in `[0.1, 1.0]`
    pub confidence: f64,
}

impl ClassificationResult {
    /// Confidence as a whole percentage for display
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Maps a winning score to a confidence
///
/// With `d` the weighted score per word of input:
/// `confidence = 0.1 + 0.9 * (1 - exp(-steepness * d))`, clamped to
/// `[0.1, 1.0]`. For a fixed word count this grows with the score, and a
/// single hit buried in a long text stays near the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceCurve {
    steepness: f64,
}

impl ConfidenceCurve {
    pub const DEFAULT_STEEPNESS: f64 = 3.0;

    /// Returns `None` unless `steepness` is finite and positive
    pub fn new(steepness: f64) -> Option<Self> {
        (steepness.is_finite() && steepness > 0.0).then_some(Self { steepness })
    }

    pub fn steepness(&self) -> f64 {
        self.steepness
    }

    /// Confidence for a winning `score` over a text of `word_count` words
    pub fn confidence(&self, score: f64, word_count: usize) -> f64 {
        // Also catches NaN
        if !(score > 0.0) || word_count == 0 {
            return BASELINE_CONFIDENCE;
        }

        let density = score / word_count as f64;
        let gain = 1.0 - (-self.steepness * density).exp();
        (BASELINE_CONFIDENCE + (MAX_CONFIDENCE - BASELINE_CONFIDENCE) * gain)
            .clamp(BASELINE_CONFIDENCE, MAX_CONFIDENCE)
    }
}

impl Default for ConfidenceCurve {
    fn default() -> Self {
        Self {
            steepness: Self::DEFAULT_STEEPNESS,
        }
    }
}

/// How often one keyword matched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordHit {
    pub keyword: String,
    pub count: u64,
}

/// Score breakdown for one document type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeScore {
    pub document_type: String,
    /// Total keyword hits
    pub hits: u64,
    /// `hits * weight`
    pub weighted_score: f64,
    /// Keywords with at least one hit, in lexicon order
    pub matched: Vec<KeywordHit>,
}

/// Full reasoning behind a classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Number of words in the normalized text
    pub word_count: usize,
    /// One score per lexicon entry, in lexicon order
    pub scores: Vec<TypeScore>,
    /// Whether the top positive score was shared by several types
    pub tied: bool,
    pub result: ClassificationResult,
}

struct CompiledKeyword {
    text: String,
    words: Vec<String>,
}

struct CompiledEntry {
    document_type: String,
    weight: f64,
    keywords: Vec<CompiledKeyword>,
}

/// Stateless document classifier over an immutable lexicon
///
/// Safe to share across threads; every call is a pure function of its input.
pub struct Classifier {
    lexicon: Lexicon,
    entries: Vec<CompiledEntry>,
    curve: ConfidenceCurve,
}

impl Classifier {
    /// Create a classifier, pre-tokenizing every keyword
    pub fn new(lexicon: Lexicon, curve: ConfidenceCurve) -> Self {
        let entries = lexicon
            .entries()
            .iter()
            .map(|entry| CompiledEntry {
                document_type: entry.document_type.clone(),
                weight: entry.weight,
                keywords: entry
                    .keywords
                    .iter()
                    .map(|k| CompiledKeyword {
                        text: k.clone(),
                        words: tokenize::words(k),
                    })
                    .collect(),
            })
            .collect();

        Self {
            lexicon,
            entries,
            curve,
        }
    }

    /// Classifier over the built-in lexicon and the default curve
    pub fn with_defaults() -> Result<Self, LexiconError> {
        Ok(Self::new(Lexicon::builtin()?, ConfidenceCurve::default()))
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn curve(&self) -> ConfidenceCurve {
        self.curve
    }

    /// Classify `text`; never fails
    pub fn classify(&self, text: &str) -> ClassificationResult {
        self.explain(text).result
    }

    /// Classify possibly absent text; `None` behaves like `""`
    pub fn classify_optional(&self, text: Option<&str>) -> ClassificationResult {
        self.classify(text.unwrap_or_default())
    }

    /// Classify `text` and return the per-type breakdown with the result
    pub fn explain(&self, text: &str) -> Explanation {
        let words = tokenize::words(text);
        let scores: Vec<TypeScore> = self.entries.iter().map(|e| score_entry(e, &words)).collect();

        let top = scores
            .iter()
            .map(|s| s.weighted_score)
            .fold(0.0_f64, f64::max);

        let leaders: Vec<&TypeScore> = if top > 0.0 {
            scores
                .iter()
                .filter(|s| (top - s.weighted_score).abs() <= TIE_TOLERANCE * top)
                .collect()
        } else {
            Vec::new()
        };
        let tied = leaders.len() > 1;

        let result = match leaders.as_slice() {
            [winner] => ClassificationResult {
                label: winner.document_type.clone(),
                confidence: self.curve.confidence(winner.weighted_score, words.len()),
            },
            _ => ClassificationResult {
                label: self.lexicon.fallback().to_string(),
                confidence: BASELINE_CONFIDENCE,
            },
        };

        debug!(
            "Classified {} words as {} ({:.3}){}",
            words.len(),
            result.label,
            result.confidence,
            if tied { ", tie resolved to fallback" } else { "" }
        );

        Explanation {
            word_count: words.len(),
            scores,
            tied,
            result,
        }
    }
}

fn score_entry(entry: &CompiledEntry, words: &[String]) -> TypeScore {
    let mut hits: u64 = 0;
    let mut matched = Vec::new();

    for keyword in &entry.keywords {
        let count = tokenize::count_phrase(words, &keyword.words);
        if count > 0 {
            hits = hits.saturating_add(count);
            matched.push(KeywordHit {
                keyword: keyword.text.clone(),
                count,
            });
        }
    }

    TypeScore {
        document_type: entry.document_type.clone(),
        hits,
        weighted_score: hits as f64 * entry.weight,
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::lexicon::LexiconEntry;
    use std::sync::Arc;

    fn classifier(entries: Vec<LexiconEntry>) -> Classifier {
        let lexicon = Lexicon::new("Text Document", entries).unwrap();
        Classifier::new(lexicon, ConfidenceCurve::default())
    }

    fn invoice_only() -> Classifier {
        classifier(vec![LexiconEntry::new("Invoice", &["invoice", "total", "due date"], 1.5)])
    }

    #[test]
    fn test_invoice_scenario() {
        let classifier = invoice_only();
        let explanation = classifier.explain("Invoice Total Due Date: $50");

        assert_eq!(explanation.scores[0].hits, 3);
        assert!((explanation.scores[0].weighted_score - 4.5).abs() < 1e-12);

        let result = explanation.result;
        assert_eq!(result.label, "Invoice");
        assert!(result.confidence > BASELINE_CONFIDENCE);
        assert!(result.confidence <= MAX_CONFIDENCE);
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = invoice_only();
        assert_eq!(
            classifier.classify("INVOICE total"),
            classifier.classify("invoice TOTAL")
        );
    }

    #[test]
    fn test_decomposed_accents_match_composed_keyword() {
        let classifier = classifier(vec![LexiconEntry::new("Resume", &["résumé"], 1.0)]);

        let composed = classifier.classify("résumé");
        let decomposed = classifier.classify("re\u{301}sume\u{301}");
        assert_eq!(decomposed.label, "Resume");
        assert_eq!(decomposed, composed);
    }

    #[test]
    fn test_dotted_capital_i_matches_keyword() {
        let classifier = Classifier::with_defaults().unwrap();
        assert_eq!(classifier.classify("İNVOICE").label, "Invoice");
    }

    #[test]
    fn test_empty_text_is_fallback() {
        let classifier = invoice_only();
        let expected = ClassificationResult {
            label: "Text Document".to_string(),
            confidence: BASELINE_CONFIDENCE,
        };
        assert_eq!(classifier.classify(""), expected);
        assert_eq!(classifier.classify_optional(None), expected);
    }

    #[test]
    fn test_unmatched_text_is_fallback() {
        let classifier = Classifier::with_defaults().unwrap();
        let result = classifier.classify("xyz abc 123");
        assert_eq!(result.label, "Text Document");
        assert_eq!(result.confidence, BASELINE_CONFIDENCE);
    }

    #[test]
    fn test_punctuation_and_numbers_are_fallback() {
        let classifier = Classifier::with_defaults().unwrap();
        for text in ["!!!???", "123 456.78 -- 9", "   \n\t  ", "€€€ $$$"] {
            let result = classifier.classify(text);
            assert_eq!(result.label, "Text Document", "input {:?}", text);
            assert_eq!(result.confidence, BASELINE_CONFIDENCE);
        }
    }

    #[test]
    fn test_whole_word_matching() {
        let classifier = classifier(vec![
            LexiconEntry::new("Invoice", &["invoice"], 1.5),
            LexiconEntry::new("Report", &["report"], 1.0),
        ]);

        let explanation = classifier.explain("invoiceless report");
        assert_eq!(explanation.scores[0].hits, 0);
        assert_eq!(explanation.scores[1].hits, 1);
        assert_eq!(explanation.result.label, "Report");
    }

    #[test]
    fn test_repeated_keyword_counts_each_occurrence() {
        let classifier = invoice_only();
        let explanation = classifier.explain("total, total and total");
        assert_eq!(explanation.scores[0].hits, 3);
        assert_eq!(
            explanation.scores[0].matched,
            vec![KeywordHit {
                keyword: "total".to_string(),
                count: 3
            }]
        );
    }

    #[test]
    fn test_overlapping_keywords_count_independently() {
        let classifier = classifier(vec![LexiconEntry::new(
            "Invoice",
            &["invoice", "invoice number", "number"],
            1.0,
        )]);
        let explanation = classifier.explain("Invoice number 42");
        assert_eq!(explanation.scores[0].hits, 3);
    }

    #[test]
    fn test_tie_resolves_to_fallback() {
        let classifier = classifier(vec![
            LexiconEntry::new("Alpha", &["alpha"], 1.0),
            LexiconEntry::new("Beta", &["beta"], 1.0),
        ]);

        let explanation = classifier.explain("alpha beta");
        assert!(explanation.tied);
        assert_eq!(explanation.result.label, "Text Document");
        assert_eq!(explanation.result.confidence, BASELINE_CONFIDENCE);
    }

    #[test]
    fn test_tie_across_different_weights() {
        // 2 hits * 1.5 == 3 hits * 1.0
        let classifier = classifier(vec![
            LexiconEntry::new("Alpha", &["alpha"], 1.5),
            LexiconEntry::new("Beta", &["beta"], 1.0),
        ]);
        let result = classifier.classify("alpha alpha beta beta beta");
        assert_eq!(result.label, "Text Document");
    }

    #[test]
    fn test_weight_breaks_equal_hit_counts() {
        let classifier = classifier(vec![
            LexiconEntry::new("Alpha", &["alpha"], 1.0),
            LexiconEntry::new("Beta", &["beta"], 1.2),
        ]);
        assert_eq!(classifier.classify("alpha beta").label, "Beta");
    }

    #[test]
    fn test_idempotent() {
        let classifier = Classifier::with_defaults().unwrap();
        let text = "Dear customer, please find the invoice and receipt attached. Sincerely.";
        assert_eq!(classifier.classify(text), classifier.classify(text));
        assert_eq!(classifier.explain(text), classifier.explain(text));
    }

    #[test]
    fn test_monotonic_in_hits_for_equal_length() {
        let classifier = invoice_only();
        let texts = [
            "alpha beta gamma delta epsilon",
            "invoice beta gamma delta epsilon",
            "invoice total gamma delta epsilon",
            "invoice total due date epsilon",
            "invoice total due date invoice",
        ];

        let confidences: Vec<f64> = texts.iter().map(|t| classifier.classify(t).confidence).collect();
        for pair in confidences.windows(2) {
            assert!(pair[1] >= pair[0], "confidence decreased: {:?}", confidences);
        }
        assert!(confidences[4] > confidences[1]);
    }

    #[test]
    fn test_long_text_single_hit_does_not_saturate() {
        let classifier = invoice_only();
        let text = format!("invoice {}", "lorem ipsum ".repeat(5_000));

        let result = classifier.classify(&text);
        assert_eq!(result.label, "Invoice");
        assert!(result.confidence > BASELINE_CONFIDENCE);
        assert!(result.confidence < 0.2, "confidence {} saturated", result.confidence);
    }

    #[test]
    fn test_confidence_always_in_range() {
        let classifier = Classifier::with_defaults().unwrap();
        let long_invoice = "invoice total tax ".repeat(10_000);
        let inputs = [
            "",
            "invoice",
            "INVOICE INVOICE INVOICE",
            "Ünïcödé ラベル 請求書 🧾",
            "receipt cash change paid card thank you",
            long_invoice.as_str(),
            "\u{0}\u{1}\u{2}",
        ];

        for text in inputs {
            let result = classifier.classify(text);
            assert!(!result.label.is_empty());
            assert!(
                (BASELINE_CONFIDENCE..=MAX_CONFIDENCE).contains(&result.confidence),
                "confidence {} out of range for {:?}",
                result.confidence,
                text
            );
        }
    }

    #[test]
    fn test_builtin_lexicon_examples() {
        let classifier = Classifier::with_defaults().unwrap();

        assert_eq!(classifier.classify("RECEIPT\nCash 20.00\nChange 3.50\nThank you!").label, "Receipt");
        assert_eq!(
            classifier.classify("Dear Sir, I am writing to you. Yours faithfully, Ann").label,
            "Letter"
        );
        assert_eq!(
            classifier.classify("National ID. Date of birth: 1990-01-01. Nationality: KE. Expiry 2030").label,
            "ID Card"
        );
        assert_eq!(
            classifier.classify("Quarterly report. Summary of findings and analysis. Conclusion.").label,
            "Report"
        );
    }

    #[test]
    fn test_confidence_curve() {
        let curve = ConfidenceCurve::default();
        assert_eq!(curve.confidence(0.0, 10), BASELINE_CONFIDENCE);
        assert_eq!(curve.confidence(f64::NAN, 10), BASELINE_CONFIDENCE);
        assert_eq!(curve.confidence(1.0, 0), BASELINE_CONFIDENCE);
        assert_eq!(curve.confidence(f64::INFINITY, 1), MAX_CONFIDENCE);

        // 4.5 / 5 words * 3.0 = 2.7
        let expected = 0.1 + 0.9 * (1.0 - (-2.7_f64).exp());
        assert!((curve.confidence(4.5, 5) - expected).abs() < 1e-12);

        assert!(curve.confidence(2.0, 10) > curve.confidence(1.0, 10));
    }

    #[test]
    fn test_confidence_curve_rejects_bad_steepness() {
        assert!(ConfidenceCurve::new(0.0).is_none());
        assert!(ConfidenceCurve::new(-1.0).is_none());
        assert!(ConfidenceCurve::new(f64::NAN).is_none());
        assert_eq!(ConfidenceCurve::new(2.0).unwrap().steepness(), 2.0);
    }

    #[test]
    fn test_confidence_percent() {
        let result = ClassificationResult {
            label: "Invoice".to_string(),
            confidence: 0.926,
        };
        assert_eq!(result.confidence_percent(), 93);
    }

    #[test]
    fn test_shared_across_threads() {
        let classifier = Arc::new(Classifier::with_defaults().unwrap());
        let texts = ["invoice total due date", "receipt cash change", "", "dear sir, regards"];
        let expected: Vec<_> = texts.iter().map(|t| classifier.classify(t)).collect();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let classifier = Arc::clone(&classifier);
                let expected = &expected;
                scope.spawn(move || {
                    for _ in 0..100 {
                        for (text, want) in texts.iter().zip(expected) {
                            assert_eq!(&classifier.classify(text), want);
                        }
                    }
                });
            }
        });
    }
}
