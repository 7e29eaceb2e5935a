//! Model-label → coarse-label table and the confidence floor.
//!
//! The table is data, not branching: remapping a category (or supporting a
//! different classifier vocabulary) means swapping the [`LabelMap`], never
//! touching the pipeline.

use super::{ClassificationResult, CoarseLabel, LabelScore};
use crate::error::ScanError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Minimum top-label probability for a non-`undetermined` result.
pub const MIN_CONFIDENCE_SCORE: f32 = 0.5;

/// Output classes of the DiT model fine-tuned on RVL-CDIP, in logit order.
pub const RVL_CDIP_LABELS: [&str; 16] = [
    "letter",
    "form",
    "email",
    "handwritten",
    "advertisement",
    "scientific report",
    "scientific publication",
    "specification",
    "file folder",
    "news article",
    "budget",
    "invoice",
    "presentation",
    "questionnaire",
    "resume",
    "memo",
];

static RVL_CDIP_MAP: Lazy<LabelMap> = Lazy::new(|| {
    use CoarseLabel::*;
    LabelMap::from_pairs([
        ("handwritten", Handwritten),
        ("letter", Typewritten),
        ("form", Typewritten),
        ("email", Typewritten),
        ("memo", Typewritten),
        ("resume", Typewritten),
        ("scientific publication", Typewritten),
        ("specification", Typewritten),
        ("news article", Typewritten),
        ("invoice", Typewritten),
        ("advertisement", OtherDocumentType),
        ("budget", OtherDocumentType),
        ("file folder", OtherDocumentType),
        ("presentation", OtherDocumentType),
        ("questionnaire", OtherDocumentType),
        ("scientific report", OtherDocumentType),
    ])
});

/// Lookup table from model-native labels to [`CoarseLabel`]s.
///
/// Keys are matched case-insensitively. Labels missing from the table are
/// ambiguous and collapse to [`CoarseLabel::Undetermined`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap {
    entries: HashMap<String, CoarseLabel>,
}

impl LabelMap {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, CoarseLabel)>,
        S: AsRef<str>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v))
                .collect(),
        }
    }

    /// The built-in table for the RVL-CDIP label set.
    pub fn rvl_cdip() -> Self {
        RVL_CDIP_MAP.clone()
    }

    /// Load a table from a JSON object of `{"model label": "coarse_label"}`.
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let invalid = |detail: String| ScanError::InvalidLabelMap {
            path: path.to_path_buf(),
            detail,
        };
        let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let raw: HashMap<String, CoarseLabel> =
            serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
        if raw.is_empty() {
            return Err(invalid("label map has no entries".into()));
        }
        Ok(Self::from_pairs(raw))
    }

    pub fn get(&self, model_label: &str) -> Option<CoarseLabel> {
        self.entries.get(&model_label.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collapse a raw probability vector into a [`ClassificationResult`].
///
/// The top-scoring model label decides the coarse label, unless its
/// probability is below `min_confidence` or the table has no (or an
/// `undetermined`) entry for it. The full score list is kept either way,
/// sorted from most to least likely.
pub fn collapse_scores(
    mut scores: Vec<LabelScore>,
    map: &LabelMap,
    min_confidence: f32,
) -> ClassificationResult {
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));

    let Some(top) = scores.first() else {
        return ClassificationResult {
            label: CoarseLabel::Undetermined,
            confidence: 0.0,
            top_label: None,
            raw_scores: scores,
        };
    };

    let confidence = if top.score.is_finite() {
        top.score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let label = if confidence < min_confidence {
        CoarseLabel::Undetermined
    } else {
        map.get(&top.label).unwrap_or(CoarseLabel::Undetermined)
    };

    ClassificationResult {
        label,
        confidence,
        top_label: Some(top.label.clone()),
        raw_scores: scores,
    }
}
