//! Local document-type classification.
//!
//! A [`DocumentClassifier`] maps one image to a [`CoarseLabel`] plus the raw
//! per-label probabilities it was derived from. The bundled implementation is
//! [`ModelClassifier`]: any [`ScoreModel`] (a local network returning a
//! probability per model-native label) combined with a [`LabelMap`] and a
//! confidence floor.
//!
//! ```text
//! ImageRef ──▶ decode ──▶ ScoreModel ──▶ collapse_scores ──▶ ClassificationResult
//!                          (logits→p)     (LabelMap + floor)
//! ```
//!
//! Every call is independent: no caching, no state carried between images.

#[cfg(feature = "dit")]
pub mod dit;
pub mod labels;

pub use labels::{collapse_scores, LabelMap, MIN_CONFIDENCE_SCORE, RVL_CDIP_LABELS};

use crate::error::ItemError;
use crate::pipeline::input::ImageRef;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse document type used for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoarseLabel {
    Handwritten,
    Typewritten,
    OtherDocumentType,
    Undetermined,
}

impl CoarseLabel {
    pub const ALL: [CoarseLabel; 4] = [
        CoarseLabel::Handwritten,
        CoarseLabel::Typewritten,
        CoarseLabel::OtherDocumentType,
        CoarseLabel::Undetermined,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoarseLabel::Handwritten => "handwritten",
            CoarseLabel::Typewritten => "typewritten",
            CoarseLabel::OtherDocumentType => "other_document_type",
            CoarseLabel::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for CoarseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability the model assigned to one of its native labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Outcome of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Routing label; `Undetermined` whenever `confidence` is below the floor.
    pub label: CoarseLabel,
    /// Probability of the top model label, in `[0, 1]`.
    pub confidence: f32,
    /// The top model-native label, if the model produced any scores.
    pub top_label: Option<String>,
    /// Every model label with its probability, most likely first.
    pub raw_scores: Vec<LabelScore>,
}

impl ClassificationResult {
    /// Result used when classification is switched off.
    pub fn undetermined() -> Self {
        Self {
            label: CoarseLabel::Undetermined,
            confidence: 0.0,
            top_label: None,
            raw_scores: Vec::new(),
        }
    }

    /// Compact `label=score` list for debug logs.
    pub fn scores_summary(&self) -> String {
        self.raw_scores
            .iter()
            .map(|s| format!("{}={:.4}", s.label, s.score))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Maps an image to a coarse document type.
///
/// Implementations run synchronously (the pipeline calls them from a blocking
/// task) and must turn internal model failures into
/// [`ItemError::Classification`] instead of panicking.
pub trait DocumentClassifier: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Classify one image. Undecodable input is [`ItemError::InvalidImage`].
    fn classify(&self, image: &ImageRef) -> Result<ClassificationResult, ItemError>;
}

/// A local network producing one probability per model-native label.
pub trait ScoreModel: Send + Sync {
    fn name(&self) -> &str;

    /// Score a decoded RGB image. Errors are model-internal failures.
    fn label_scores(&self, image: &DynamicImage) -> Result<Vec<LabelScore>, String>;
}

/// [`DocumentClassifier`] built from a [`ScoreModel`] and a [`LabelMap`].
pub struct ModelClassifier<M> {
    model: M,
    labels: LabelMap,
    min_confidence: f32,
}

impl<M: ScoreModel> ModelClassifier<M> {
    pub fn new(model: M, labels: LabelMap, min_confidence: f32) -> Self {
        Self {
            model,
            labels,
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }
}

impl<M: ScoreModel> DocumentClassifier for ModelClassifier<M> {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn classify(&self, image: &ImageRef) -> Result<ClassificationResult, ItemError> {
        let decoded = image.decode()?;
        let scores = self
            .model
            .label_scores(&decoded)
            .map_err(|detail| ItemError::Classification { detail })?;
        Ok(collapse_scores(scores, &self.labels, self.min_confidence))
    }
}

/// Classifier that deliberately classifies nothing: every image is
/// `undetermined` with confidence 0. Selected explicitly with
/// `--no-classifier`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unclassified;

impl DocumentClassifier for Unclassified {
    fn name(&self) -> &str {
        "none"
    }

    fn classify(&self, _image: &ImageRef) -> Result<ClassificationResult, ItemError> {
        Ok(ClassificationResult::undetermined())
    }
}
