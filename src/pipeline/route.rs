//! Engine routing: the single decision point between classification and
//! transcription.
//!
//! [`RoutingPolicy`] is a total table from [`CoarseLabel`] to [`EngineKind`]:
//! every label has exactly one engine, so there is no fall-through branch.
//! Selecting an engine that is not registered in the
//! [`crate::pipeline::engine::EngineSet`] surfaces as
//! [`crate::error::ItemError::EngineUnavailable`] at dispatch time.

use crate::classify::{ClassificationResult, CoarseLabel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A transcription strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Remote vision-capable LLM.
    RemoteVision,
    /// On-device OCR model (not bundled; must be registered by the caller).
    LocalOcr,
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::RemoteVision => "remote_vision",
            EngineKind::LocalOcr => "local_ocr",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's decision for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSelection {
    pub engine: EngineKind,
    /// Label the decision was keyed on; passed to the engine as a hint.
    pub label: CoarseLabel,
}

/// Label → engine table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    handwritten: EngineKind,
    typewritten: EngineKind,
    other_document_type: EngineKind,
    undetermined: EngineKind,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::uniform(EngineKind::RemoteVision)
    }
}

impl RoutingPolicy {
    /// Route every label to the same engine.
    pub fn uniform(engine: EngineKind) -> Self {
        Self {
            handwritten: engine,
            typewritten: engine,
            other_document_type: engine,
            undetermined: engine,
        }
    }

    /// Override the engine for one label.
    pub fn with_route(mut self, label: CoarseLabel, engine: EngineKind) -> Self {
        *self.slot_mut(label) = engine;
        self
    }

    pub fn engine_for(&self, label: CoarseLabel) -> EngineKind {
        match label {
            CoarseLabel::Handwritten => self.handwritten,
            CoarseLabel::Typewritten => self.typewritten,
            CoarseLabel::OtherDocumentType => self.other_document_type,
            CoarseLabel::Undetermined => self.undetermined,
        }
    }

    /// Pure routing decision for a classification.
    pub fn select_engine(&self, classification: &ClassificationResult) -> EngineSelection {
        EngineSelection {
            engine: self.engine_for(classification.label),
            label: classification.label,
        }
    }

    /// Distinct engines this policy can select.
    pub fn engines(&self) -> Vec<EngineKind> {
        let mut kinds: Vec<EngineKind> = Vec::new();
        for label in CoarseLabel::ALL {
            let kind = self.engine_for(label);
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    fn slot_mut(&mut self, label: CoarseLabel) -> &mut EngineKind {
        match label {
            CoarseLabel::Handwritten => &mut self.handwritten,
            CoarseLabel::Typewritten => &mut self.typewritten,
            CoarseLabel::OtherDocumentType => &mut self.other_document_type,
            CoarseLabel::Undetermined => &mut self.undetermined,
        }
    }
}
